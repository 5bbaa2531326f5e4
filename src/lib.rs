//! remote-ingest - remote-source access layer.
//!
//! Reads query results over ODBC and files over SFTP into an in-memory
//! [`table::Table`].

pub mod cli;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod payload;
pub mod sftp;
pub mod table;
