//! Integration tests for remote-ingest.

pub mod query_test;
pub mod sftp_test;
