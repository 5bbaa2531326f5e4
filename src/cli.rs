//! Command-line argument parsing for remote-ingest.

use crate::config::Config;
use crate::sftp::DEFAULT_REMOTE_DIR;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pull query results and remote files into tables.
#[derive(Parser, Debug)]
#[command(name = "remote-ingest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr (use "default" for the state directory)
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one SQL query and print the rows as JSON lines
    Query {
        /// SQL text
        sql: String,

        /// Environment variable holding the source DSN
        #[arg(short, long, value_name = "NAME", env = "REMOTE_INGEST_SOURCE")]
        source: String,

        /// ODBC driver, including braces (overrides config)
        #[arg(long, value_name = "DRIVER")]
        driver: Option<String>,

        /// TrustServerCertificate value (overrides config)
        #[arg(long, value_name = "FLAG")]
        trust_server_certificate: Option<String>,

        /// Print escaped row payloads instead of plain JSON
        #[arg(long)]
        payload: bool,
    },

    /// Fetch files from a configured SFTP host
    Fetch {
        /// SFTP profile name from the config file
        profile: String,

        /// Files to fetch (all files in the directory if omitted)
        files: Vec<String>,

        /// Remote directory
        #[arg(short, long, value_name = "DIR", default_value = DEFAULT_REMOTE_DIR)]
        dir: String,

        /// Comma-separated column names for headerless files
        #[arg(long, value_name = "NAMES", value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Print files as raw text instead of parsing them as delimited tables
        #[arg(long)]
        text: bool,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the log file path, if file logging was requested.
    pub fn log_path(&self) -> Option<PathBuf> {
        match self.log_file.as_deref() {
            None => None,
            Some("default") => Some(crate::logging::get_log_path()),
            Some(path) => Some(PathBuf::from(path)),
        }
    }
}
