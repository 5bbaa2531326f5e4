//! Configuration management for remote-ingest.
//!
//! Handles loading configuration from a TOML file, with driver defaults for
//! the query reader and named SFTP host profiles.

use crate::db::ConnectionOptions;
use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Driver options for the query reader.
    #[serde(default)]
    pub query: ConnectionOptions,

    /// Named SFTP host profiles.
    #[serde(default)]
    pub sftp: HashMap<String, SftpConfig>,
}

/// SFTP host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SftpConfig {
    /// Remote host.
    pub hostname: String,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login user.
    pub username: String,

    /// Path to a private key file. Takes precedence over `password`.
    pub private_key: Option<PathBuf>,

    /// Login password (not recommended to store in config).
    pub password: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl SftpConfig {
    /// Creates a profile with the default port and no credentials.
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: default_port(),
            username: username.into(),
            private_key: None,
            password: None,
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the private key path.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Sets the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Returns a display-safe string (no credentials) for logs.
    pub fn display_string(&self) -> String {
        format!("{}@{}:{}", self.username, self.hostname, self.port)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("remote-ingest")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            IngestError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named SFTP profile.
    pub fn get_sftp(&self, name: &str) -> Result<&SftpConfig> {
        self.sftp.get(name).ok_or_else(|| {
            IngestError::config(format!("SFTP profile '{name}' not found in config file"))
        })
    }
}
