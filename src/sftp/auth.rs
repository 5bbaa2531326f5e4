//! Authentication material for SFTP sessions.

use crate::config::SftpConfig;
use crate::error::{IngestError, Result};
use std::fmt;
use std::path::PathBuf;

/// The single credential a session authenticates with.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Private key file on the local filesystem.
    PrivateKey(PathBuf),
    /// Password authentication.
    Password(String),
}

impl Credential {
    /// Picks the credential configured in `config`.
    ///
    /// A private key wins over a password when both are set. Fails with
    /// "credentials missing" when neither is.
    pub fn from_config(config: &SftpConfig) -> Result<Self> {
        match (&config.private_key, &config.password) {
            (Some(path), _) => Ok(Self::PrivateKey(path.clone())),
            (None, Some(password)) => Ok(Self::Password(password.clone())),
            (None, None) => Err(IngestError::config(format!(
                "credentials missing for {}: set private_key or password",
                config.display_string()
            ))),
        }
    }

    /// Short method name for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::PrivateKey(_) => "publickey",
            Self::Password(_) => "password",
        }
    }
}

// Keeps passwords out of debug output and logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey(path) => f.debug_tuple("PrivateKey").field(path).finish(),
            Self::Password(_) => f.write_str("Password(****)"),
        }
    }
}
