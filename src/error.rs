//! Error types for remote-ingest.
//!
//! `IngestError` is the propagating error used by the query reader and by the
//! session lifecycle. Per-file fetch failures are not errors in this sense;
//! they are reported as [`FetchFailure`] values inside a skipped outcome.

use thiserror::Error;

/// Main error type for remote-ingest operations.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Connection errors (host unreachable, handshake or auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors (driver failures, syntax errors, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (unresolvable logical name, missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation called in the wrong session state (caller misuse).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File-transfer channel errors outside a single-file fetch.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Internal errors (serialization failures, unexpected states, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an invalid-state error with the given message.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a transfer error with the given message.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::InvalidState(_) => "State Error",
            Self::Transfer(_) => "Transfer Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using IngestError.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Stage of a single-file fetch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailureKind {
    /// The remote file could not be opened or read (missing, permissions, I/O).
    Read,
    /// The bytes were not valid UTF-8.
    Decode,
    /// The text could not be parsed into the requested format.
    Parse,
}

impl FetchFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Decode => "decode",
            Self::Parse => "parse",
        }
    }
}

/// Structured description of a fetch that was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Error getting {path} ({}): {message}", .kind.as_str())]
pub struct FetchFailure {
    /// Remote path that was requested.
    pub path: String,
    /// Stage at which the fetch failed.
    pub kind: FetchFailureKind,
    /// Human-readable cause.
    pub message: String,
}

impl FetchFailure {
    pub fn new(
        path: impl Into<String>,
        kind: FetchFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, FetchFailureKind::Read, message)
    }

    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, FetchFailureKind::Decode, message)
    }

    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, FetchFailureKind::Parse, message)
    }
}
