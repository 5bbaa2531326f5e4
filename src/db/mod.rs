//! Database access layer for remote-ingest.
//!
//! Provides a trait-based interface over the database driver and the
//! [`QueryReader`], which runs one query on one connection and yields at most
//! one batch.

mod mock;
#[cfg(feature = "odbc")]
mod odbc;

pub use mock::{MockConnector, MockStats};
#[cfg(feature = "odbc")]
pub use odbc::OdbcConnector;

use crate::credentials::{ConnectionDescriptor, CredentialResolver, EnvCredentialResolver};
use crate::error::{IngestError, Result};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Driver used when none is configured.
pub const DEFAULT_DRIVER: &str = "{ODBC Driver 18 for SQL Server}";

/// Certificate trust flag used when none is configured.
pub const DEFAULT_TRUST_SERVER_CERTIFICATE: &str = "yes";

/// Driver-level options layered on top of a resolved descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// ODBC driver name, including its braces.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Value of the `TrustServerCertificate` key.
    #[serde(default = "default_trust_server_certificate")]
    pub trust_server_certificate: String,
}

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_trust_server_certificate() -> String {
    DEFAULT_TRUST_SERVER_CERTIFICATE.to_string()
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            trust_server_certificate: default_trust_server_certificate(),
        }
    }
}

impl ConnectionOptions {
    /// Overrides the driver name.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Overrides the certificate trust flag.
    pub fn with_trust_server_certificate(mut self, flag: impl Into<String>) -> Self {
        self.trust_server_certificate = flag.into();
        self
    }

    /// Builds the driver connection string.
    ///
    /// Key order is fixed: DRIVER, SERVER, DATABASE, UID, PWD,
    /// TrustServerCertificate.
    pub fn connection_string(&self, descriptor: &ConnectionDescriptor) -> String {
        format!(
            "DRIVER={};SERVER={},{};DATABASE={};UID={};PWD={};TrustServerCertificate={}",
            self.driver,
            descriptor.host,
            descriptor.port,
            descriptor.database,
            descriptor.username,
            descriptor.secret,
            self.trust_server_certificate
        )
    }
}

/// Opens driver connections.
pub trait Connector {
    /// Opens one connection for the given connection string.
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection + '_>>;
}

/// A single open database connection.
pub trait Connection {
    /// Executes a SQL query and returns the full result.
    fn execute_query(&mut self, sql: &str) -> Result<Table>;

    /// Closes the connection.
    fn close(&mut self) -> Result<()>;
}

/// Closes the wrapped connection exactly once, on every exit path.
struct ConnectionGuard<'c> {
    connection: Option<Box<dyn Connection + 'c>>,
}

impl<'c> ConnectionGuard<'c> {
    fn new(connection: Box<dyn Connection + 'c>) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    fn execute_query(&mut self, sql: &str) -> Result<Table> {
        match self.connection.as_mut() {
            Some(connection) => connection.execute_query(sql),
            None => Err(IngestError::internal("connection already closed")),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(mut connection) => {
                debug!("Closing database connection");
                connection.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close database connection: {e}");
        }
    }
}

/// Runs single queries against a source named by a logical identity.
pub struct QueryReader<C, R = EnvCredentialResolver> {
    connector: C,
    resolver: R,
    options: ConnectionOptions,
}

impl<C: Connector> QueryReader<C> {
    /// Creates a reader resolving identities from environment variables.
    pub fn new(connector: C) -> Self {
        Self::with_resolver(connector, EnvCredentialResolver)
    }
}

impl<C: Connector, R: CredentialResolver> QueryReader<C, R> {
    /// Creates a reader with a custom credential resolver.
    pub fn with_resolver(connector: C, resolver: R) -> Self {
        Self {
            connector,
            resolver,
            options: ConnectionOptions::default(),
        }
    }

    /// Replaces the driver options.
    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the driver options in use.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Runs `sql` against the source named `source` and returns the result.
    ///
    /// Returns `Ok(None)` for an empty result set and `Ok(Some(table))` with the
    /// full result otherwise. The connection is closed before this returns,
    /// whether the query succeeded, was empty, or failed.
    pub fn read(&self, sql: &str, source: &str) -> Result<Option<Table>> {
        let descriptor = self.resolver.resolve(source)?;
        let connection_string = self.options.connection_string(&descriptor);

        debug!("Connecting to {}", descriptor.display_string());
        let mut guard = ConnectionGuard::new(self.connector.connect(&connection_string)?);

        let table = guard.execute_query(sql)?;
        guard.close()?;

        if table.is_empty() {
            debug!("Query returned no rows; no batch produced");
            return Ok(None);
        }

        info!(
            "Query produced one batch of {} rows from {}",
            table.row_count(),
            descriptor.display_string()
        );
        Ok(Some(table))
    }

    /// Same as [`read`](Self::read), as a sequence yielding at most one batch.
    pub fn read_batches(&self, sql: &str, source: &str) -> Result<Batches> {
        Ok(self.read(sql, source)?.into_iter())
    }
}

/// Sequence of result batches; holds zero or one element.
pub type Batches = std::option::IntoIter<Table>;
