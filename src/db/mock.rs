//! Mock database connector for testing.
//!
//! Returns a scripted result (or failure) and counts connection lifecycle
//! calls so tests can check that every connection is released.

use super::{Connection, Connector};
use crate::error::{IngestError, Result};
use crate::table::Table;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Scripted behaviour of a mock connection.
#[derive(Debug, Clone)]
enum Script {
    Return(Table),
    FailQuery(String),
    FailConnect(String),
}

/// Lifecycle counters shared by a connector and every connection it opens.
#[derive(Debug, Default)]
pub struct MockStats {
    connects: AtomicUsize,
    closes: AtomicUsize,
    queries: AtomicUsize,
    last_connection_string: Mutex<Option<String>>,
}

impl MockStats {
    /// Number of successful connects.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of `close` calls across all connections.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of executed queries.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// The connection string passed to the most recent connect attempt.
    pub fn last_connection_string(&self) -> Option<String> {
        self.last_connection_string
            .lock()
            .ok()
            .and_then(|last| last.clone())
    }
}

/// A mock connector whose connections return a fixed result.
#[derive(Debug, Clone)]
pub struct MockConnector {
    script: Script,
    stats: Arc<MockStats>,
}

impl MockConnector {
    /// Every query returns `table`.
    pub fn returning(table: Table) -> Self {
        Self::from_script(Script::Return(table))
    }

    /// Every query fails with a query error carrying `message`.
    pub fn failing_query(message: impl Into<String>) -> Self {
        Self::from_script(Script::FailQuery(message.into()))
    }

    /// Every connect attempt fails with a query error carrying `message`.
    pub fn failing_connect(message: impl Into<String>) -> Self {
        Self::from_script(Script::FailConnect(message.into()))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Lifecycle counters for this connector.
    pub fn stats(&self) -> &MockStats {
        &self.stats
    }
}

impl Connector for MockConnector {
    fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection + '_>> {
        if let Ok(mut last) = self.stats.last_connection_string.lock() {
            *last = Some(connection_string.to_string());
        }

        if let Script::FailConnect(message) = &self.script {
            return Err(IngestError::query(message.clone()));
        }

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            script: self.script.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockConnection {
    script: Script,
    stats: Arc<MockStats>,
}

impl Connection for MockConnection {
    fn execute_query(&mut self, _sql: &str) -> Result<Table> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Return(table) => Ok(table.clone()),
            Script::FailQuery(message) | Script::FailConnect(message) => {
                Err(IngestError::query(message.clone()))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
