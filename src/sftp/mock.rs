//! In-memory SFTP transport for testing.
//!
//! Serves files from a map keyed by full remote path and records how often
//! transports are opened and released.

use super::{Credential, RemoteTransport, TransportConnector};
use crate::config::SftpConfig;
use crate::error::{IngestError, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle counters shared by a connector and its transports.
#[derive(Debug, Default)]
pub struct TransportStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    last_credential: Mutex<Option<Credential>>,
}

impl TransportStats {
    /// Number of successfully opened transports.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of transports released.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Number of file reads attempted.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Credential used by the most recent open.
    pub fn last_credential(&self) -> Option<Credential> {
        self.last_credential
            .lock()
            .ok()
            .and_then(|last| last.clone())
    }
}

/// A connector serving an in-memory file tree.
#[derive(Debug, Clone, Default)]
pub struct MockTransportConnector {
    files: Arc<BTreeMap<String, Vec<u8>>>,
    open_error: Option<String>,
    stats: Arc<TransportStats>,
}

impl MockTransportConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file at the full remote path `path`.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.files).insert(path.into(), content.into());
        self
    }

    /// Makes every open fail with a connection error.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Lifecycle counters for this connector.
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }
}

impl TransportConnector for MockTransportConnector {
    type Transport = MockTransport;

    fn open(&self, _config: &SftpConfig, credential: &Credential) -> Result<MockTransport> {
        if let Some(message) = &self.open_error {
            return Err(IngestError::connection(message.clone()));
        }
        if let Ok(mut last) = self.stats.last_credential.lock() {
            *last = Some(credential.clone());
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MockTransport {
            files: Arc::clone(&self.files),
            stats: Arc::clone(&self.stats),
            open: true,
        })
    }
}

/// Transport handed out by [`MockTransportConnector`].
#[derive(Debug)]
pub struct MockTransport {
    files: Arc<BTreeMap<String, Vec<u8>>>,
    stats: Arc<TransportStats>,
    open: bool,
}

impl RemoteTransport for MockTransport {
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| IngestError::transfer(format!("no such file: {path}")))
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let names: Vec<String> = self
            .files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(String::from)
            .collect();
        if names.is_empty() {
            return Err(IngestError::transfer(format!("no such directory: {path}")));
        }
        Ok(names)
    }

    fn close(&mut self) -> Result<()> {
        if std::mem::take(&mut self.open) {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
