//! Remote file session over SFTP.
//!
//! A [`RemoteFileSession`] authenticates once and then serves any number of
//! per-file fetches. The lifecycle is an explicit state machine:
//!
//! ```text
//! Unconnected --connect--> Connected --close--> Closed
//! ```
//!
//! Fetches require `Connected` and fail with an invalid-state error otherwise.
//! A fetch that fails for file-level reasons (missing file, bad UTF-8,
//! malformed content) does not return an error: it is logged as a warning and
//! reported as [`FetchOutcome::Skipped`], so one bad file never aborts a loop
//! over many.

mod auth;
mod decode;
mod mock;
#[cfg(feature = "ssh")]
mod ssh;

pub use auth::Credential;
pub use decode::parse_delimited;
pub use mock::{MockTransport, MockTransportConnector, TransportStats};
#[cfg(feature = "ssh")]
pub use ssh::{SshConnector, SshTransport};

use crate::config::SftpConfig;
use crate::error::{FetchFailure, IngestError, Result};
use crate::table::Table;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout applied to establishing the transport.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default remote directory for fetches.
pub const DEFAULT_REMOTE_DIR: &str = ".";

/// Opens authenticated file-transfer channels.
pub trait TransportConnector {
    type Transport: RemoteTransport;

    /// Connects to `config`'s host, authenticates with `credential`, and opens
    /// the file-transfer channel. Anything opened before a failure is released
    /// before the error is returned.
    fn open(&self, config: &SftpConfig, credential: &Credential) -> Result<Self::Transport>;
}

/// An open file-transfer channel and the transport beneath it.
pub trait RemoteTransport {
    /// Reads the whole remote file.
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>>;

    /// Lists the plain files in a remote directory.
    fn list_dir(&mut self, path: &str) -> Result<Vec<String>>;

    /// Releases the file-transfer channel, then the transport. Handles that
    /// were never opened are skipped.
    fn close(&mut self) -> Result<()>;
}

/// Public view of the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connected,
    Closed,
}

enum State<T> {
    Unconnected,
    Connected(T),
    Closed,
}

/// Result of a single-file fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// The file was read and decoded.
    Fetched(T),
    /// The file was skipped; the failure was already logged.
    Skipped(FetchFailure),
}

impl<T> FetchOutcome<T> {
    /// Returns the fetched value, dropping the failure.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Fetched(value) => Some(value),
            Self::Skipped(_) => None,
        }
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> std::result::Result<T, FetchFailure> {
        match self {
            Self::Fetched(value) => Ok(value),
            Self::Skipped(failure) => Err(failure),
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// The failure, if the fetch was skipped.
    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            Self::Fetched(_) => None,
            Self::Skipped(failure) => Some(failure),
        }
    }
}

/// Joins a remote directory and a file name, stripping trailing `/` from the
/// directory first.
pub fn remote_path(remote_directory: &str, filename: &str) -> String {
    format!("{}/{}", remote_directory.trim_end_matches('/'), filename)
}

/// A stateful session against one SFTP host.
pub struct RemoteFileSession<C: TransportConnector> {
    config: SftpConfig,
    connector: C,
    state: State<C::Transport>,
}

#[cfg(feature = "ssh")]
impl RemoteFileSession<SshConnector> {
    /// Creates an unconnected session using the libssh2 transport.
    pub fn ssh(config: SftpConfig) -> Self {
        Self::new(config, SshConnector::default())
    }
}

impl<C: TransportConnector> RemoteFileSession<C> {
    /// Creates an unconnected session.
    pub fn new(config: SftpConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            state: State::Unconnected,
        }
    }

    /// The host configuration this session connects to.
    pub fn config(&self) -> &SftpConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match self.state {
            State::Unconnected => SessionState::Unconnected,
            State::Connected(_) => SessionState::Connected,
            State::Closed => SessionState::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Authenticates and opens the file-transfer channel.
    ///
    /// Credentials are checked before any network I/O. A closed session can be
    /// connected again; a connected one cannot.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(IngestError::invalid_state(format!(
                "session to {} is already connected",
                self.config.display_string()
            )));
        }

        let credential = Credential::from_config(&self.config)?;
        debug!(
            "Connecting to {} using {} authentication",
            self.config.display_string(),
            credential.method()
        );

        let transport = self.connector.open(&self.config, &credential)?;
        self.state = State::Connected(transport);
        info!("SFTP session connected to {}", self.config.display_string());
        Ok(())
    }

    /// Releases the channel and transport. No-op unless connected.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Connected(mut transport) => {
                debug!("Closing SFTP session to {}", self.config.display_string());
                transport.close()
            }
            State::Unconnected => {
                self.state = State::Unconnected;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }

    /// Lists the plain files in `remote_directory`, sorted by name.
    pub fn list_files(&mut self, remote_directory: &str) -> Result<Vec<String>> {
        let transport = self.transport()?;
        let mut names = transport.list_dir(remote_directory)?;
        names.sort();
        Ok(names)
    }

    /// Fetches a delimited text file as a table.
    ///
    /// With `column_names` the content has no header line and the names are
    /// assigned left to right; otherwise the first line is the header.
    pub fn fetch_delimited(
        &mut self,
        filename: &str,
        remote_directory: &str,
        column_names: Option<&[String]>,
    ) -> Result<FetchOutcome<Table>> {
        let path = remote_path(remote_directory, filename);
        let outcome = self.fetch_string(&path)?.and_then(|content| {
            parse_delimited(&content, column_names).map_err(|e| FetchFailure::parse(&path, e))
        });
        Ok(report(outcome))
    }

    /// Fetches a file as UTF-8 text, verbatim. Used for markup and any format
    /// without a dedicated decoder.
    pub fn fetch_text(
        &mut self,
        filename: &str,
        remote_directory: &str,
    ) -> Result<FetchOutcome<String>> {
        let path = remote_path(remote_directory, filename);
        let outcome = self.fetch_string(&path)?;
        Ok(report(outcome))
    }

    /// Outer error: session misuse. Inner error: this file failed.
    fn fetch_string(&mut self, path: &str) -> Result<std::result::Result<String, FetchFailure>> {
        let transport = self.transport()?;
        debug!("Fetching {path}");
        Ok(transport
            .read_file(path)
            .map_err(|e| FetchFailure::read(path, e.to_string()))
            .and_then(|bytes| {
                decode::decode_utf8(bytes).map_err(|e| FetchFailure::decode(path, e))
            }))
    }

    fn transport(&mut self) -> Result<&mut C::Transport> {
        match &mut self.state {
            State::Connected(transport) => Ok(transport),
            State::Unconnected => Err(IngestError::invalid_state(
                "session is not connected; call connect() first",
            )),
            State::Closed => Err(IngestError::invalid_state("session is closed")),
        }
    }
}

impl<C: TransportConnector> Drop for RemoteFileSession<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close SFTP session: {e}");
        }
    }
}

fn report<T>(outcome: std::result::Result<T, FetchFailure>) -> FetchOutcome<T> {
    match outcome {
        Ok(value) => FetchOutcome::Fetched(value),
        Err(failure) => {
            warn!("{failure}");
            FetchOutcome::Skipped(failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchFailureKind;
    use crate::table::Value;
    use pretty_assertions::assert_eq;

    fn session(connector: MockTransportConnector) -> RemoteFileSession<MockTransportConnector> {
        let config = SftpConfig::new("sftp.test", "ingest").with_password("pw");
        RemoteFileSession::new(config, connector)
    }

    fn connector() -> MockTransportConnector {
        MockTransportConnector::new()
            .with_file("./data.csv", "id,name\n1,alice\n2,bob\n")
            .with_file("/upload/raw.csv", "1,x\n2,y\n")
            .with_file("/upload/feed.xml", "<feed><item id=\"1\"/></feed>")
            .with_file("./bad.bin", vec![0xff, 0xfe, 0x00])
            .with_file("./ragged.csv", "a,b\n1,2,3\n")
    }

    #[test]
    fn test_remote_path_join() {
        assert_eq!(remote_path(".", "a.csv"), "./a.csv");
        assert_eq!(remote_path("/upload/", "a.csv"), "/upload/a.csv");
        assert_eq!(remote_path("/upload///", "a.csv"), "/upload/a.csv");
        assert_eq!(remote_path("", "a.csv"), "/a.csv");
    }

    #[test]
    fn test_connect_without_credentials_fails_before_io() {
        let connector = connector();
        let config = SftpConfig::new("sftp.test", "ingest");
        let mut session = RemoteFileSession::new(config, connector.clone());

        let err = session.connect().unwrap_err();

        assert!(matches!(err, IngestError::Config(_)));
        assert!(err.to_string().contains("credentials missing"));
        assert_eq!(connector.stats().opens(), 0);
        assert_eq!(session.state(), SessionState::Unconnected);
    }

    #[test]
    fn test_connect_passes_selected_credential() {
        let connector = connector();
        let config = SftpConfig::new("sftp.test", "ingest")
            .with_private_key("/keys/id_rsa")
            .with_password("pw");
        let mut session = RemoteFileSession::new(config, connector.clone());

        session.connect().unwrap();

        assert_eq!(
            connector.stats().last_credential(),
            Some(Credential::PrivateKey("/keys/id_rsa".into()))
        );
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.config().display_string(), "ingest@sftp.test:22");
    }

    #[test]
    fn test_fetch_before_connect_is_state_error() {
        let mut session = session(connector());
        let err = session.fetch_delimited("data.csv", ".", None).unwrap_err();
        assert!(matches!(err, IngestError::InvalidState(_)));

        let err = session.fetch_text("data.csv", ".").unwrap_err();
        assert!(matches!(err, IngestError::InvalidState(_)));
    }

    #[test]
    fn test_fetch_delimited_with_header() {
        let mut session = session(connector());
        session.connect().unwrap();

        let table = session
            .fetch_delimited("data.csv", ".", None)
            .unwrap()
            .into_option()
            .unwrap();

        assert_eq!(table.column_names(), vec!["id", "name"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_fetch_delimited_with_column_names() {
        let mut session = session(connector());
        session.connect().unwrap();
        let names = vec!["a".to_string(), "b".to_string()];

        let table = session
            .fetch_delimited("raw.csv", "/upload/", Some(&names))
            .unwrap()
            .into_option()
            .unwrap();

        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][0], Value::Int(1));
    }

    #[test]
    fn test_fetch_text_verbatim() {
        let mut session = session(connector());
        session.connect().unwrap();

        let text = session.fetch_text("feed.xml", "/upload").unwrap();

        assert_eq!(text, FetchOutcome::Fetched("<feed><item id=\"1\"/></feed>".to_string()));
    }

    #[test]
    fn test_missing_file_is_isolated() {
        let mut session = session(connector());
        session.connect().unwrap();

        let missing = session.fetch_delimited("nope.csv", ".", None).unwrap();
        assert_eq!(missing.failure().map(|f| f.kind), Some(FetchFailureKind::Read));
        assert_eq!(missing.failure().map(|f| f.path.as_str()), Some("./nope.csv"));

        let next = session.fetch_delimited("data.csv", ".", None).unwrap();
        assert!(next.is_fetched());
    }

    #[test]
    fn test_decode_and_parse_failures_are_isolated() {
        let mut session = session(connector());
        session.connect().unwrap();

        let bad = session.fetch_text("bad.bin", ".").unwrap();
        assert_eq!(bad.failure().map(|f| f.kind), Some(FetchFailureKind::Decode));

        let ragged = session.fetch_delimited("ragged.csv", ".", None).unwrap();
        assert_eq!(ragged.failure().map(|f| f.kind), Some(FetchFailureKind::Parse));

        assert!(session.is_connected());
    }

    #[test]
    fn test_close_never_connected_is_noop() {
        let connector = connector();
        let mut session = session(connector.clone());

        session.close().unwrap();

        assert_eq!(session.state(), SessionState::Unconnected);
        assert_eq!(connector.stats().closes(), 0);
    }

    #[test]
    fn test_close_releases_once_and_blocks_fetches() {
        let connector = connector();
        let mut session = session(connector.clone());
        session.connect().unwrap();

        session.close().unwrap();
        session.close().unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(connector.stats().closes(), 1);
        assert!(matches!(
            session.fetch_text("data.csv", "."),
            Err(IngestError::InvalidState(_))
        ));
    }

    #[test]
    fn test_drop_releases_connected_session() {
        let connector = connector();
        {
            let mut session = session(connector.clone());
            session.connect().unwrap();
        }
        assert_eq!(connector.stats().closes(), 1);
    }

    #[test]
    fn test_double_connect_is_state_error() {
        let connector = connector();
        let mut session = session(connector.clone());
        session.connect().unwrap();

        assert!(matches!(session.connect(), Err(IngestError::InvalidState(_))));
        assert_eq!(connector.stats().opens(), 1);
    }

    #[test]
    fn test_reconnect_after_close() {
        let connector = connector();
        let mut session = session(connector.clone());
        session.connect().unwrap();
        session.close().unwrap();

        session.connect().unwrap();

        assert!(session.is_connected());
        assert_eq!(connector.stats().opens(), 2);
    }

    #[test]
    fn test_list_files_sorted() {
        let mut session = session(connector());
        assert!(matches!(session.list_files("."), Err(IngestError::InvalidState(_))));

        session.connect().unwrap();
        assert_eq!(
            session.list_files("/upload").unwrap(),
            vec!["feed.xml".to_string(), "raw.csv".to_string()]
        );
    }

    #[test]
    fn test_open_failure_leaves_session_unconnected() {
        let connector = connector().failing_open("handshake failed");
        let mut session = session(connector);

        let err = session.connect().unwrap_err();

        assert!(matches!(err, IngestError::Connection(_)));
        assert_eq!(session.state(), SessionState::Unconnected);
    }
}
