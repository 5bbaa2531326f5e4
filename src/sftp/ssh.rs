//! SFTP transport implementation using libssh2.
//!
//! Host keys are trusted on first use: the server key is never checked against
//! a known-hosts file, only logged by fingerprint.

use super::{Credential, RemoteTransport, TransportConnector, CONNECT_TIMEOUT};
use crate::config::SftpConfig;
use crate::error::{IngestError, Result};
use ssh2::{HashType, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connector producing libssh2-backed transports.
#[derive(Debug, Clone, Copy)]
pub struct SshConnector {
    timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            timeout: CONNECT_TIMEOUT,
        }
    }
}

impl SshConnector {
    /// Overrides the connect timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Bounds blocking libssh2 calls while the session is being established.
    fn apply_connect_timeout(&self, session: &Session) {
        session.set_timeout(self.timeout.as_millis().min(u32::MAX as u128) as u32);
    }

    fn connect_tcp(&self, config: &SftpConfig) -> Result<TcpStream> {
        let addrs = (config.hostname.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| {
                IngestError::connection(format!("Cannot resolve {}: {e}", config.hostname))
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) => map_connect_error(e, config),
            None => IngestError::connection(format!("No addresses found for {}", config.hostname)),
        })
    }
}

impl TransportConnector for SshConnector {
    type Transport = SshTransport;

    fn open(&self, config: &SftpConfig, credential: &Credential) -> Result<SshTransport> {
        let tcp = self.connect_tcp(config)?;

        let mut session = Session::new()
            .map_err(|e| IngestError::internal(format!("Failed to create SSH session: {e}")))?;
        self.apply_connect_timeout(&session);
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| {
            IngestError::connection(format!("SSH handshake with {} failed: {e}", config.hostname))
        })?;

        log_host_key(&session, config);

        // Owned from here on, so any early return releases the session.
        let mut transport = SshTransport {
            sftp: None,
            session: Some(session),
        };
        let session = transport
            .session
            .as_ref()
            .ok_or_else(|| IngestError::internal("SSH session missing after handshake"))?;

        let auth = match credential {
            Credential::PrivateKey(path) => {
                session.userauth_pubkey_file(&config.username, None, path, None)
            }
            Credential::Password(password) => session.userauth_password(&config.username, password),
        };
        auth.map_err(|e| {
            IngestError::connection(format!(
                "Authentication failed for user '{}' ({}): {e}",
                config.username,
                credential.method()
            ))
        })?;
        if !session.authenticated() {
            return Err(IngestError::connection(format!(
                "Authentication failed for user '{}'",
                config.username
            )));
        }

        let sftp = session
            .sftp()
            .map_err(|e| IngestError::connection(format!("Failed to open SFTP channel: {e}")))?;
        release_connect_timeout(session);
        transport.sftp = Some(sftp);

        Ok(transport)
    }
}

/// Transfers on an established session are not time-bounded.
fn release_connect_timeout(session: &Session) {
    session.set_timeout(0);
}

fn log_host_key(session: &Session, config: &SftpConfig) {
    match session.host_key_hash(HashType::Sha256) {
        Some(hash) => {
            let fingerprint: String = hash.iter().map(|b| format!("{b:02x}")).collect();
            info!(
                "Accepting host key for {}:{} (SHA256 {fingerprint})",
                config.hostname, config.port
            );
        }
        None => warn!("No host key fingerprint available for {}", config.hostname),
    }
}

fn map_connect_error(error: std::io::Error, config: &SftpConfig) -> IngestError {
    let host = &config.hostname;
    let port = config.port;
    match error.kind() {
        std::io::ErrorKind::TimedOut => IngestError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        )),
        std::io::ErrorKind::ConnectionRefused => IngestError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        )),
        _ => IngestError::connection(format!("Cannot connect to {host}:{port}: {error}")),
    }
}

/// An SFTP channel and the SSH session carrying it.
pub struct SshTransport {
    sftp: Option<Sftp>,
    session: Option<Session>,
}

impl SshTransport {
    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| IngestError::transfer("SFTP channel is not open"))
    }
}

impl RemoteTransport for SshTransport {
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .sftp()?
            .open(Path::new(path))
            .map_err(|e| IngestError::transfer(format!("cannot open {path}: {e}")))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| IngestError::transfer(format!("cannot read {path}: {e}")))?;
        Ok(buf)
    }

    fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        let entries = self
            .sftp()?
            .readdir(Path::new(path))
            .map_err(|e| IngestError::transfer(format!("cannot list {path}: {e}")))?;
        Ok(entries
            .into_iter()
            .filter(|(_, stat)| stat.is_file())
            .filter_map(|(entry, _)| {
                entry
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn close(&mut self) -> Result<()> {
        if self.sftp.take().is_some() {
            debug!("SFTP channel closed");
        }
        if let Some(session) = self.session.take() {
            session
                .disconnect(None, "closing", None)
                .map_err(|e| IngestError::connection(format!("SSH disconnect failed: {e}")))?;
            debug!("SSH session disconnected");
        }
        Ok(())
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close SSH transport: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_timeout_defaults_to_thirty_seconds() {
        let session = Session::new().unwrap();
        SshConnector::default().apply_connect_timeout(&session);
        assert_eq!(session.timeout(), 30_000);
    }

    #[test]
    fn test_timeout_released_after_connect() {
        let session = Session::new().unwrap();
        SshConnector::default().apply_connect_timeout(&session);
        release_connect_timeout(&session);
        assert_eq!(session.timeout(), 0);
    }

    #[test]
    fn test_connect_timeout_override() {
        let session = Session::new().unwrap();
        SshConnector::with_timeout(Duration::from_millis(1500)).apply_connect_timeout(&session);
        assert_eq!(session.timeout(), 1500);
    }

    #[test]
    fn test_unreachable_host_is_connection_error() {
        let config = SftpConfig::new("127.0.0.1", "ingest").with_port(1);
        let credential = Credential::Password("pw".to_string());
        let connector = SshConnector::with_timeout(Duration::from_secs(2));
        let err = match connector.open(&config, &credential) {
            Ok(_) => panic!("nothing listens on port 1"),
            Err(e) => e,
        };
        assert_eq!(err.category(), "Connection Error");
    }
}
