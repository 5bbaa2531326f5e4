//! Remote file session integration tests.
//!
//! Drives the session through a multi-file batch the way an ingest job does:
//! list a directory, fetch every file, keep going past bad ones.

use pretty_assertions::assert_eq;
use remote_ingest::config::{Config, SftpConfig};
use remote_ingest::error::{FetchFailureKind, IngestError};
use remote_ingest::sftp::{
    FetchOutcome, MockTransportConnector, RemoteFileSession, SessionState, DEFAULT_REMOTE_DIR,
};
use remote_ingest::table::{Table, Value};

fn outbox() -> MockTransportConnector {
    MockTransportConnector::new()
        .with_file("/outbox/2024-01.csv", "sku,qty\nA-1,3\nB-2,5\n")
        .with_file("/outbox/2024-02.csv", "sku,qty\nA-1,3,extra\nB-2,5\n")
        .with_file("/outbox/2024-03.csv", "sku,qty\nC-3,1\n")
        .with_file("/outbox/latin1.csv", vec![b's', b'k', b'u', b'\n', 0xe9, b'\n'])
        .with_file("./readme.txt", "hello\n")
}

fn profile() -> SftpConfig {
    SftpConfig::new("sftp.vendor.example", "ingest").with_password("pw")
}

#[test]
fn test_batch_job_skips_bad_files() {
    let connector = outbox();
    let mut session = RemoteFileSession::new(profile(), connector.clone());
    session.connect().unwrap();

    let files = session.list_files("/outbox/").unwrap();
    assert_eq!(
        files,
        vec!["2024-01.csv", "2024-02.csv", "2024-03.csv", "latin1.csv"]
    );

    let mut tables: Vec<Table> = Vec::new();
    let mut failures = Vec::new();
    for file in &files {
        match session.fetch_delimited(file, "/outbox/", None).unwrap() {
            FetchOutcome::Fetched(table) => tables.push(table),
            FetchOutcome::Skipped(failure) => failures.push(failure),
        }
    }

    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].row_count(), 2);
    assert_eq!(tables[1].rows, vec![vec![Value::from("C-3"), Value::Int(1)]]);

    let kinds: Vec<FetchFailureKind> = failures.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FetchFailureKind::Parse, FetchFailureKind::Decode]);
    assert_eq!(failures[1].path, "/outbox/latin1.csv");

    session.close().unwrap();
    assert_eq!(connector.stats().opens(), 1);
    assert_eq!(connector.stats().closes(), 1);
}

#[test]
fn test_missing_file_then_valid_file() {
    let mut session = RemoteFileSession::new(profile(), outbox());
    session.connect().unwrap();

    let missing = session.fetch_delimited("2099-12.csv", "/outbox", None).unwrap();
    assert!(missing.is_skipped());
    assert_eq!(missing.into_option(), None);

    let text = session.fetch_text("readme.txt", DEFAULT_REMOTE_DIR).unwrap();
    assert_eq!(text.into_result().unwrap(), "hello\n");
}

#[test]
fn test_lifecycle_misuse_propagates() {
    let mut session = RemoteFileSession::new(profile(), outbox());
    assert_eq!(session.state(), SessionState::Unconnected);

    assert!(matches!(
        session.fetch_text("readme.txt", "."),
        Err(IngestError::InvalidState(_))
    ));
    assert!(session.close().is_ok());

    session.connect().unwrap();
    session.close().unwrap();
    assert!(matches!(
        session.fetch_delimited("2024-01.csv", "/outbox", None),
        Err(IngestError::InvalidState(_))
    ));
}

#[test]
fn test_profile_from_config_file() {
    let config: Config = toml::from_str(
        r#"
[sftp.vendor]
hostname = "sftp.vendor.example"
username = "ingest"
"#,
    )
    .unwrap();
    let connector = outbox();
    let profile = config.get_sftp("vendor").unwrap().clone();
    let mut session = RemoteFileSession::new(profile, connector.clone());

    let err = session.connect().unwrap_err();

    assert!(err.to_string().contains("credentials missing"));
    assert_eq!(connector.stats().opens(), 0);
}

/// Live test against a real SFTP host.
#[cfg(feature = "ssh")]
#[test]
fn test_live_listing() {
    let (Ok(host), Ok(user)) = (
        std::env::var("INGEST_TEST_SFTP_HOST"),
        std::env::var("INGEST_TEST_SFTP_USER"),
    ) else {
        eprintln!("Skipping test: INGEST_TEST_SFTP_HOST / INGEST_TEST_SFTP_USER not set");
        return;
    };

    let mut config = SftpConfig::new(host, user);
    config.private_key = std::env::var("INGEST_TEST_SFTP_KEY").ok().map(Into::into);
    config.password = std::env::var("INGEST_TEST_SFTP_PASSWORD").ok();

    let mut session = RemoteFileSession::ssh(config);
    session.connect().unwrap();

    let files = session.list_files(".").unwrap();
    if let Some(first) = files.first() {
        // Content is arbitrary; the fetch must not error either way.
        session.fetch_text(first, ".").unwrap();
    }

    let missing = session
        .fetch_text("remote-ingest-file-that-does-not-exist", ".")
        .unwrap();
    assert!(missing.is_skipped());

    session.close().unwrap();
}
