//! remote-ingest - pull query results and remote files into tables.

use anyhow::Context;
use remote_ingest::cli::{Cli, Command};
use remote_ingest::config::Config;
use remote_ingest::db::{OdbcConnector, QueryReader};
use remote_ingest::error::IngestError;
use remote_ingest::payload;
use remote_ingest::sftp::{FetchOutcome, RemoteFileSession};
use remote_ingest::table::Table;
use std::io::{self, Write};
use tracing::{debug, error, info, warn};

fn main() {
    let cli = Cli::parse_args();

    match cli.log_path() {
        Some(path) => remote_ingest::logging::init_file_logging(&path),
        None => remote_ingest::logging::init_stderr_logging(),
    }

    // Logical source names resolve from the environment; allow a local .env.
    if let Err(e) = dotenvy::dotenv() {
        debug!("No .env file loaded: {e}");
    }

    if let Err(e) = run(cli) {
        match e.downcast_ref::<IngestError>() {
            Some(ingest) => error!("{}: {:#}", ingest.category(), e),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    match cli.command {
        Command::Query {
            sql,
            source,
            driver,
            trust_server_certificate,
            payload,
        } => {
            let mut options = config.query.clone();
            if let Some(driver) = driver {
                options = options.with_driver(driver);
            }
            if let Some(flag) = trust_server_certificate {
                options = options.with_trust_server_certificate(flag);
            }
            run_query(&sql, &source, options, payload)
        }
        Command::Fetch {
            profile,
            files,
            dir,
            columns,
            text,
        } => {
            let profile_config = config.get_sftp(&profile)?.clone();
            run_fetch(profile_config, files, &dir, columns.as_deref(), text)
        }
    }
}

fn run_query(
    sql: &str,
    source: &str,
    options: remote_ingest::db::ConnectionOptions,
    as_payload: bool,
) -> anyhow::Result<()> {
    let reader = QueryReader::new(OdbcConnector::new()?).with_options(options);
    debug!("Using ODBC driver {}", reader.options().driver);

    let mut out = io::stdout().lock();
    let mut batches = 0;
    for batch in reader.read_batches(sql, source)? {
        batches += 1;
        if as_payload {
            let encoded = payload::encode_table(&batch)?;
            for row in &encoded.rows {
                writeln!(out, "{}", row[0])?;
            }
        } else {
            write_json_lines(&mut out, &batch)?;
        }
    }

    if batches == 0 {
        info!("Query returned no rows");
    }
    Ok(())
}

fn run_fetch(
    profile: remote_ingest::config::SftpConfig,
    files: Vec<String>,
    dir: &str,
    columns: Option<&[String]>,
    as_text: bool,
) -> anyhow::Result<()> {
    let mut session = RemoteFileSession::ssh(profile);
    session.connect()?;

    let files = if files.is_empty() {
        session
            .list_files(dir)
            .with_context(|| format!("listing {dir}"))?
    } else {
        files
    };

    let mut out = io::stdout().lock();
    let mut skipped = 0;
    for file in &files {
        if as_text {
            match session.fetch_text(file, dir)? {
                FetchOutcome::Fetched(content) => {
                    writeln!(out, "==> {file} <==")?;
                    writeln!(out, "{content}")?;
                }
                FetchOutcome::Skipped(_) => skipped += 1,
            }
        } else {
            match session.fetch_delimited(file, dir, columns)? {
                FetchOutcome::Fetched(table) => write_json_lines(&mut out, &table)?,
                FetchOutcome::Skipped(_) => skipped += 1,
            }
        }
    }

    session.close()?;

    let host = session.config().display_string();
    if skipped > 0 {
        warn!("Skipped {skipped} of {} files from {host}", files.len());
    } else {
        info!("Fetched {} files from {host}", files.len());
    }
    Ok(())
}

fn write_json_lines(out: &mut impl Write, table: &Table) -> anyhow::Result<()> {
    for record in table.records() {
        let object: serde_json::Map<String, serde_json::Value> = record
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect();
        writeln!(out, "{}", serde_json::Value::Object(object))?;
    }
    Ok(())
}
