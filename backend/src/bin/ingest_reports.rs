//! Ingest CI test reports from disk without going through the HTTP API.
//!
//! Operator backfill path: the project is resolved from the metadata's
//! `project` field rather than from an API key. Flake notifications are not
//! sent for backfilled runs.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cap_std::{ambient_authority, fs::Dir};
use clap::Parser;
use mockable::{Clock, DefaultClock};
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;

use flaketrack::config::AppSettings;
use flaketrack::domain::ports::{
    FixtureFlakeNotifier, IngestionCommand, IngestionReceipt, IngestionRequest,
};
use flaketrack::domain::upload::UploadedReport;
use flaketrack::domain::{
    FlakeDetectionService, IngestionCaller, IngestionCommandService, NotificationDispatcher,
};
use flaketrack::outbound::persistence::{
    DbPool, DieselFlakeDetectionRepository, DieselIngestionRepository, DieselProjectDirectory,
    PoolConfig,
};

/// `ingest-reports` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ingest-reports",
    about = "Ingest JUnit-style test reports for one CI job into flaketrack",
    version
)]
struct CliArgs {
    /// Path to the JSON metadata document describing the run and job.
    #[arg(long = "metadata", value_name = "path")]
    metadata_path: PathBuf,
    /// Report files, ingested in the order given.
    #[arg(value_name = "report", required = true)]
    reports: Vec<PathBuf>,
    /// Database connection URL. Falls back to `FLAKETRACK_DATABASE_URL`.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
}

fn main() -> io::Result<()> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    let settings = AppSettings::load_from_iter([OsString::from("ingest-reports")])
        .map_err(|error| io::Error::other(format!("load settings: {error}")))?;

    let metadata_json = read_file(&args.metadata_path)?;
    let files = args
        .reports
        .iter()
        .map(|path| {
            let content = read_file(path)?;
            Ok(UploadedReport::new(display_name(path), content))
        })
        .collect::<io::Result<Vec<_>>>()?;

    let database_url = resolve_database_url(args.database_url, &settings)?;
    let pool = DbPool::new(PoolConfig::new(database_url).with_max_size(2))
        .await
        .map_err(|error| io::Error::other(format!("create database pool: {error}")))?;
    let public_base_url = settings
        .public_base_url()
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let detector = FlakeDetectionService::new(
        Arc::new(DieselFlakeDetectionRepository::new(pool.clone())),
        NotificationDispatcher::new(
            Arc::new(FixtureFlakeNotifier),
            settings.notification_timeout(),
            public_base_url,
        ),
        Arc::clone(&clock),
    );
    let command = IngestionCommandService::new(
        Arc::new(DieselIngestionRepository::new(pool.clone())),
        Arc::new(DieselProjectDirectory::new(pool)),
        Arc::new(detector),
        clock,
    )
    .with_limits(settings.upload_limits())
    .with_max_stored_file_bytes(settings.max_stored_file_bytes());

    let receipt = command
        .ingest(IngestionRequest {
            caller: IngestionCaller::Operator,
            metadata_json,
            files,
        })
        .await
        .map_err(|error| io::Error::other(format!("ingest command failed: {error}")))?;

    print_receipt(&receipt)
}

fn print_receipt(receipt: &IngestionReceipt) -> io::Result<()> {
    let rendered = serde_json::to_string_pretty(receipt).map_err(io::Error::other)?;
    println!("{rendered}");
    Ok(())
}

/// File name recorded for a report; the directory part is dropped.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn read_file(path: &Path) -> io::Result<Vec<u8>> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "input path must be a file"))?;
    let directory = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|error| {
        io::Error::other(format!(
            "open input parent directory '{}': {error}",
            parent.display()
        ))
    })?;
    let mut file = directory.open(Path::new(file_name)).map_err(|error| {
        io::Error::other(format!("open input file '{}': {error}", path.display()))
    })?;
    let mut content = Vec::new();
    file.read_to_end(&mut content).map_err(|error| {
        io::Error::other(format!("read input file '{}': {error}", path.display()))
    })?;
    Ok(content)
}

fn resolve_database_url(explicit: Option<String>, settings: &AppSettings) -> io::Result<String> {
    if let Some(value) = explicit {
        if value.trim().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "--database-url must not be empty",
            ));
        }
        return Ok(value);
    }
    settings
        .database_url()
        .map(str::to_owned)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))
}
