//! share-etl: Migrate share events from MongoDB into PostgreSQL
//!
//! Usage:
//!   # Daily run: last 24h of the production collection
//!   share-etl
//!
//!   # Several environments, one after another
//!   share-etl production staging beta
//!
//!   # Whole collection, with CSV side files
//!   share-etl --all --csv-dir ./tables
//!
//!   # Offline run from an exported dump
//!   share-etl --input production.json --all

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use share_etl::{
    run_status, DocumentSource, DumpSource, Environment, EtlError, MongoSettings, MongoSource,
    Pipeline, PipelineSettings, PostgresSettings, PostgresSink,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "share-etl")]
#[command(about = "Migrate share events from MongoDB into PostgreSQL", long_about = None)]
struct Args {
    /// Environments to migrate, in order (production, staging, beta)
    #[arg(value_name = "ENVIRONMENT", default_value = "production")]
    environments: Vec<Environment>,

    /// Pipeline settings file (TOML)
    #[arg(long, short = 'c', default_value = "share_etl.toml")]
    config: PathBuf,

    /// Read documents from a JSON / NDJSON dump instead of MongoDB
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// Read the whole collection instead of the last lookback window
    #[arg(long)]
    all: bool,

    /// Also write every table to <DIR>/<entity>.csv
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Extract event properties into their own table
    #[arg(long)]
    event_properties: bool,

    /// Directory for app.log
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    // Keep the guard alive until every record reaches app.log
    let guard = init_logging(&args.log_dir);
    let succeeded = migrate(&args)?;
    drop(guard);

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(log_dir: &Path) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(log_dir, "app.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file_writer.and(std::io::stderr))
        .with_ansi(false)
        .init();
    guard
}

/// Run every requested environment; `Ok(false)` when any run failed
fn migrate(args: &Args) -> Result<bool> {
    let mut settings = PipelineSettings::load(Some(&args.config))
        .with_context(|| format!("Failed to load settings from {}", args.config.display()))?;
    if args.all {
        settings.fetch.fetch_all = true;
    }
    if args.csv_dir.is_some() {
        settings.csv_dir = args.csv_dir.clone();
    }
    if args.event_properties && settings.schema.event_properties.is_none() {
        settings.schema = settings.schema.with_event_properties();
    }

    let pipeline = Pipeline::new(settings).context("Failed to set up pipeline")?;

    let pg_settings = PostgresSettings::from_env().context("Failed to read Postgres settings")?;
    let mut client = match pg_settings.to_pg_config().connect(postgres::NoTls) {
        Ok(client) => client,
        Err(e) => {
            let e = EtlError::from(e);
            report_failure("Failed to connect to Postgres", &e);
            return Ok(false);
        }
    };
    let mut sink = PostgresSink::new(&mut client);

    let mut source: Box<dyn DocumentSource> = match &args.input {
        Some(path) => Box::new(DumpSource::new(path)),
        None => {
            let mongo = MongoSettings::from_env().context("Failed to read Mongo settings")?;
            match MongoSource::connect(&mongo) {
                Ok(source) => Box::new(source),
                Err(e) => {
                    report_failure("Failed to connect to Mongo", &e);
                    return Ok(false);
                }
            }
        }
    };

    let mut failed = 0;
    for environment in &args.environments {
        let result = pipeline.run(*environment, source.as_mut(), &mut sink);
        let status = run_status(&result);

        match &result {
            Ok(report) => info!(
                %environment,
                documents = report.documents,
                skipped = report.skipped().count(),
                code = status.code,
                message = %status.message,
                "Run status"
            ),
            Err(e) => {
                error!(%environment, error = ?e, code = status.code, message = %status.message, "Run status");
                failed += 1;
            }
        }
    }

    Ok(failed == 0)
}

fn report_failure(context: &str, e: &EtlError) {
    let status = e.status();
    error!(error = ?e, code = status.code, message = %status.message, "{}", context);
}
