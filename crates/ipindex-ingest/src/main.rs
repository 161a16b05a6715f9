//! ipindex-ingest - RIR WHOIS dump ingestion tool

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ipindex_common::logging::{init_logging, LogConfig, LogLevel};
use ipindex_common::types::Registry;
use ipindex_ingest::db::{self, DbConfig};
use ipindex_ingest::framework::FileReport;
use ipindex_ingest::rpsl::CidrMode;
use ipindex_ingest::storage::{RecordSearch, SearchField};
use ipindex_ingest::{
    IngestConfig, IngestCoordinator, IngestReport, MemoryStore, PgConnector, SinkConnector,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ipindex-ingest")]
#[command(author, version, about = "Ingest RIR WHOIS dumps into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Number of chunks / concurrent workers (default: INGEST_WORKERS or 4)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Records per bulk write
    #[arg(long)]
    batch_size: Option<usize>,

    /// Emit one record per CIDR block instead of only the first (first | all)
    #[arg(long)]
    cidr_mode: Option<CidrMode>,

    /// Parse and count into memory without touching the database
    #[arg(long)]
    dry_run: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show how a dump would be split into chunks
    Plan {
        /// Dump file (plain or .gz)
        file: PathBuf,

        /// Registry the dump comes from
        #[arg(short, long, default_value = "RIPE")]
        source: Registry,

        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Ingest one dump file
    Ingest {
        /// Dump file (plain or .gz)
        file: PathBuf,

        /// Registry the dump comes from
        #[arg(short, long)]
        source: Registry,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Ingest every known registry dump found in a directory
    IngestDir {
        /// Directory holding e.g. ripe.db.inetnum.gz, arin.db
        dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Regex search over stored records
    Search {
        /// POSIX regular expression
        pattern: String,

        /// description | name | maintainer | country
        #[arg(short, long, default_value = "description")]
        field: SearchField,

        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },

    /// Create or update the records table
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ipindex-ingest")
        .build()
        .merge_env()
        .context("Invalid IPINDEX_LOG_* settings")?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Plan {
            file,
            source,
            workers,
        } => {
            let config = ingest_config(workers, None, None)?;
            let worker_count = config.worker_count;
            let coordinator = IngestCoordinator::new(MemoryStore::new(), config);
            let chunks = coordinator.plan(&file, source, worker_count).await?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        },
        Command::Ingest { file, source, run } => {
            let report = if run.dry_run {
                ingest_file(MemoryStore::new(), &file, source, &run).await?
            } else {
                let pool = connect(&run).await?;
                ingest_file(PgConnector::new(pool), &file, source, &run).await?
            };
            print_report(&report)?;
            report.into_result()?;
        },
        Command::IngestDir { dir, run } => {
            let reports = if run.dry_run {
                ingest_dir(MemoryStore::new(), &dir, &run).await?
            } else {
                let pool = connect(&run).await?;
                ingest_dir(PgConnector::new(pool), &dir, &run).await?
            };

            let mut total = IngestReport::default();
            for file in &reports {
                info!(
                    path = %file.path.display(),
                    source = %file.registry,
                    inserted = file.report.records_inserted,
                    failed_chunks = file.report.failed_chunks.len(),
                    "File done"
                );
                total.merge(&file.report);
            }
            print_report(&total)?;
            total.into_result()?;
        },
        Command::Search {
            pattern,
            field,
            limit,
        } => {
            let pool = db::create_pool(&DbConfig::from_env()?).await?;
            let records = RecordSearch::new(pool)
                .search(field, &pattern, limit)
                .await
                .context("Search failed")?;
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
        },
        Command::Migrate => {
            let pool = db::create_pool(&DbConfig::from_env()?).await?;
            db::migrate(&pool).await?;
        },
    }

    Ok(())
}

fn ingest_config(
    workers: Option<usize>,
    batch_size: Option<usize>,
    cidr_mode: Option<CidrMode>,
) -> Result<IngestConfig> {
    let mut config = IngestConfig::from_env().context("Invalid INGEST_* settings")?;
    if let Some(workers) = workers {
        config = config.with_worker_count(workers);
    }
    if let Some(batch_size) = batch_size {
        config = config.with_batch_size(batch_size);
    }
    if let Some(mode) = cidr_mode {
        config = config.with_cidr_mode(mode);
    }
    config.validate()?;
    Ok(config)
}

fn run_config(run: &RunArgs) -> Result<IngestConfig> {
    ingest_config(run.workers, run.batch_size, run.cidr_mode)
}

async fn connect(run: &RunArgs) -> Result<sqlx::PgPool> {
    let workers = run_config(run)?.worker_count;
    let db_config = DbConfig::from_env()?.sized_for_workers(workers);
    let pool = db::create_pool(&db_config)
        .await
        .context("Failed to connect to the database")?;
    Ok(pool)
}

fn coordinator<C: SinkConnector>(connector: C, run: &RunArgs) -> Result<IngestCoordinator<C>> {
    let coordinator = IngestCoordinator::new(connector, run_config(run)?);
    if run.no_progress {
        return Ok(coordinator);
    }

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} chunks")
            .context("Invalid progress template")?,
    );
    Ok(coordinator.with_progress(progress))
}

async fn ingest_file<C: SinkConnector>(
    connector: C,
    file: &Path,
    source: Registry,
    run: &RunArgs,
) -> Result<IngestReport> {
    if run.dry_run {
        warn!("Dry run: records are kept in memory only");
    }
    let coordinator = coordinator(connector, run)?;
    let worker_count = coordinator.config().worker_count;
    let report = coordinator
        .run_ingest(file, source, worker_count)
        .await
        .with_context(|| format!("Failed to ingest {}", file.display()))?;
    Ok(report)
}

async fn ingest_dir<C: SinkConnector>(
    connector: C,
    dir: &Path,
    run: &RunArgs,
) -> Result<Vec<FileReport>> {
    let coordinator = coordinator(connector, run)?;
    let reports = coordinator
        .ingest_directory(dir)
        .await
        .with_context(|| format!("Failed to ingest directory {}", dir.display()))?;
    Ok(reports)
}

fn print_report(report: &IngestReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if let Some(failure) = report.first_failure() {
        warn!(%failure, "Some chunks could not be ingested");
    }
    Ok(())
}
