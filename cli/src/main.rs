//! Lendwatch CLI: run the pipeline and inspect what it stored.
//!
//! # Commands
//! ```text
//! lendwatch worker
//! lendwatch ingest       --file <logs.jsonl> [--drain]
//! lendwatch query        all|type|user|asset|filter
//! lendwatch stats
//! lendwatch status
//! lendwatch dead-letters
//! lendwatch retry        <job-id>
//! lendwatch info
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use lendwatch_core::{EventKind, LendwatchConfig};
use lendwatch_query::{EventFilters, DEFAULT_LIMIT};
use lendwatch_queue::JobId;

mod backends;
mod cmd_ingest;
mod cmd_query;
mod logging;

use backends::{Backends, QueueKind, StoreKind};
use cmd_query::Selection;

#[derive(Parser)]
#[command(
    name = "lendwatch",
    about = "Lendwatch CLI: Aave V3 lending event pipeline",
    long_about = "
Lendwatch CLI: queue normalized Aave V3 events, write them to the entity
store, and query what has been stored.

ENVIRONMENT VARIABLES:
  LENDWATCH_QUEUE_NAME          Queue name (default: tx-queue)
  LENDWATCH_QUEUE_HOST          Queue database host (default: 127.0.0.1)
  LENDWATCH_QUEUE_PORT          Queue database port (default: 5432)
  LENDWATCH_QUEUE_USER          Queue database user
  LENDWATCH_QUEUE_PASSWORD      Queue database password
  LENDWATCH_QUEUE_DB            Queue database name
  LENDWATCH_QUEUE_ATTEMPTS      Delivery attempts per job (default: 5)
  LENDWATCH_QUEUE_BASE_DELAY_MS Backoff base delay (default: 1000)
  LENDWATCH_QUEUE_LEASE_MS      Redeliver unsettled jobs after (default: 30000)
  LENDWATCH_STORE_URL           Entity store JSON-RPC endpoint
  LENDWATCH_CHAIN               Entity store network slug
  LENDWATCH_STORE_TIMEOUT_MS    Store request timeout (default: 30000)
  LENDWATCH_TTL                 production | prototype
  LENDWATCH_DEDUP               Skip events already stored (default: true)
  LENDWATCH_BLOCK_TIME_MS       Block time for timestamps (default: 12000)
  LENDWATCH_POLL_INTERVAL_MS    Idle worker poll interval (default: 500)
  LENDWATCH_LOG                 Log filter, e.g. info,lendwatch-queue=debug
  LENDWATCH_LOG_JSON            Emit JSON log lines (1/true)
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Queue backend. `memory` is only accepted by `ingest --drain` and
    /// by commands that never touch the queue
    #[arg(long, global = true, value_enum, default_value_t = default_queue_kind())]
    queue: QueueKind,

    /// Entity store backend
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Http)]
    store: StoreKind,

    #[command(subcommand)]
    command: Commands,
}

fn default_queue_kind() -> QueueKind {
    if cfg!(feature = "postgres") {
        QueueKind::Postgres
    } else {
        QueueKind::Memory
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Process queued jobs until Ctrl-C
    Worker,

    /// Normalize decoded logs from a JSON-lines file and enqueue them
    Ingest {
        /// One `{"eventName","args","txHash"}` object per line
        #[arg(short, long)]
        file: PathBuf,
        /// Process the queue in-process until nothing is pending
        #[arg(long)]
        drain: bool,
    },

    /// Query stored events
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Aggregate statistics over the newest stored events
    Stats,

    /// Job counts per queue state
    Status,

    /// List jobs that exhausted their attempts
    #[command(name = "dead-letters")]
    DeadLetters,

    /// Move a failed job back to waiting with a fresh attempt budget
    Retry {
        /// Job id as printed by `dead-letters`
        job_id: JobId,
    },

    /// Show the effective configuration
    Info,
}

impl Commands {
    /// Name of the command if it reads or writes jobs that must outlive
    /// this process.
    fn needs_durable_queue(&self) -> Option<&'static str> {
        match self {
            Self::Worker => Some("worker"),
            Self::Ingest { drain: false, .. } => Some("ingest"),
            Self::Status => Some("status"),
            Self::DeadLetters => Some("dead-letters"),
            Self::Retry { .. } => Some("retry"),
            Self::Ingest { drain: true, .. } | Self::Query { .. } | Self::Stats | Self::Info => None,
        }
    }
}

#[derive(Subcommand)]
enum QueryAction {
    /// Newest events of every kind
    All {
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Newest events of one kind
    Type {
        /// Withdraw, Supply, FlashLoan or LiquidationCall
        #[arg(value_parser = cmd_query::parse_kind)]
        kind: EventKind,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Events whose user (or flash-loan initiator) is ADDRESS
    User {
        address: String,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Events whose reserve, asset or collateral asset is ADDRESS
    Asset {
        address: String,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
    },
    /// Combine any of the filters below
    Filter {
        #[arg(long = "type", value_parser = cmd_query::parse_kind)]
        event_type: Option<EventKind>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        asset: Option<String>,
        /// Inclusive lower bound, in base units
        #[arg(long)]
        min_amount: Option<String>,
        /// Inclusive upper bound, in base units
        #[arg(long)]
        max_amount: Option<String>,
        /// RFC 3339, e.g. 2024-05-01T00:00:00Z
        #[arg(long, value_parser = cmd_query::parse_time)]
        start: Option<chrono::DateTime<chrono::Utc>>,
        #[arg(long, value_parser = cmd_query::parse_time)]
        end: Option<chrono::DateTime<chrono::Utc>>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log = logging::LogConfig::from_env();
    if cli.verbose {
        log.level = "debug".into();
    }
    logging::init_tracing(&log);

    let config = LendwatchConfig::from_env().context("reading LENDWATCH_* environment")?;
    if let Some(command) = cli.command.needs_durable_queue() {
        cli.queue.ensure_durable(command)?;
    }

    let connect = || Backends::connect(config.clone(), cli.queue, cli.store);

    match cli.command {
        Commands::Worker => cmd_worker(&connect().await?).await,

        Commands::Ingest { file, drain } => cmd_ingest::run(&connect().await?, &file, drain).await,

        Commands::Query { action } => {
            let (selection, limit) = match action {
                QueryAction::All { limit } => (Selection::All, limit),
                QueryAction::Type { kind, limit } => (Selection::Kind(kind), limit),
                QueryAction::User { address, limit } => (Selection::User(address), limit),
                QueryAction::Asset { address, limit } => (Selection::Asset(address), limit),
                QueryAction::Filter {
                    event_type,
                    user,
                    asset,
                    min_amount,
                    max_amount,
                    start,
                    end,
                    limit,
                } => {
                    let filters = EventFilters {
                        event_type,
                        user,
                        asset,
                        min_amount,
                        max_amount,
                        start,
                        end,
                        limit,
                    };
                    (Selection::Filtered(filters), DEFAULT_LIMIT)
                }
            };
            cmd_query::run(&connect().await?, selection, limit).await
        }

        Commands::Stats => cmd_query::stats(&connect().await?).await,

        Commands::Status => cmd_status(&connect().await?).await,

        Commands::DeadLetters => cmd_dead_letters(&connect().await?).await,

        Commands::Retry { job_id } => cmd_retry(&connect().await?, job_id).await,

        Commands::Info => cmd_info(&config, cli.queue, cli.store),
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_worker(backends: &Backends) -> Result<()> {
    let worker = backends.worker();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, finishing current job"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C; stopping worker"),
        }
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await?;
    println!("{}", serde_json::to_string_pretty(&worker.metrics())?);
    Ok(())
}

async fn cmd_status(backends: &Backends) -> Result<()> {
    let counts = backends.queue.counts().await?;
    let out = json!({
        "queue": backends.queue.name(),
        "counts": counts,
        "pending": counts.pending(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn cmd_dead_letters(backends: &Backends) -> Result<()> {
    let jobs = backends.queue.failed_jobs().await?;
    println!("{}", serde_json::to_string_pretty(&jobs)?);
    Ok(())
}

async fn cmd_retry(backends: &Backends, job_id: JobId) -> Result<()> {
    backends
        .queue
        .retry_failed(job_id)
        .await
        .with_context(|| format!("retrying job {job_id}"))?;
    println!("Job {job_id} moved back to waiting");
    Ok(())
}

fn cmd_info(config: &LendwatchConfig, queue: QueueKind, store: StoreKind) -> Result<()> {
    let mut config = config.clone();
    if config.queue.password.is_some() {
        config.queue.password = Some("********".into());
    }
    let out = json!({
        "version": env!("CARGO_PKG_VERSION"),
        "queueBackend": queue,
        "storeBackend": store,
        "postgresSupport": cfg!(feature = "postgres"),
        "eventKinds": EventKind::ALL,
        "config": config,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
