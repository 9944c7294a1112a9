//! Queue and store selection for the CLI.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use lendwatch_core::{EntityStore, HandlerRegistry, LendwatchConfig, StoreHandler};
use lendwatch_queue::{DurableQueue, MemoryQueue, QueueBackend, Worker};
use lendwatch_store::{EntityStoreWriter, HttpEntityStore, MemoryEntityStore, WriterConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// In-process queue; jobs are lost when the process exits
    Memory,
    /// PostgreSQL table (requires the `postgres` feature)
    Postgres,
}

impl QueueKind {
    /// Fail unless jobs queued by `command` outlive this process.
    ///
    /// The in-memory queue is only usable when the same process drains it.
    pub fn ensure_durable(self, command: &str) -> Result<()> {
        match self {
            Self::Postgres => Ok(()),
            Self::Memory => bail!(
                "`{command}` needs a durable queue, but --queue memory keeps jobs in this \
                 process only; use --queue postgres, or `ingest --drain` for a one-shot run"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process entity store
    Memory,
    /// JSON-RPC entity store gateway at LENDWATCH_STORE_URL
    Http,
}

/// Everything a command needs, wired from config and CLI flags.
pub struct Backends {
    pub config: LendwatchConfig,
    pub queue: DurableQueue,
    pub store: Arc<dyn EntityStore>,
}

impl Backends {
    pub async fn connect(config: LendwatchConfig, queue: QueueKind, store: StoreKind) -> Result<Self> {
        let backend = queue_backend(&config, queue).await?;
        let queue = DurableQueue::from_config(&config.queue, backend);

        let store: Arc<dyn EntityStore> = match store {
            StoreKind::Memory => Arc::new(MemoryEntityStore::new()),
            StoreKind::Http => Arc::new(
                HttpEntityStore::new(&config.store)
                    .with_context(|| format!("building store client for {}", config.store.url))?,
            ),
        };

        Ok(Self { config, queue, store })
    }

    /// Worker with the store writer registered for every event kind.
    pub fn worker(&self) -> Worker {
        let writer: Arc<dyn StoreHandler> = Arc::new(EntityStoreWriter::new(
            Arc::clone(&self.store),
            WriterConfig::from(&self.config.store),
        ));
        let mut handlers = HandlerRegistry::new();
        handlers.register_all(writer);
        Worker::new(self.queue.clone(), handlers, self.config.worker.clone())
    }
}

async fn queue_backend(config: &LendwatchConfig, kind: QueueKind) -> Result<Arc<dyn QueueBackend>> {
    match kind {
        QueueKind::Memory => {
            info!(queue = %config.queue.name, "using in-memory queue");
            Ok(Arc::new(MemoryQueue::new()))
        }
        QueueKind::Postgres => postgres_backend(config).await,
    }
}

#[cfg(feature = "postgres")]
async fn postgres_backend(config: &LendwatchConfig) -> Result<Arc<dyn QueueBackend>> {
    let queue = lendwatch_queue::postgres::PostgresQueue::connect(&config.queue)
        .await
        .with_context(|| {
            format!(
                "connecting to queue database {}:{}/{}",
                config.queue.host, config.queue.port, config.queue.database
            )
        })?;
    Ok(Arc::new(queue))
}

#[cfg(not(feature = "postgres"))]
async fn postgres_backend(_config: &LendwatchConfig) -> Result<Arc<dyn QueueBackend>> {
    anyhow::bail!("this build has no PostgreSQL queue; rebuild with `--features postgres`")
}
