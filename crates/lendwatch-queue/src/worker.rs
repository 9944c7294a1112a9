//! Worker: pulls jobs from the queue and dispatches them to store handlers.
//!
//! One worker processes one job at a time, so events of a single queue are
//! written in dequeue order. Every outcome is broadcast as a [`WorkerEvent`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use lendwatch_core::{EventKind, HandlerRegistry, Receipt, WorkerConfig};

use crate::error::{QueueError, WorkerError};
use crate::job::{JobId, QueueJob};
use crate::queue::{DurableQueue, NackOutcome};

/// Emitted after each job is settled.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerEvent {
    Completed {
        job_id: JobId,
        kind: EventKind,
        receipt: Receipt,
    },
    Retrying {
        job_id: JobId,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    Failed {
        job_id: JobId,
        attempt: u32,
        error: String,
    },
}

/// What happened to one dequeued job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Receipt),
    Retrying { attempt: u32, delay: Duration },
    Failed,
}

/// Point-in-time worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerMetrics {
    /// Deliveries handled, whatever the outcome.
    pub processed: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

pub struct Worker {
    queue: DurableQueue,
    handlers: HandlerRegistry,
    config: WorkerConfig,
    events: broadcast::Sender<WorkerEvent>,
    counters: Arc<Counters>,
}

impl Worker {
    pub fn new(queue: DurableQueue, handlers: HandlerRegistry, config: WorkerConfig) -> Self {
        let (events, _) = broadcast::channel(1_024);
        Self {
            queue,
            handlers,
            config,
            events,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Subscribe to job outcomes. Slow subscribers may miss events (lagged).
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn metrics(&self) -> WorkerMetrics {
        WorkerMetrics {
            processed: self.counters.processed.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Run the job's handler. Exactly one store write is attempted.
    pub async fn process(&self, job: &QueueJob) -> Result<Receipt, WorkerError> {
        let handler = self
            .handlers
            .get(job.kind)
            .ok_or(WorkerError::NoHandler { kind: job.kind })?;
        Ok(handler.handle(&job.payload).await?)
    }

    /// Dequeue one job, process it and settle it with the queue.
    ///
    /// Returns `Ok(None)` when nothing is ready.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, QueueError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };
        self.settle(&job).await.map(Some)
    }

    async fn settle(&self, job: &QueueJob) -> Result<JobOutcome, QueueError> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        match self.process(job).await {
            Ok(receipt) => {
                self.queue.ack(job).await?;
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    job_id = %job.id,
                    kind = %job.kind,
                    entity_key = %receipt.entity_key,
                    duplicate = receipt.duplicate,
                    "event stored"
                );
                let _ = self.events.send(WorkerEvent::Completed {
                    job_id: job.id,
                    kind: job.kind,
                    receipt: receipt.clone(),
                });
                Ok(JobOutcome::Completed(receipt))
            }
            Err(e) => {
                let message = e.to_string();
                match self.queue.nack(job, &message, e.is_retryable()).await? {
                    NackOutcome::Retrying { attempt, delay } => {
                        self.counters.retried.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            job_id = %job.id,
                            kind = %job.kind,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            transient = matches!(&e, WorkerError::Store(s) if s.is_transient()),
                            error = %e,
                            "store write failed, will retry"
                        );
                        let _ = self.events.send(WorkerEvent::Retrying {
                            job_id: job.id,
                            attempt,
                            delay,
                            error: message,
                        });
                        Ok(JobOutcome::Retrying { attempt, delay })
                    }
                    NackOutcome::DeadLettered => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(
                            job_id = %job.id,
                            kind = %job.kind,
                            attempt = job.attempt,
                            error = %e,
                            "job failed permanently"
                        );
                        let _ = self.events.send(WorkerEvent::Failed {
                            job_id: job.id,
                            attempt: job.attempt,
                            error: message,
                        });
                        Ok(JobOutcome::Failed)
                    }
                }
            }
        }
    }

    /// Process jobs until `shutdown` flips to `true`.
    ///
    /// The job in hand when shutdown is signalled is finished before
    /// returning. A job whose ack or nack fails stays active until its lease
    /// expires and is then redelivered.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        info!(
            queue = %self.queue.name(),
            kinds = ?self.handlers.kinds(),
            "worker started"
        );

        while !*shutdown.borrow() {
            match self.process_next().await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = self.queue.wait(poll) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    error!(queue = %self.queue.name(), error = %e, "queue error");
                    tokio::select! {
                        _ = tokio::time::sleep(poll) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!(queue = %self.queue.name(), metrics = ?self.metrics(), "worker stopped");
        Ok(())
    }
}
