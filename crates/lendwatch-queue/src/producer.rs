//! Producer: hands decoded chain logs to the queue.
//!
//! The chain listener feeds [`DecodedLog`]s in; each is normalized and
//! enqueued. Malformed logs are logged and dropped so one bad event never
//! stalls the stream.

use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use lendwatch_core::DecodedLog;

use crate::error::ProduceError;
use crate::job::JobId;
use crate::policy::RetryPolicy;
use crate::queue::DurableQueue;

/// Totals for one [`Producer::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerStats {
    pub received: u64,
    pub enqueued: u64,
    pub malformed: u64,
    pub enqueue_errors: u64,
}

pub struct Producer {
    queue: DurableQueue,
    policy: Option<RetryPolicy>,
}

impl Producer {
    pub fn new(queue: DurableQueue) -> Self {
        Self { queue, policy: None }
    }

    /// Override the queue's default retry policy for jobs from this producer.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Normalize one log and enqueue it.
    pub async fn submit(&self, log: &DecodedLog) -> Result<JobId, ProduceError> {
        let event = log.normalize()?;
        let id = self.queue.enqueue(event.kind(), event, self.policy).await?;
        Ok(id)
    }

    /// Drain `logs` into the queue. Returns when the stream ends.
    pub async fn run<S>(&self, logs: S) -> ProducerStats
    where
        S: Stream<Item = DecodedLog>,
    {
        let mut stats = ProducerStats::default();
        futures::pin_mut!(logs);

        while let Some(log) = logs.next().await {
            stats.received += 1;
            match self.submit(&log).await {
                Ok(_) => stats.enqueued += 1,
                Err(ProduceError::Malformed(e)) => {
                    stats.malformed += 1;
                    warn!(
                        event = %log.event_name,
                        tx_hash = %log.tx_hash,
                        error = %e,
                        "dropping malformed event"
                    );
                }
                Err(ProduceError::Queue(e)) => {
                    stats.enqueue_errors += 1;
                    warn!(
                        event = %log.event_name,
                        tx_hash = %log.tx_hash,
                        error = %e,
                        "enqueue failed"
                    );
                }
            }
        }

        info!(
            received = stats.received,
            enqueued = stats.enqueued,
            malformed = stats.malformed,
            enqueue_errors = stats.enqueue_errors,
            "producer finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use lendwatch_core::{EventKind, LogValue};
    use std::sync::Arc;

    const TX: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
    const ADDR: &str = "0x2222222222222222222222222222222222222222";

    fn withdraw_log(amount: &str) -> DecodedLog {
        DecodedLog::new(
            "Withdraw",
            vec![
                LogValue::Str(ADDR.into()),
                LogValue::Str(ADDR.into()),
                LogValue::Str(ADDR.into()),
                LogValue::Str(amount.into()),
            ],
            TX,
        )
    }

    fn producer() -> Producer {
        Producer::new(DurableQueue::new(
            "tx-queue",
            Arc::new(MemoryQueue::new()),
            RetryPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn submit_enqueues_normalized_event() {
        let p = producer();
        let id = p.submit(&withdraw_log("1000000000000000000")).await.unwrap();
        let job = p.queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.kind, EventKind::Withdraw);
        assert_eq!(job.payload.primary_amount(), "1000000000000000000");
    }

    #[tokio::test]
    async fn run_drops_malformed_logs() {
        let p = producer();
        let logs = futures::stream::iter(vec![
            withdraw_log("5"),
            withdraw_log("-3"),
            DecodedLog::new("Borrow", vec![], TX),
            withdraw_log("7"),
        ]);
        let stats = p.run(logs).await;
        assert_eq!(
            stats,
            ProducerStats { received: 4, enqueued: 2, malformed: 2, enqueue_errors: 0 }
        );
        assert_eq!(p.queue.counts().await.unwrap().waiting, 2);
    }
}
