//! `DurableQueue`: enqueue / dequeue / ack / nack over a [`QueueBackend`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use lendwatch_core::{DomainEvent, EventKind, QueueConfig};

use crate::backend::{QueueBackend, QueueCounts};
use crate::error::QueueError;
use crate::job::{JobId, JobState, QueueJob};
use crate::policy::RetryPolicy;

/// Upper bound on a single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long a delivery may stay unsettled before the job is claimable again.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// What `nack` did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum NackOutcome {
    /// Scheduled for another delivery after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Moved to the failed set.
    DeadLettered,
}

/// Named, persistent FIFO of pending events with per-job retry policy.
///
/// Cloning is cheap; clones share the backend and the wake-up signal.
#[derive(Clone)]
pub struct DurableQueue {
    name: String,
    backend: Arc<dyn QueueBackend>,
    default_policy: RetryPolicy,
    lease: Duration,
    notify: Arc<Notify>,
}

impl DurableQueue {
    pub fn new(name: impl Into<String>, backend: Arc<dyn QueueBackend>, default_policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            backend,
            default_policy,
            lease: DEFAULT_LEASE,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Replace the delivery lease.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Queue named and tuned by `config` on top of `backend`.
    pub fn from_config(config: &QueueConfig, backend: Arc<dyn QueueBackend>) -> Self {
        let policy = RetryPolicy::exponential(
            config.attempts,
            Duration::from_millis(config.base_delay_ms),
        );
        Self::new(config.name.clone(), backend, policy)
            .with_lease(Duration::from_millis(config.lease_ms))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_policy(&self) -> RetryPolicy {
        self.default_policy
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    /// Persist a job for `payload`. Returns once the backend has stored it.
    ///
    /// `kind` must match the payload's variant.
    pub async fn enqueue(
        &self,
        kind: EventKind,
        payload: DomainEvent,
        policy: Option<RetryPolicy>,
    ) -> Result<JobId, QueueError> {
        if payload.kind() != kind {
            return Err(QueueError::KindMismatch {
                kind,
                payload: payload.kind(),
            });
        }
        let job = QueueJob::new(kind, payload, policy.unwrap_or(self.default_policy), Utc::now());
        let id = job.id;
        self.backend.push(job).await?;
        debug!(queue = %self.name, job_id = %id, kind = %kind, "job enqueued");
        self.notify.notify_one();
        Ok(id)
    }

    /// Claim the next ready job, if any.
    pub async fn dequeue(&self) -> Result<Option<QueueJob>, QueueError> {
        self.dequeue_at(Utc::now()).await
    }

    /// Claim the next job ready at `now`. Lets callers step over backoff
    /// delays and leases without sleeping.
    ///
    /// A job whose lease ran out without an ack or nack is delivered again,
    /// and that delivery counts against its attempt budget. A stalled job
    /// with no attempts left is dead-lettered instead.
    pub async fn dequeue_at(&self, now: DateTime<Utc>) -> Result<Option<QueueJob>, QueueError> {
        let lease = chrono::Duration::from_std(self.lease).unwrap_or_else(|_| chrono::Duration::zero());
        loop {
            let Some(job) = self.backend.claim(now, now + lease).await? else {
                return Ok(None);
            };
            if job.attempt <= job.policy.attempts {
                return Ok(Some(job));
            }
            self.backend
                .fail(job.id, "lease expired on the final attempt")
                .await?;
            warn!(
                queue = %self.name,
                job_id = %job.id,
                kind = %job.kind,
                attempt = job.attempt,
                "stalled job moved to failed set"
            );
        }
    }

    /// Mark a delivered job done; it will not be delivered again.
    ///
    /// If this fails the job stays active and is redelivered once its lease
    /// expires.
    pub async fn ack(&self, job: &QueueJob) -> Result<(), QueueError> {
        self.backend.complete(job.id).await
    }

    /// Report a failed delivery.
    ///
    /// A retryable failure with attempts left is rescheduled after the
    /// policy's backoff; anything else is dead-lettered.
    pub async fn nack(
        &self,
        job: &QueueJob,
        error: &str,
        retryable: bool,
    ) -> Result<NackOutcome, QueueError> {
        self.nack_at(job, error, retryable, Utc::now()).await
    }

    pub async fn nack_at(
        &self,
        job: &QueueJob,
        error: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<NackOutcome, QueueError> {
        let delay = if retryable {
            job.policy.delay_after(job.attempt)
        } else {
            None
        };

        match delay {
            Some(delay) => {
                let capped = delay.min(MAX_DELAY);
                let available_at =
                    now + chrono::Duration::from_std(capped).unwrap_or_else(|_| chrono::Duration::zero());
                self.backend.reschedule(job.id, available_at, error).await?;
                debug!(
                    queue = %self.name,
                    job_id = %job.id,
                    attempt = job.attempt,
                    delay_ms = delay.as_millis() as u64,
                    "job rescheduled"
                );
                self.notify.notify_one();
                Ok(NackOutcome::Retrying {
                    attempt: job.attempt,
                    delay,
                })
            }
            None => {
                self.backend.fail(job.id, error).await?;
                warn!(
                    queue = %self.name,
                    job_id = %job.id,
                    kind = %job.kind,
                    attempt = job.attempt,
                    error,
                    "job moved to failed set"
                );
                Ok(NackOutcome::DeadLettered)
            }
        }
    }

    /// Wait until a job may be ready or `timeout` elapses.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    /// Jobs in the failed set, oldest first.
    pub async fn failed_jobs(&self) -> Result<Vec<QueueJob>, QueueError> {
        self.backend.list(JobState::Failed).await
    }

    /// Move a failed job back to waiting with a fresh attempt budget.
    pub async fn retry_failed(&self, id: JobId) -> Result<(), QueueError> {
        self.backend.requeue_failed(id, Utc::now()).await?;
        info!(queue = %self.name, job_id = %id, "failed job requeued");
        self.notify.notify_one();
        Ok(())
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.backend.counts().await
    }

    pub async fn get(&self, id: JobId) -> Result<Option<QueueJob>, QueueError> {
        self.backend.get(id).await
    }
}

impl std::fmt::Debug for DurableQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableQueue")
            .field("name", &self.name)
            .field("default_policy", &self.default_policy)
            .field("lease", &self.lease)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use lendwatch_core::{SupplyEvent, WithdrawEvent};

    fn queue() -> DurableQueue {
        DurableQueue::new("tx-queue", Arc::new(MemoryQueue::new()), RetryPolicy::default())
    }

    fn withdraw() -> DomainEvent {
        DomainEvent::Withdraw(WithdrawEvent {
            reserve: "0xreserve".into(),
            user: "0xuser".into(),
            to: "0xto".into(),
            amount: "1000000000000000000".into(),
            tx_hash: "0xhash".into(),
        })
    }

    #[tokio::test]
    async fn enqueue_then_dequeue() {
        let q = queue();
        let id = q.enqueue(EventKind::Withdraw, withdraw(), None).await.unwrap();
        let job = q.dequeue().await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.payload, withdraw());
        q.ack(&job).await.unwrap();
        assert!(q.dequeue().await.unwrap().is_none());
        assert_eq!(q.counts().await.unwrap().pending(), 0);
    }

    #[tokio::test]
    async fn kind_mismatch_rejected() {
        let q = queue();
        let err = q.enqueue(EventKind::Supply, withdraw(), None).await.unwrap_err();
        assert!(matches!(err, QueueError::KindMismatch { .. }));
        assert_eq!(q.counts().await.unwrap(), QueueCounts::default());
    }

    #[tokio::test]
    async fn retries_follow_backoff_then_dead_letter() {
        let q = queue();
        q.enqueue(EventKind::Withdraw, withdraw(), None).await.unwrap();

        let mut now = Utc::now();
        let mut delays = Vec::new();
        let mut deliveries = 0;
        while let Some(job) = q.dequeue_at(now).await.unwrap() {
            deliveries += 1;
            match q.nack_at(&job, "store down", true, now).await.unwrap() {
                NackOutcome::Retrying { delay, .. } => {
                    delays.push(delay.as_millis());
                    now = now + chrono::Duration::from_std(delay).unwrap();
                }
                NackOutcome::DeadLettered => break,
            }
        }

        assert_eq!(deliveries, 5);
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000]);
        let failed = q.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempt, 5);
        assert_eq!(failed[0].last_error.as_deref(), Some("store down"));
        assert!(q
            .dequeue_at(now + chrono::Duration::hours(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn non_retryable_dead_letters_immediately() {
        let q = queue();
        q.enqueue(EventKind::Withdraw, withdraw(), None).await.unwrap();
        let job = q.dequeue().await.unwrap().unwrap();
        assert_eq!(
            q.nack(&job, "no handler", false).await.unwrap(),
            NackOutcome::DeadLettered
        );
        assert_eq!(q.counts().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn retry_failed_restores_budget() {
        let q = queue();
        let id = q
            .enqueue(EventKind::Withdraw, withdraw(), Some(RetryPolicy::fixed(1, Duration::ZERO)))
            .await
            .unwrap();
        let job = q.dequeue().await.unwrap().unwrap();
        q.nack(&job, "boom", true).await.unwrap();
        assert_eq!(q.failed_jobs().await.unwrap().len(), 1);

        q.retry_failed(id).await.unwrap();
        let again = q.dequeue().await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempt, 1);
    }

    #[tokio::test]
    async fn unsettled_job_is_redelivered_after_lease() {
        let q = queue().with_lease(Duration::from_secs(30));
        let id = q.enqueue(EventKind::Withdraw, withdraw(), None).await.unwrap();
        let now = Utc::now();

        let first = q.dequeue_at(now).await.unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        // Neither acked nor nacked: held until the lease ends.
        assert!(q
            .dequeue_at(now + chrono::Duration::seconds(29))
            .await
            .unwrap()
            .is_none());

        let again = q
            .dequeue_at(now + chrono::Duration::seconds(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempt, 2);
        q.ack(&again).await.unwrap();
        assert_eq!(q.counts().await.unwrap().pending(), 0);
    }

    #[tokio::test]
    async fn stalled_job_without_attempts_left_is_dead_lettered() {
        let q = queue().with_lease(Duration::from_secs(30));
        let id = q
            .enqueue(EventKind::Withdraw, withdraw(), Some(RetryPolicy::fixed(1, Duration::ZERO)))
            .await
            .unwrap();
        let now = Utc::now();
        q.dequeue_at(now).await.unwrap().unwrap();

        assert!(q
            .dequeue_at(now + chrono::Duration::minutes(1))
            .await
            .unwrap()
            .is_none());
        let failed = q.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, id);
        assert!(failed[0].last_error.as_deref().unwrap().contains("lease expired"));
    }

    #[tokio::test]
    async fn fifo_across_kinds() {
        let q = queue();
        let supply = DomainEvent::Supply(SupplyEvent {
            reserve: "0xr".into(),
            user: "0xu".into(),
            on_behalf_of: "0xu".into(),
            amount: "5".into(),
            referral_code: "0".into(),
            tx_hash: "0xh".into(),
        });
        let a = q.enqueue(EventKind::Supply, supply, None).await.unwrap();
        let b = q.enqueue(EventKind::Withdraw, withdraw(), None).await.unwrap();
        assert_eq!(q.dequeue().await.unwrap().unwrap().id, a);
        assert_eq!(q.dequeue().await.unwrap().unwrap().id, b);
    }
}
