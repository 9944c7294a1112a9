//! The `QueueBackend` trait: persistence primitives behind [`DurableQueue`](crate::DurableQueue).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::job::{JobId, JobState, QueueJob};

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// Jobs that still need work (everything but failed).
    pub fn pending(&self) -> u64 {
        self.waiting + self.delayed + self.active
    }
}

/// Storage primitives for a named queue.
///
/// Backends only move jobs between states; the retry decision lives in
/// [`DurableQueue`](crate::DurableQueue). Every method returns after the
/// change is persisted.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Persist a new job.
    async fn push(&self, job: QueueJob) -> Result<(), QueueError>;

    /// Atomically claim the next ready or stalled job: mark it active, lock it
    /// until `locked_until` and increment its attempt counter. Jobs are
    /// ordered by `available_at`, then insertion.
    async fn claim(
        &self,
        now: DateTime<Utc>,
        locked_until: DateTime<Utc>,
    ) -> Result<Option<QueueJob>, QueueError>;

    /// Remove an acknowledged job.
    async fn complete(&self, id: JobId) -> Result<(), QueueError>;

    /// Move an active job to delayed until `available_at`.
    async fn reschedule(
        &self,
        id: JobId,
        available_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError>;

    /// Move a job to the failed (dead-letter) state.
    async fn fail(&self, id: JobId, error: &str) -> Result<(), QueueError>;

    /// Reset a failed job to waiting with a fresh attempt budget.
    async fn requeue_failed(&self, id: JobId, now: DateTime<Utc>) -> Result<(), QueueError>;

    async fn get(&self, id: JobId) -> Result<Option<QueueJob>, QueueError>;

    /// Jobs in `state`, oldest first.
    async fn list(&self, state: JobState) -> Result<Vec<QueueJob>, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;
}
