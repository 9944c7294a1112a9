//! Error types for the queue, worker and producer.

use thiserror::Error;

use lendwatch_core::{EventKind, MalformedEventError, StoreError};

use crate::job::JobId;

/// Errors raised by a queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing resource failed (connection lost, query error).
    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Job {id} not found")]
    NotFound { id: JobId },

    #[error("Job {id} is not in the failed state")]
    NotFailed { id: JobId },

    #[error("Job kind {kind} does not match payload kind {payload}")]
    KindMismatch { kind: EventKind, payload: EventKind },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while processing a single job.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// No store handler is registered for the job's kind. Retrying cannot fix
    /// this, so the job is failed immediately.
    #[error("No handler registered for event kind {kind}")]
    NoHandler { kind: EventKind },

    #[error("Store write failed: {0}")]
    Store(#[from] StoreError),
}

impl WorkerError {
    /// Returns `true` if the queue should schedule another attempt.
    ///
    /// Every store failure is retried until the attempt budget runs out,
    /// whatever its class: a gateway may answer 4xx for conditions that clear
    /// on their own. Only a missing handler skips the remaining attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NoHandler { .. })
    }
}

/// Errors raised when the listener hands a log to the queue.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] MalformedEventError),

    #[error("Enqueue failed: {0}")]
    Queue(#[from] QueueError),
}
