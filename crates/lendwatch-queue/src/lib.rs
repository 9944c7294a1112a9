//! lendwatch-queue: durable delivery of normalized events to the store writer.
//!
//! ```text
//! Producer (listener) ──enqueue──▶ DurableQueue ──dequeue──▶ Worker ──▶ HandlerRegistry
//!                                     ▲   │                     │
//!                                     │   └── QueueBackend      │
//!                                     └────── ack / nack ◀──────┘
//! ```
//!
//! Backends:
//! - [`memory`]: in-process (tests, ephemeral runs)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Delivery is at-least-once. A failed job is retried with exponential
//! backoff until its attempt budget runs out, then parked in the failed set
//! for operator inspection.

pub mod backend;
pub mod error;
pub mod job;
pub mod memory;
pub mod policy;
pub mod producer;
pub mod queue;
pub mod worker;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use backend::{QueueBackend, QueueCounts};
pub use error::{ProduceError, QueueError, WorkerError};
pub use job::{JobId, JobState, QueueJob};
pub use memory::MemoryQueue;
pub use policy::{Backoff, RetryPolicy};
pub use producer::{Producer, ProducerStats};
pub use queue::{DurableQueue, NackOutcome, DEFAULT_LEASE};
pub use worker::{JobOutcome, Worker, WorkerEvent, WorkerMetrics};
