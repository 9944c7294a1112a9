//! lendwatch-store: persists normalized events as entities in the remote store.
//!
//! - [`writer`]: builds the entity (payload, attributes, TTL) for an event and
//!   writes it, skipping events already stored
//! - [`memory`]: in-process [`EntityStore`](lendwatch_core::EntityStore) with
//!   a block clock, for tests and local runs
//! - [`http`]: JSON-RPC gateway client
//!
//! The writer never retries; a failed write goes back to the queue, which owns
//! the retry policy.

pub mod http;
pub mod memory;
pub mod rpc;
pub mod writer;

pub use http::HttpEntityStore;
pub use memory::MemoryEntityStore;
pub use writer::{EntityStoreWriter, TtlPolicy, WriterConfig, PRODUCTION_TTL, PROTOTYPE_TTL};
