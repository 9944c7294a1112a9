//! lendwatch-core: foundation types for the lending-protocol event pipeline.
//!
//! # Architecture
//!
//! ```text
//! DecodedLog → normalize() → DomainEvent
//!                               │
//!                 Queue → Worker → HandlerRegistry → StoreHandler → EntityStore
//!                                                                      │
//!                                      QueryEngine ← StoredEntity ←────┘
//! ```
//!
//! This crate holds everything the other crates agree on: the four
//! [`DomainEvent`] variants, the [`normalizer`], the store entity model and the
//! [`EntityStore`] trait, and the [`HandlerRegistry`] used by the worker.

pub mod config;
pub mod entity;
pub mod error;
pub mod event;
pub mod handler;
pub mod normalizer;

pub use config::{LendwatchConfig, QueryConfig, QueueConfig, StoreConfig, TtlMode, WorkerConfig};
pub use entity::{Attribute, EntityCreate, EntityQuery, EntityStore, Predicate, Receipt, StoredEntity};
pub use error::{ConfigError, MalformedEventError, StoreError};
pub use event::{
    DomainEvent, EventKind, FlashLoanEvent, LiquidationCallEvent, SupplyEvent, WithdrawEvent,
    PROTOCOL,
};
pub use handler::{HandlerRegistry, StoreHandler};
pub use normalizer::{normalize, DecodedLog, LogValue};
