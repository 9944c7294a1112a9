//! lendwatch-query: read side of the pipeline.
//!
//! The store answers one equality predicate per query, so every operation is
//! two-phase: a broad server-side predicate (`protocol` or `eventType`), then
//! residual filtering, sorting and aggregation in process over a bounded
//! window of entities.
//!
//! # Example
//!
//! ```rust,no_run
//! use lendwatch_core::QueryConfig;
//! use lendwatch_query::{EventFilters, QueryEngine};
//! use lendwatch_store::MemoryEntityStore;
//!
//! # async fn example() -> Result<(), lendwatch_query::QueryError> {
//! let engine = QueryEngine::new(MemoryEntityStore::new(), QueryConfig::default());
//! let _recent = engine.query_all(20).await?;
//! let _big_withdraws = engine
//!     .query_with_filters(
//!         &EventFilters::new()
//!             .with_event_type(lendwatch_core::EventKind::Withdraw)
//!             .with_min_amount("1000000000000000000"),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod filter;
pub mod parsed;
pub mod pricing;
pub mod stats;

pub use engine::QueryEngine;
pub use error::QueryError;
pub use filter::{EventFilters, ValidatedFilters, DEFAULT_LIMIT};
pub use parsed::{parse_entity, ParsedEvent};
pub use pricing::{format_usd, short_address, symbol_for, token_by_address, usd_value, Token, TOKENS};
pub use stats::{EventStats, RECENT_EVENTS};
