//! `lendwatch query` and `lendwatch stats`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use lendwatch_core::{EntityStore, EventKind};
use lendwatch_query::{EventFilters, ParsedEvent, QueryEngine};

use crate::backends::Backends;

/// What to fetch.
pub enum Selection {
    All,
    Kind(EventKind),
    User(String),
    Asset(String),
    Filtered(EventFilters),
}

fn engine(backends: &Backends) -> QueryEngine<Arc<dyn EntityStore>> {
    QueryEngine::new(Arc::clone(&backends.store), backends.config.query.clone())
}

pub async fn run(backends: &Backends, selection: Selection, limit: usize) -> Result<()> {
    let engine = engine(backends);
    let events: Vec<ParsedEvent> = match selection {
        Selection::All => engine.query_all(limit).await?,
        Selection::Kind(kind) => engine.query_by_type(kind, limit).await?,
        Selection::User(user) => engine.query_by_user(&user, limit).await?,
        Selection::Asset(asset) => engine.query_by_asset(&asset, limit).await?,
        Selection::Filtered(filters) => engine.query_with_filters(&filters).await?,
    };
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

pub async fn stats(backends: &Backends) -> Result<()> {
    let stats = engine(backends).compute_stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// `--type` value: `Withdraw`, `flash-loan`, `liquidationcall`, …
pub fn parse_kind(s: &str) -> Result<EventKind> {
    s.parse().map_err(|e: String| anyhow!(e))
}

/// RFC 3339 timestamp for `--start` / `--end`.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| anyhow!("'{s}' is not an RFC 3339 timestamp: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_time_arguments() {
        assert_eq!(parse_kind("flash-loan").unwrap(), EventKind::FlashLoan);
        assert!(parse_kind("borrow").is_err());
        assert_eq!(
            parse_time("2024-05-01T00:00:00Z").unwrap().timestamp(),
            1_714_521_600
        );
        assert!(parse_time("yesterday").is_err());
    }
}
