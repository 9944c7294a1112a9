//! `QueryEngine`: predicate query → parse → residual filter → sort → limit.

use chrono::Utc;
use tracing::debug;

use lendwatch_core::{EntityQuery, EntityStore, EventKind, QueryConfig};

use crate::error::QueryError;
use crate::filter::{parse_address, EventFilters};
use crate::parsed::{parse_entity, ParsedEvent};
use crate::stats::EventStats;

/// Read-only query surface over an [`EntityStore`]. Safe to share between
/// tasks; every call is an independent store query.
pub struct QueryEngine<S> {
    store: S,
    config: QueryConfig,
}

impl<S: EntityStore> QueryEngine<S> {
    pub fn new(store: S, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Fetch everything matching `key == value`, newest first.
    async fn fetch(&self, key: &str, value: &str) -> Result<Vec<ParsedEvent>, QueryError> {
        let entities = self.store.query(EntityQuery::where_eq(key, value)).await?;
        let now = Utc::now();
        let mut events = entities
            .iter()
            .map(|e| parse_entity(e, self.config.block_time_ms, now))
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(predicate = %format!("{key}={value}"), fetched = events.len(), "store query");
        Ok(events)
    }

    /// Up to `limit` protocol events, newest first.
    pub async fn query_all(&self, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        let mut events = self.fetch("protocol", &self.config.protocol).await?;
        events.truncate(limit);
        Ok(events)
    }

    /// Up to `limit` events of one kind, newest first.
    pub async fn query_by_type(&self, kind: EventKind, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        let mut events = self.fetch("eventType", kind.as_str()).await?;
        events.truncate(limit);
        Ok(events)
    }

    pub async fn query_withdraws(&self, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        self.query_by_type(EventKind::Withdraw, limit).await
    }

    pub async fn query_supplies(&self, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        self.query_by_type(EventKind::Supply, limit).await
    }

    pub async fn query_flash_loans(&self, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        self.query_by_type(EventKind::FlashLoan, limit).await
    }

    pub async fn query_liquidations(&self, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        self.query_by_type(EventKind::LiquidationCall, limit).await
    }

    /// Events whose actor is `address` (case-insensitive).
    ///
    /// Only the newest `window` protocol events are scanned, so older
    /// matches are not returned. `address` must be a 20-byte hex address.
    pub async fn query_by_user(&self, address: &str, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        let address = parse_address("user", address)?;
        let events = self.query_all(self.config.window).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.event.actor().eq_ignore_ascii_case(&address))
            .take(limit)
            .collect())
    }

    /// Events whose primary asset is `address` (case-insensitive). Same
    /// window limit as [`query_by_user`](Self::query_by_user).
    pub async fn query_by_asset(&self, address: &str, limit: usize) -> Result<Vec<ParsedEvent>, QueryError> {
        let address = parse_address("asset", address)?;
        let events = self.query_all(self.config.window).await?;
        Ok(events
            .into_iter()
            .filter(|e| e.event.primary_asset().eq_ignore_ascii_case(&address))
            .take(limit)
            .collect())
    }

    /// Validate `filters`, query by event type when set (else by protocol),
    /// then apply the remaining criteria.
    pub async fn query_with_filters(&self, filters: &EventFilters) -> Result<Vec<ParsedEvent>, QueryError> {
        let filters = filters.validate()?;
        let candidates = match filters.event_type {
            Some(kind) => self.query_by_type(kind, self.config.window).await?,
            None => self.query_all(self.config.window).await?,
        };
        Ok(candidates
            .into_iter()
            .filter(|e| filters.matches(e))
            .take(filters.limit)
            .collect())
    }

    /// Statistics over the newest `window` protocol events.
    pub async fn compute_stats(&self) -> Result<EventStats, QueryError> {
        let events = self.query_all(self.config.window).await?;
        EventStats::from_events(&events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use lendwatch_core::{Attribute, DomainEvent, FlashLoanEvent, StoredEntity, SupplyEvent, WithdrawEvent};
    use lendwatch_store::{EntityStoreWriter, MemoryEntityStore, WriterConfig};
    use std::sync::Arc;

    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn tx(n: u8) -> String {
        format!("0x{}", format!("{n:02x}").repeat(32))
    }

    fn withdraw(user: &str, asset: &str, amount: &str, n: u8) -> DomainEvent {
        DomainEvent::Withdraw(WithdrawEvent {
            reserve: asset.into(),
            user: user.into(),
            to: user.into(),
            amount: amount.into(),
            tx_hash: tx(n),
        })
    }

    fn supply(user: &str, asset: &str, amount: &str, n: u8) -> DomainEvent {
        DomainEvent::Supply(SupplyEvent {
            reserve: asset.into(),
            user: user.into(),
            on_behalf_of: user.into(),
            amount: amount.into(),
            referral_code: "0".into(),
            tx_hash: tx(n),
        })
    }

    fn flash_loan(initiator: &str, amount: &str, n: u8) -> DomainEvent {
        DomainEvent::FlashLoan(FlashLoanEvent {
            target: BOB.into(),
            initiator: initiator.into(),
            asset: USDC.into(),
            amount: amount.into(),
            interest_rate_mode: "0".into(),
            premium: "9".into(),
            referral_code: "0".into(),
            tx_hash: tx(n),
        })
    }

    async fn engine_with(events: &[DomainEvent]) -> QueryEngine<Arc<MemoryEntityStore>> {
        let store = Arc::new(MemoryEntityStore::new());
        let writer = EntityStoreWriter::new(Arc::clone(&store), WriterConfig::default());
        for e in events {
            writer.write(e).await.unwrap();
        }
        QueryEngine::new(store, QueryConfig::default())
    }

    #[tokio::test]
    async fn query_all_sorted_and_limited() {
        let engine = engine_with(&[
            withdraw(ALICE, WETH, "1", 1),
            withdraw(ALICE, WETH, "2", 2),
            withdraw(ALICE, WETH, "3", 3),
        ])
        .await;

        let events = engine.query_all(2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.primary_amount(), "3");
        assert!(events[0].timestamp >= events[1].timestamp);
    }

    #[tokio::test]
    async fn typed_shortcuts() {
        let engine = engine_with(&[
            withdraw(ALICE, WETH, "1", 1),
            supply(ALICE, WETH, "2", 2),
            flash_loan(BOB, "3", 3),
        ])
        .await;

        assert_eq!(engine.query_withdraws(10).await.unwrap().len(), 1);
        assert_eq!(engine.query_supplies(10).await.unwrap().len(), 1);
        let loans = engine.query_flash_loans(10).await.unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].kind(), EventKind::FlashLoan);
        assert!(engine.query_liquidations(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_matches_actor_case_insensitively() {
        let engine = engine_with(&[
            withdraw(ALICE, WETH, "1", 1),
            supply(BOB, WETH, "2", 2),
            flash_loan(ALICE, "3", 3),
        ])
        .await;

        let upper = ALICE.to_ascii_uppercase().replacen("0X", "0x", 1);
        let events = engine.query_by_user(&upper, 100).await.unwrap();
        assert_eq!(events.len(), 2);
        let all = engine.query_all(1_000).await.unwrap();
        assert!(events.iter().all(|e| all.contains(e)));
    }

    #[tokio::test]
    async fn asset_filter_uses_primary_asset() {
        let engine = engine_with(&[
            withdraw(ALICE, WETH, "1", 1),
            supply(BOB, WETH, "2", 2),
            flash_loan(ALICE, "3", 3),
        ])
        .await;
        assert_eq!(engine.query_by_asset(WETH, 100).await.unwrap().len(), 2);
        assert_eq!(engine.query_by_asset(USDC, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn user_and_asset_lookups_reject_non_addresses() {
        let engine = engine_with(&[withdraw(ALICE, WETH, "1", 1)]).await;

        let err = engine.query_by_user("alice", 10).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { field: "user", .. }), "{err}");
        let err = engine.query_by_asset("weth", 10).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { field: "asset", .. }), "{err}");
        // Surrounding whitespace is tolerated, as in filters.
        assert_eq!(engine.query_by_user(&format!(" {ALICE} "), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_overflow_is_an_error() {
        let max = U256::MAX.to_string();
        let engine = engine_with(&[
            withdraw(ALICE, WETH, &max, 1),
            withdraw(BOB, WETH, "1", 2),
        ])
        .await;

        let err = engine.compute_stats().await.unwrap_err();
        assert!(
            matches!(err, QueryError::VolumeOverflow { ref asset } if asset == WETH),
            "{err}"
        );
    }

    #[tokio::test]
    async fn filters_combine() {
        let engine = engine_with(&[
            withdraw(ALICE, WETH, "100", 1),
            withdraw(ALICE, WETH, "5", 2),
            withdraw(BOB, WETH, "100", 3),
            supply(ALICE, WETH, "100", 4),
        ])
        .await;

        let filters = EventFilters::new()
            .with_event_type(EventKind::Withdraw)
            .with_user(ALICE)
            .with_min_amount("10");
        let events = engine.query_with_filters(&filters).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.tx_hash(), tx(1));

        let capped = engine
            .query_with_filters(&EventFilters::new().with_max_amount("50").with_limit(5))
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);

        let err = engine
            .query_with_filters(&EventFilters::new().with_asset("weth"))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidFilter { field: "asset", .. }));
    }

    #[tokio::test]
    async fn stats_over_window() {
        let engine = engine_with(&[
            withdraw(ALICE, WETH, "100", 1),
            withdraw(BOB, WETH, "50", 2),
            supply(ALICE, WETH, "25", 3),
        ])
        .await;

        let stats = engine.compute_stats().await.unwrap();
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_by_type[&EventKind::Withdraw], 2);
        assert_eq!(stats.events_by_type[&EventKind::Supply], 1);
        assert_eq!(stats.total_volume_wei[WETH], "175");
        assert_eq!(stats.unique_users, 2);
        assert_eq!(stats.recent_events.len(), 3);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["eventsByType"]["Withdraw"], 2);
        assert_eq!(json["totalVolumeWei"][WETH], "175");
    }

    #[tokio::test]
    async fn store_and_parse_failures_surface() {
        let store = Arc::new(MemoryEntityStore::new());
        let engine = QueryEngine::new(Arc::clone(&store), QueryConfig::default());

        store.fail_next_queries(1).await;
        assert!(matches!(engine.query_all(10).await, Err(QueryError::Store(_))));

        store
            .insert_entity(StoredEntity {
                key: "0xbroken".into(),
                payload: b"{".to_vec(),
                attributes: vec![
                    Attribute::new("protocol", "aave-v3"),
                    Attribute::new("eventType", "Withdraw"),
                ],
                content_type: None,
                expires_in: None,
                owner: None,
                created_at_block: None,
            })
            .await;
        assert!(matches!(
            engine.query_all(10).await,
            Err(QueryError::MalformedEntity { .. })
        ));
    }
}
