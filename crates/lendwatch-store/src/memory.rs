//! In-memory entity store with a simulated block clock.
//!
//! Entities expire once the clock passes `created_at_block + ceil(ttl / block_time)`.
//! The clock only moves through [`MemoryEntityStore::advance_blocks`] or one
//! block per create, so tests control expiry exactly.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;

use lendwatch_core::{EntityCreate, EntityQuery, EntityStore, Receipt, StoreError, StoredEntity};

const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(12);
const DEFAULT_OWNER: &str = "0x0000000000000000000000000000000000000001";

struct Record {
    entity: StoredEntity,
    expires_at_block: u64,
}

#[derive(Default)]
struct State {
    records: Vec<Record>,
    block: u64,
    create_calls: u64,
    fail_creates: u32,
    fail_queries: u32,
}

pub struct MemoryEntityStore {
    state: Mutex<State>,
    block_time: Duration,
    owner: String,
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                block: 1,
                ..State::default()
            }),
            block_time: DEFAULT_BLOCK_TIME,
            owner: DEFAULT_OWNER.into(),
        }
    }

    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time.max(Duration::from_millis(1));
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub async fn current_block(&self) -> u64 {
        self.state.lock().await.block
    }

    /// Move the clock forward; entities past their lifetime disappear.
    pub async fn advance_blocks(&self, blocks: u64) {
        let mut state = self.state.lock().await;
        state.block = state.block.saturating_add(blocks);
        let block = state.block;
        state.records.retain(|r| r.expires_at_block > block);
    }

    /// Number of `create` calls received, failed ones included.
    pub async fn create_calls(&self) -> u64 {
        self.state.lock().await.create_calls
    }

    /// Live entities.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Make the next `n` creates fail with [`StoreError::Unavailable`].
    pub async fn fail_next_creates(&self, n: u32) {
        self.state.lock().await.fail_creates = n;
    }

    /// Make the next `n` queries fail with [`StoreError::Unavailable`].
    pub async fn fail_next_queries(&self, n: u32) {
        self.state.lock().await.fail_queries = n;
    }

    /// Store an entity as-is, bypassing the create path. Used to seed
    /// entities the writer would never produce.
    pub async fn insert_entity(&self, mut entity: StoredEntity) {
        let mut state = self.state.lock().await;
        let block = state.block;
        let created = *entity.created_at_block.get_or_insert(block);
        let lifetime = entity.expires_in.map(|ttl| self.ttl_blocks(ttl)).unwrap_or(u64::MAX);
        state.records.push(Record {
            entity,
            expires_at_block: created.saturating_add(lifetime),
        });
    }

    fn ttl_blocks(&self, ttl: Duration) -> u64 {
        let bt = self.block_time.as_millis();
        let blocks = ttl.as_millis().div_ceil(bt);
        u64::try_from(blocks).unwrap_or(u64::MAX).max(1)
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn create(&self, request: EntityCreate) -> Result<Receipt, StoreError> {
        let mut state = self.state.lock().await;
        state.create_calls += 1;
        if state.fail_creates > 0 {
            state.fail_creates -= 1;
            return Err(StoreError::Unavailable("injected create failure".into()));
        }

        let block = state.block;
        let key = format!("0x{:064x}", state.create_calls);
        let tx_hash = format!("0x{:064x}", u64::MAX - state.create_calls);
        let expires_at_block = block.saturating_add(self.ttl_blocks(request.expires_in));

        state.records.push(Record {
            entity: StoredEntity {
                key: key.clone(),
                payload: request.payload,
                attributes: request.attributes,
                content_type: Some(request.content_type),
                expires_in: Some(request.expires_in),
                owner: Some(self.owner.clone()),
                created_at_block: Some(block),
            },
            expires_at_block,
        });
        // One write per block.
        state.block += 1;

        Ok(Receipt {
            entity_key: key,
            tx_hash: Some(tx_hash),
            duplicate: false,
        })
    }

    async fn query(&self, query: EntityQuery) -> Result<Vec<StoredEntity>, StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_queries > 0 {
            state.fail_queries -= 1;
            return Err(StoreError::Unavailable("injected query failure".into()));
        }

        let block = state.block;
        Ok(state
            .records
            .iter()
            .filter(|r| r.expires_at_block > block)
            .filter(|r| query.predicate.as_ref().map_or(true, |p| p.matches(&r.entity)))
            .map(|r| {
                let mut entity = r.entity.clone();
                if !query.with_payload {
                    entity.payload.clear();
                }
                if !query.with_attributes {
                    entity.attributes.clear();
                }
                entity
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendwatch_core::Attribute;

    fn create(event_type: &str, ttl_secs: u64) -> EntityCreate {
        EntityCreate {
            payload: br#"{"amount":"1"}"#.to_vec(),
            content_type: "application/json".into(),
            attributes: vec![
                Attribute::new("protocol", "aave-v3"),
                Attribute::new("eventType", event_type),
            ],
            expires_in: Duration::from_secs(ttl_secs),
        }
    }

    #[tokio::test]
    async fn create_then_query_by_attribute() {
        let store = MemoryEntityStore::new();
        let a = store.create(create("Withdraw", 200)).await.unwrap();
        store.create(create("Supply", 200)).await.unwrap();

        let found = store
            .query(EntityQuery::where_eq("eventType", "Withdraw"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, a.entity_key);
        assert_eq!(found[0].created_at_block, Some(1));
        assert_eq!(found[0].owner.as_deref(), Some(DEFAULT_OWNER));

        let all = store
            .query(EntityQuery::where_eq("protocol", "aave-v3"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].created_at_block, Some(2));
    }

    #[tokio::test]
    async fn entities_expire() {
        // 200 s at 12 s blocks = 17 blocks.
        let store = MemoryEntityStore::new();
        store.create(create("Withdraw", 200)).await.unwrap();
        store.advance_blocks(15).await;
        assert_eq!(store.len().await, 1);
        store.advance_blocks(1).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn projection_flags() {
        let store = MemoryEntityStore::new();
        store.create(create("Withdraw", 200)).await.unwrap();
        let found = store
            .query(EntityQuery {
                with_payload: false,
                with_attributes: false,
                ..EntityQuery::where_eq("eventType", "Withdraw")
            })
            .await
            .unwrap();
        assert!(found[0].payload.is_empty());
        assert!(found[0].attributes.is_empty());
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryEntityStore::new();
        store.fail_next_creates(2).await;
        assert!(store.create(create("Withdraw", 200)).await.is_err());
        assert!(store.create(create("Withdraw", 200)).await.is_err());
        assert!(store.create(create("Withdraw", 200)).await.is_ok());
        assert_eq!(store.create_calls().await, 3);
        assert_eq!(store.len().await, 1);

        store.fail_next_queries(1).await;
        assert!(store.query(EntityQuery::where_eq("protocol", "aave-v3")).await.is_err());
        assert!(store.query(EntityQuery::where_eq("protocol", "aave-v3")).await.is_ok());
    }
}
