//! Entity store writer: one domain event → one entity.
//!
//! # Entity layout
//! - payload: JSON of the event fields plus `protocol` and `eventType`
//! - attributes: `protocol`, `eventType`, every field in ABI order, `dedupKey`
//! - lifetime: from the [`TtlPolicy`]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use lendwatch_core::{
    Attribute, DomainEvent, EntityCreate, EntityQuery, EntityStore, EventKind, Receipt,
    StoreConfig, StoreError, StoreHandler, TtlMode, PROTOCOL,
};

/// Lifetime of production entities (24 hours).
pub const PRODUCTION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Lifetime of short-lived (prototype) entities.
pub const PROTOTYPE_TTL: Duration = Duration::from_secs(200);

pub const CONTENT_TYPE: &str = "application/json";
pub const DEDUP_KEY_ATTR: &str = "dedupKey";

/// Which event kinds are stored short-lived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TtlPolicy {
    short_lived: BTreeSet<EventKind>,
}

impl TtlPolicy {
    /// Every kind production-lived.
    pub fn production() -> Self {
        Self::default()
    }

    /// Every kind short-lived.
    pub fn prototype() -> Self {
        Self {
            short_lived: EventKind::ALL.into_iter().collect(),
        }
    }

    pub fn from_mode(mode: TtlMode) -> Self {
        match mode {
            TtlMode::Production => Self::production(),
            TtlMode::Prototype => Self::prototype(),
        }
    }

    pub fn with_short_lived(mut self, kind: EventKind) -> Self {
        self.short_lived.insert(kind);
        self
    }

    pub fn ttl_for(&self, kind: EventKind) -> Duration {
        if self.short_lived.contains(&kind) {
            PROTOTYPE_TTL
        } else {
            PRODUCTION_TTL
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Look up `dedupKey` before creating, and skip events already stored.
    pub dedup: bool,
    pub ttl: TtlPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            dedup: true,
            ttl: TtlPolicy::production(),
        }
    }
}

impl From<&StoreConfig> for WriterConfig {
    fn from(cfg: &StoreConfig) -> Self {
        Self {
            dedup: cfg.dedup,
            ttl: TtlPolicy::from_mode(cfg.ttl),
        }
    }
}

/// Writes domain events to an [`EntityStore`].
pub struct EntityStoreWriter<S> {
    store: S,
    config: WriterConfig,
}

impl<S: EntityStore> EntityStoreWriter<S> {
    pub fn new(store: S, config: WriterConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Build the create request for `event` without sending it.
    pub fn build_create(&self, event: &DomainEvent) -> Result<EntityCreate, StoreError> {
        let kind = event.kind();

        // The tagged serialization already carries `eventType`.
        let mut body = serde_json::to_value(event)?;
        if let Value::Object(map) = &mut body {
            map.insert("protocol".into(), Value::String(PROTOCOL.into()));
        }

        let fields = event.fields();
        let mut attributes = Vec::with_capacity(fields.len() + 3);
        attributes.push(Attribute::new("protocol", PROTOCOL));
        attributes.push(Attribute::new("eventType", kind.as_str()));
        attributes.extend(fields.into_iter().map(|(k, v)| Attribute::new(k, v)));
        attributes.push(Attribute::new(DEDUP_KEY_ATTR, event.dedup_key()));

        Ok(EntityCreate {
            payload: serde_json::to_vec(&body)?,
            content_type: CONTENT_TYPE.into(),
            attributes,
            expires_in: self.config.ttl.ttl_for(kind),
        })
    }

    /// Persist `event`. With dedup on, an already-stored event returns the
    /// existing entity's receipt and no create is issued.
    pub async fn write(&self, event: &DomainEvent) -> Result<Receipt, StoreError> {
        if self.config.dedup {
            let key = event.dedup_key();
            let existing = self
                .store
                .query(EntityQuery {
                    with_payload: false,
                    with_attributes: false,
                    ..EntityQuery::where_eq(DEDUP_KEY_ATTR, key.as_str())
                })
                .await?;
            if let Some(entity) = existing.into_iter().next() {
                debug!(
                    kind = %event.kind(),
                    tx_hash = %event.tx_hash(),
                    entity_key = %entity.key,
                    "event already stored"
                );
                return Ok(Receipt {
                    entity_key: entity.key,
                    tx_hash: None,
                    duplicate: true,
                });
            }
        }

        let request = self.build_create(event)?;
        let receipt = self.store.create(request).await?;
        debug!(
            kind = %event.kind(),
            tx_hash = %event.tx_hash(),
            entity_key = %receipt.entity_key,
            "entity created"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl<S: EntityStore> StoreHandler for EntityStoreWriter<S> {
    async fn handle(&self, event: &DomainEvent) -> Result<Receipt, StoreError> {
        self.write(event).await
    }
}
