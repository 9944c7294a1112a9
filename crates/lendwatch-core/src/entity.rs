//! The remote entity store model and the [`EntityStore`] trait.
//!
//! An entity is an opaque payload plus an ordered list of string attributes
//! and a time-to-live. The store can only filter on attributes, and only on
//! one equality predicate per query.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::StoreError;

/// A `(key, value)` pair attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCreate {
    pub payload: Vec<u8>,
    pub content_type: String,
    pub attributes: Vec<Attribute>,
    /// Lifetime; the store drops the entity once it elapses.
    #[serde(with = "duration_secs")]
    pub expires_in: Duration,
}

/// Acknowledgement of a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub entity_key: String,
    /// Transaction hash of the store write, when the store is chain-backed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// `true` when the writer found an existing entity and skipped the create.
    #[serde(default)]
    pub duplicate: bool,
}

/// An entity as returned by a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntity {
    pub key: String,
    #[serde(default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default, with = "opt_duration_secs")]
    pub expires_in: Option<Duration>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub created_at_block: Option<u64>,
}

impl StoredEntity {
    /// First value of attribute `key`, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// The single equality filter a query may carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub value: String,
}

impl Predicate {
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, entity: &StoredEntity) -> bool {
        entity
            .attributes
            .iter()
            .any(|a| a.key == self.key && a.value == self.value)
    }
}

/// A query request: at most one predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityQuery {
    pub predicate: Option<Predicate>,
    pub with_payload: bool,
    pub with_attributes: bool,
}

impl EntityQuery {
    /// Query with `key == value`, requesting payload and attributes.
    pub fn where_eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            predicate: Some(Predicate::eq(key, value)),
            with_payload: true,
            with_attributes: true,
        }
    }
}

/// The remote entity store, used as an opaque write/read service.
///
/// A `create` either fully succeeds (returns a receipt) or fails as a whole.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create(&self, request: EntityCreate) -> Result<Receipt, StoreError>;

    async fn query(&self, query: EntityQuery) -> Result<Vec<StoredEntity>, StoreError>;
}

#[async_trait]
impl<S: EntityStore + ?Sized> EntityStore for std::sync::Arc<S> {
    async fn create(&self, request: EntityCreate) -> Result<Receipt, StoreError> {
        (**self).create(request).await
    }

    async fn query(&self, query: EntityQuery) -> Result<Vec<StoredEntity>, StoreError> {
        (**self).query(query).await
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> StoredEntity {
        StoredEntity {
            key: "0x01".into(),
            payload: b"{}".to_vec(),
            attributes: vec![
                Attribute::new("protocol", "aave-v3"),
                Attribute::new("eventType", "Withdraw"),
            ],
            content_type: Some("application/json".into()),
            expires_in: Some(Duration::from_secs(200)),
            owner: None,
            created_at_block: Some(10),
        }
    }

    #[test]
    fn predicate_matches_exact_attribute() {
        let e = entity();
        assert!(Predicate::eq("eventType", "Withdraw").matches(&e));
        assert!(!Predicate::eq("eventType", "withdraw").matches(&e));
        assert!(!Predicate::eq("user", "Withdraw").matches(&e));
    }

    #[test]
    fn attribute_lookup() {
        assert_eq!(entity().attribute("protocol"), Some("aave-v3"));
        assert_eq!(entity().attribute("missing"), None);
    }

    #[test]
    fn entity_json_shape() {
        let json = serde_json::to_value(entity()).unwrap();
        assert_eq!(json["createdAtBlock"], 10);
        assert_eq!(json["expiresIn"], 200);
        let back: StoredEntity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity());
    }
}
