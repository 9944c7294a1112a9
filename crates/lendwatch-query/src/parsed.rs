//! Decoding stored entities back into events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use lendwatch_core::{DomainEvent, EventKind, StoredEntity, PROTOCOL};

use crate::error::QueryError;
use crate::pricing::{format_usd, symbol_for, usd_value};

/// Attribute names the event type has been stored under, newest first.
const EVENT_TYPE_ATTRS: [&str; 2] = ["eventType", "event-type"];

/// A stored event plus read-side metadata. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEvent {
    pub entity_key: String,
    pub protocol: String,
    /// Derived from `created_at_block`; "now" when the block is unknown.
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_block: Option<u64>,
    #[serde(rename = "amountUSD", skip_serializing_if = "Option::is_none")]
    pub amount_usd: Option<String>,
    pub reserve_symbol: String,
    /// Flattened: contributes `eventType` and the variant's fields.
    #[serde(flatten)]
    pub event: DomainEvent,
}

impl ParsedEvent {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

/// Decode one entity. `block_time_ms` converts `created_at_block` to a
/// timestamp.
pub fn parse_entity(
    entity: &StoredEntity,
    block_time_ms: u64,
    now: DateTime<Utc>,
) -> Result<ParsedEvent, QueryError> {
    let malformed = |reason: String| QueryError::MalformedEntity {
        key: entity.key.clone(),
        reason,
    };

    let body: Value = serde_json::from_slice(&entity.payload)
        .map_err(|e| malformed(format!("payload is not JSON: {e}")))?;

    let type_name = EVENT_TYPE_ATTRS
        .iter()
        .find_map(|k| entity.attribute(k))
        .or_else(|| body.get("eventType").and_then(Value::as_str))
        .ok_or_else(|| malformed("no event type attribute".into()))?;
    let kind: EventKind = type_name.parse().map_err(malformed)?;

    let event = DomainEvent::from_value(kind, body)
        .map_err(|e| malformed(format!("payload does not match {kind}: {e}")))?;

    let timestamp = entity
        .created_at_block
        .and_then(|block| i64::try_from(block.saturating_mul(block_time_ms)).ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(now);

    let asset = event.primary_asset();
    let amount_usd = usd_value(event.primary_amount_u256(), asset).map(format_usd);
    let reserve_symbol = symbol_for(asset);

    Ok(ParsedEvent {
        entity_key: entity.key.clone(),
        protocol: entity.attribute("protocol").unwrap_or(PROTOCOL).to_string(),
        timestamp,
        created_at_block: entity.created_at_block,
        amount_usd,
        reserve_symbol,
        event,
    })
}
