//! Multi-criteria event filters.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lendwatch_core::event::parse_u256;
use lendwatch_core::normalizer::normalize_address;
use lendwatch_core::EventKind;

use crate::error::QueryError;
use crate::parsed::ParsedEvent;

pub const DEFAULT_LIMIT: usize = 100;

/// Lowercase `0x`-prefixed form of a caller-supplied address.
pub(crate) fn parse_address(field: &'static str, s: &str) -> Result<String, QueryError> {
    normalize_address(s.trim())
        .ok_or_else(|| QueryError::invalid(field, format!("'{s}' is not a 20-byte hex address")))
}

/// Caller-supplied filters. Every field is optional; unset means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilters {
    #[serde(default)]
    pub event_type: Option<EventKind>,
    /// Matches the event's actor (`user`, or `initiator` for flash loans).
    #[serde(default)]
    pub user: Option<String>,
    /// Matches `reserve`, `asset` or `collateralAsset`.
    #[serde(default)]
    pub asset: Option<String>,
    /// Inclusive, in base units.
    #[serde(default)]
    pub min_amount: Option<String>,
    #[serde(default)]
    pub max_amount: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_type(mut self, kind: EventKind) -> Self {
        self.event_type = Some(kind);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_min_amount(mut self, amount: impl Into<String>) -> Self {
        self.min_amount = Some(amount.into());
        self
    }

    pub fn with_max_amount(mut self, amount: impl Into<String>) -> Self {
        self.max_amount = Some(amount.into());
        self
    }

    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check and normalize every field.
    pub fn validate(&self) -> Result<ValidatedFilters, QueryError> {
        let address = |field: &'static str, v: &Option<String>| -> Result<Option<String>, QueryError> {
            v.as_deref().map(|s| parse_address(field, s)).transpose()
        };
        let amount = |field: &'static str, v: &Option<String>| -> Result<Option<U256>, QueryError> {
            v.as_deref()
                .map(|s| {
                    parse_u256(s.trim())
                        .ok_or_else(|| QueryError::invalid(field, format!("'{s}' is not a non-negative integer")))
                })
                .transpose()
        };

        let user = address("user", &self.user)?;
        let asset = address("asset", &self.asset)?;
        let min_amount = amount("minAmount", &self.min_amount)?;
        let max_amount = amount("maxAmount", &self.max_amount)?;

        if let (Some(min), Some(max)) = (min_amount, max_amount) {
            if min > max {
                return Err(QueryError::invalid("minAmount", "greater than maxAmount"));
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(QueryError::invalid("start", "after end"));
            }
        }

        Ok(ValidatedFilters {
            event_type: self.event_type,
            user,
            asset,
            min_amount,
            max_amount,
            start: self.start,
            end: self.end,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT),
        })
    }
}

/// Filters after validation: lowercase addresses and integer bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFilters {
    pub event_type: Option<EventKind>,
    pub user: Option<String>,
    pub asset: Option<String>,
    pub min_amount: Option<U256>,
    pub max_amount: Option<U256>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl ValidatedFilters {
    /// Residual check applied after the server-side predicate.
    pub fn matches(&self, e: &ParsedEvent) -> bool {
        if self.event_type.is_some_and(|k| k != e.kind()) {
            return false;
        }
        if let Some(user) = &self.user {
            if !e.event.actor().eq_ignore_ascii_case(user) {
                return false;
            }
        }
        if let Some(asset) = &self.asset {
            if !e.event.primary_asset().eq_ignore_ascii_case(asset) {
                return false;
            }
        }
        if self.min_amount.is_some() || self.max_amount.is_some() {
            let amount = e.event.primary_amount_u256();
            if self.min_amount.is_some_and(|min| amount < min)
                || self.max_amount.is_some_and(|max| amount > max)
            {
                return false;
            }
        }
        if self.start.is_some_and(|s| e.timestamp < s) || self.end.is_some_and(|end| e.timestamp > end) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_limit_100() {
        assert_eq!(EventFilters::new().validate().unwrap().limit, 100);
    }

    #[test]
    fn normalizes_addresses() {
        let v = EventFilters::new()
            .with_user("0xABCDEFabcdefABCDEFabcdefABCDEFabcdefABCD")
            .validate()
            .unwrap();
        assert_eq!(v.user.as_deref(), Some("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"));
    }

    #[test]
    fn rejects_bad_input() {
        let cases = [
            EventFilters::new().with_user("alice"),
            EventFilters::new().with_asset("0x12"),
            EventFilters::new().with_min_amount("1.5"),
            EventFilters::new().with_max_amount("-1"),
            EventFilters::new().with_min_amount("10").with_max_amount("9"),
            EventFilters::new().with_range(
                Some(DateTime::<Utc>::from_timestamp_millis(2_000).unwrap()),
                Some(DateTime::<Utc>::from_timestamp_millis(1_000).unwrap()),
            ),
        ];
        for f in cases {
            assert!(
                matches!(f.validate(), Err(QueryError::InvalidFilter { .. })),
                "{f:?}"
            );
        }
    }

    #[test]
    fn deserializes_camel_case() {
        let f: EventFilters = serde_json::from_str(
            r#"{"eventType":"FlashLoan","minAmount":"5","limit":3}"#,
        )
        .unwrap();
        assert_eq!(f.event_type, Some(EventKind::FlashLoan));
        assert_eq!(f.min_amount.as_deref(), Some("5"));
        assert_eq!(f.limit, Some(3));
    }
}
