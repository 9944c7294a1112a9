//! Aggregate statistics over a window of events.

use alloy_primitives::U256;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use lendwatch_core::EventKind;

use crate::error::QueryError;
use crate::parsed::ParsedEvent;

/// Number of events kept in [`EventStats::recent_events`].
pub const RECENT_EVENTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: BTreeMap<EventKind, usize>,
    /// Lowercase asset address → summed primary amount (decimal base units).
    pub total_volume_wei: BTreeMap<String, String>,
    /// Distinct participants: users, flash-loan initiators and liquidators.
    pub unique_users: usize,
    pub recent_events: Vec<ParsedEvent>,
}

impl EventStats {
    /// Fold `events` (newest first) into statistics.
    ///
    /// Fails with [`QueryError::VolumeOverflow`] rather than reporting a
    /// clamped total.
    pub fn from_events(events: &[ParsedEvent]) -> Result<Self, QueryError> {
        let mut by_type = BTreeMap::new();
        let mut volume: BTreeMap<String, U256> = BTreeMap::new();
        let mut users = BTreeSet::new();

        for e in events {
            *by_type.entry(e.kind()).or_insert(0) += 1;
            users.extend(e.event.participants().into_iter().map(str::to_ascii_lowercase));

            let asset = e.event.primary_asset().to_ascii_lowercase();
            let total = volume.entry(asset.clone()).or_insert(U256::ZERO);
            *total = total
                .checked_add(e.event.primary_amount_u256())
                .ok_or(QueryError::VolumeOverflow { asset })?;
        }

        Ok(Self {
            total_events: events.len(),
            events_by_type: by_type,
            total_volume_wei: volume.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
            unique_users: users.len(),
            recent_events: events.iter().take(RECENT_EVENTS).cloned().collect(),
        })
    }
}
