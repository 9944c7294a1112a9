use thiserror::Error;

use lendwatch_core::StoreError;

/// Errors returned by the query engine. No operation returns partial results.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Store query failed: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid filter '{field}': {reason}")]
    InvalidFilter { field: &'static str, reason: String },

    /// A stored entity could not be decoded back into an event.
    #[error("Malformed entity {key}: {reason}")]
    MalformedEntity { key: String, reason: String },

    /// Summed volume of `asset` does not fit in 256 bits.
    #[error("Volume of {asset} overflows 256 bits")]
    VolumeOverflow { asset: String },
}

impl QueryError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            field,
            reason: reason.into(),
        }
    }
}
