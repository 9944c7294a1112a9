//! Error types shared across the pipeline.

use thiserror::Error;

/// A chain log that could not be turned into a [`DomainEvent`](crate::DomainEvent).
///
/// Local-recoverable: the listener logs and drops the offending log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEventError {
    #[error("Unknown event '{name}'")]
    UnknownEvent { name: String },

    #[error("{event}: missing argument '{field}'")]
    MissingField { event: String, field: String },

    #[error("{event}: argument '{field}' has wrong type, expected {expected}")]
    WrongType {
        event: String,
        field: String,
        expected: &'static str,
    },

    #[error("{event}: argument '{field}' is not an unsigned integer: {value}")]
    InvalidInteger {
        event: String,
        field: String,
        value: String,
    },

    #[error("{event}: argument '{field}' exceeds uint{bits}: {value}")]
    OutOfRange {
        event: String,
        field: String,
        bits: u32,
        value: String,
    },

    #[error("{event}: argument '{field}' is not a 20-byte address: {value}")]
    InvalidAddress {
        event: String,
        field: String,
        value: String,
    },

    #[error("Invalid transaction hash: {value}")]
    InvalidTxHash { value: String },
}

/// Errors from the remote entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable (connection refused, DNS, HTTP 5xx).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The store understood the request and refused it.
    #[error("Store rejected request: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    /// Returns `true` if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Timeout { .. } | Self::Other(_)
        )
    }
}

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Timeout { ms: 30_000 }.is_transient());
        assert!(!StoreError::Rejected("bad payload".into()).is_transient());
    }

    #[test]
    fn malformed_event_messages() {
        let e = MalformedEventError::MissingField {
            event: "Withdraw".into(),
            field: "amount".into(),
        };
        assert_eq!(e.to_string(), "Withdraw: missing argument 'amount'");
    }
}
