//! Store handler trait + registry keyed by [`EventKind`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::Receipt;
use crate::error::StoreError;
use crate::event::{DomainEvent, EventKind};

/// Persists one domain event and returns the store receipt.
///
/// Implementations must perform at most one store write per call, and must
/// let store failures propagate unchanged so the queue can retry them.
#[async_trait]
pub trait StoreHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<Receipt, StoreError>;
}

/// Maps each event kind to the handler that stores it.
///
/// Lookup is explicit: [`get`](Self::get) returns `None` for an unregistered
/// kind so the caller can report it as a logic error instead of retrying.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn StoreHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn StoreHandler>) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Register the same handler for every event kind.
    pub fn register_all(&mut self, handler: Arc<dyn StoreHandler>) -> &mut Self {
        for kind in EventKind::ALL {
            self.handlers.insert(kind, Arc::clone(&handler));
        }
        self
    }

    pub fn get(&self, kind: EventKind) -> Option<&Arc<dyn StoreHandler>> {
        self.handlers.get(&kind)
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
