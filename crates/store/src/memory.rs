//! In-memory store.

use std::collections::HashMap;

use async_trait::async_trait;
use beacon_core::{Event, EventId};
use tokio::sync::RwLock;

use crate::{DurableStore, StoreError};

/// Non-durable store backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for embedders that accept losing queued events on
/// process exit.
#[derive(Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<EventId, Event>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn put(&self, event: &Event) -> Result<(), StoreError> {
        self.events.write().await.insert(event.id, event.clone());
        Ok(())
    }

    async fn delete(&self, id: EventId) -> Result<(), StoreError> {
        self.events.write().await.remove(&id);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self.events.read().await.values().cloned().collect();
        events.sort_by_key(|e| (e.enqueued_at, e.id));
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
