//! Durable persistence for queued events.
//!
//! The queue writes through a [`DurableStore`] so a process restart can
//! rebuild an equivalent in-memory queue:
//!
//! - [`MemoryStore`] — `RwLock<HashMap>` implementation for tests and for
//!   hosts that opt out of persistence.
//! - [`FileStore`] — spool directory with one JSON file per event.
//!
//! Store failures are reported to the caller but are not fatal to the
//! pipeline; the queue logs them and keeps its in-memory state coherent.

use async_trait::async_trait;
use beacon_core::{Event, EventId};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors produced by a durable store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value persistence for queued events.
///
/// `put` and `delete` are invoked inside the queue's critical section so
/// that the persisted set tracks the resident set; `load_all` is called
/// once at startup to rehydrate.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Persist one event, overwriting any previous entry with the same id.
    async fn put(&self, event: &Event) -> Result<(), StoreError>;

    /// Remove one event. Unknown ids are a no-op.
    async fn delete(&self, id: EventId) -> Result<(), StoreError>;

    /// Load every persisted event, oldest `enqueued_at` first.
    async fn load_all(&self) -> Result<Vec<Event>, StoreError>;
}
