//! Telemetry event data model.
//!
//! An [`Event`] is immutable once constructed. Its `size_bytes` field is
//! computed once from the wire form (the JSON object shipped inside a
//! batch) and cached, so queue byte accounting never re-serializes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{EventId, Timestamp};

/// String-to-string metadata attached to an event.
///
/// A `BTreeMap` keeps the serialized form stable, which makes the cached
/// size deterministic across runs.
pub type Metadata = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A discrete named telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier (UUIDv7).
    pub id: EventId,

    /// Event name, e.g. `"screen.viewed"`.
    pub name: String,

    /// Sanitized structured metadata.
    pub metadata: Metadata,

    /// When the event was created.
    pub timestamp: Timestamp,

    /// When the event was admitted into the queue. Survives restarts so
    /// TTL expiry keeps counting across process lifetimes.
    pub enqueued_at: Timestamp,

    /// Serialized size of the wire form, computed once at creation.
    pub size_bytes: usize,
}

impl Event {
    /// Build a new event stamped with `now` for both creation and
    /// enqueue time.
    ///
    /// Metadata is expected to be sanitized already; this constructor does
    /// not scrub anything.
    pub fn new(name: impl Into<String>, metadata: Metadata, now: Timestamp) -> Self {
        let mut event = Self {
            id: uuid::Uuid::now_v7(),
            name: name.into(),
            metadata,
            timestamp: now,
            enqueued_at: now,
            size_bytes: 0,
        };
        event.size_bytes = serde_json::to_vec(&event.wire())
            .expect("event wire form is always serialisable")
            .len();
        event
    }

    /// Borrowed view of the fields shipped to the collector.
    pub fn wire(&self) -> WireEvent<'_> {
        WireEvent {
            id: &self.id,
            name: &self.name,
            metadata: &self.metadata,
            timestamp: &self.timestamp,
        }
    }
}

/// The JSON object shipped to the collector for one event.
///
/// `enqueued_at` and `size_bytes` are queue bookkeeping and stay local.
#[derive(Debug, Serialize)]
pub struct WireEvent<'a> {
    pub id: &'a EventId,
    pub name: &'a str,
    pub metadata: &'a Metadata,
    pub timestamp: &'a Timestamp,
}

// ---------------------------------------------------------------------------
// Admission / drop reasons
// ---------------------------------------------------------------------------

/// Result of offering an event to the queue.
///
/// Never surfaced as an error to the producer; a rejected event is also
/// reported on the event bus so observers see every terminal loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The event is resident in the queue.
    Admitted,
    /// The event was already older than the TTL when offered.
    DroppedTtl,
    /// The hard capacity limit rejected the event per the overflow strategy.
    DroppedOverflow,
}

/// Why an event was discarded without being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Evicted or rejected by the hard queue limit.
    Overflow,
    /// Per-event retry budget exhausted after repeated delivery failures.
    RetriesExhausted,
    /// The collector answered 4xx; retrying would not help.
    RejectedByServer,
    /// `clear()` was called.
    ManualClear,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
