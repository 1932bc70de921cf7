//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans pipeline lifecycle notifications out to any number of
//! observers. It is designed to be shared via `Arc<EventBus>` across the
//! pipeline components.

use beacon_core::{DropReason, Event};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// A pipeline state transition worth telling observers about.
///
/// Terminal loss (`Dropped`, `Expired`) is emitted exactly once per event;
/// it is the pipeline's substitute for a delivery receipt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// An event was admitted into the queue.
    Queued { event: Event },

    /// A batch was accepted by the collector.
    Sent { events: Vec<Event> },

    /// A delivery attempt failed; the events remain eligible for retry.
    Failed { events: Vec<Event>, error: String },

    /// Events were discarded without delivery.
    Dropped { count: usize, reason: DropReason },

    /// Events aged past the TTL and were discarded.
    Expired { events: Vec<Event> },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// In-process fan-out bus for [`PipelineEvent`]s.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published notification. Publishing never
/// blocks: a slow observer lags (and loses the oldest backlog entries)
/// rather than stalling enqueue or dispatch.
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed notifications are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notification to all current subscribers.
    ///
    /// If there are no active subscribers the notification is silently
    /// dropped.
    pub fn publish(&self, event: PipelineEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all notifications published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
