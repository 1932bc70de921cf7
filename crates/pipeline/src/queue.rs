//! Bounded, ordered event queue with overflow policy, TTL expiry, and
//! write-through persistence.
//!
//! The queue exclusively owns resident events. The dispatcher borrows a
//! [`Batch`] for the duration of one send attempt and must hand back a
//! [`Disposition`] that the queue applies atomically; events in an
//! outstanding batch are not resident, so no event can appear in two
//! batches. Store writes happen inside the queue's critical section so the
//! persisted set tracks the resident set; store failures are logged and do
//! not disturb in-memory state.

use std::collections::VecDeque;
use std::sync::Arc;

use beacon_core::{
    Admission, Clock, DropReason, Event, EventId, OverflowStrategy, PipelineConfig, Timestamp,
};
use beacon_events::{EventBus, PipelineEvent};
use beacon_store::DurableStore;
use tokio::sync::{mpsc, Mutex};

use crate::backoff;
use crate::diagnostics::Diagnostics;

// ---------------------------------------------------------------------------
// Batch / Disposition
// ---------------------------------------------------------------------------

/// A resident event plus its delivery bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct QueuedEvent {
    pub event: Event,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    /// Earliest instant the next attempt may include this event.
    pub next_eligible_at: Option<Timestamp>,
}

/// Ordered group of events selected for one delivery attempt.
///
/// Must be returned to the queue via [`EventQueue::apply_disposition`].
#[derive(Debug)]
pub struct Batch {
    pub(crate) events: Vec<QueuedEvent>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn total_size_bytes(&self) -> usize {
        self.events.iter().map(|q| q.event.size_bytes).sum()
    }

    /// Events in delivery order.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|q| &q.event)
    }

    /// Owned copies for bus notifications.
    pub fn to_events(&self) -> Vec<Event> {
        self.events.iter().map(|q| q.event.clone()).collect()
    }
}

/// Queue-side effect of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delivered; remove from queue and store.
    Ack,
    /// Retriable failure; return to the front with backoff, dropping
    /// events that exhausted their budget or expired in flight.
    Requeue,
    /// Terminal failure; remove and report with the given reason.
    Drop(DropReason),
}

/// Counts of what a disposition actually did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispositionReport {
    pub acked: usize,
    pub requeued: usize,
    pub dropped: usize,
    pub expired: usize,
}

/// Read-only queue snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub total_events: usize,
    pub total_size_bytes: usize,
    pub failed_batch_count: u64,
}

// ---------------------------------------------------------------------------
// EventQueue
// ---------------------------------------------------------------------------

struct QueueInner {
    events: VecDeque<QueuedEvent>,
    total_size_bytes: usize,
    failed_batch_count: u64,
    /// `RejectAll` latch: set at the hard limit, cleared below the soft
    /// threshold.
    admission_blocked: bool,
}

/// Bounded FIFO of pending events.
///
/// Safe under arbitrary concurrent producers; `drain` mutual exclusion is
/// provided by the dispatcher's flush coalescing.
pub struct EventQueue {
    config: PipelineConfig,
    ttl: chrono::Duration,
    store: Arc<dyn DurableStore>,
    bus: Arc<EventBus>,
    diagnostics: Arc<Diagnostics>,
    clock: Arc<dyn Clock>,
    flush_kick: mpsc::Sender<()>,
    inner: Mutex<QueueInner>,
}

impl EventQueue {
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn DurableStore>,
        bus: Arc<EventBus>,
        diagnostics: Arc<Diagnostics>,
        clock: Arc<dyn Clock>,
        flush_kick: mpsc::Sender<()>,
    ) -> Self {
        let ttl = chrono::Duration::from_std(config.event_ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            config,
            ttl,
            store,
            bus,
            diagnostics,
            clock,
            flush_kick,
            inner: Mutex::new(QueueInner {
                events: VecDeque::new(),
                total_size_bytes: 0,
                failed_batch_count: 0,
                admission_blocked: false,
            }),
        }
    }

    /// Offer one event to the queue.
    ///
    /// Applies the overflow strategy at the hard limit and requests an
    /// out-of-band flush when the soft threshold is reached. Never blocks
    /// on network I/O.
    pub async fn enqueue(&self, event: Event) -> Admission {
        let now = self.clock.now();
        if self.is_expired_at(&event, now) {
            tracing::debug!(name = %event.name, "Rejecting event already past TTL");
            self.report_expired(vec![event]);
            return Admission::DroppedTtl;
        }

        let mut inner = self.inner.lock().await;

        if inner.admission_blocked {
            if inner.events.len() < self.config.max_queue_size {
                inner.admission_blocked = false;
                tracing::info!("Queue drained below soft threshold; admission resumed");
            } else {
                drop(inner);
                self.report_dropped(1, DropReason::Overflow);
                return Admission::DroppedOverflow;
            }
        }

        if inner.events.len() == self.config.max_queue_size_hard {
            match self.config.overflow_strategy {
                OverflowStrategy::DropOldest => {
                    if let Some(evicted) = inner.events.pop_front() {
                        inner.total_size_bytes -= evicted.event.size_bytes;
                        self.delete_persisted(evicted.event.id).await;
                        self.report_dropped(1, DropReason::Overflow);
                    }
                }
                OverflowStrategy::DropNewest => {
                    drop(inner);
                    self.report_dropped(1, DropReason::Overflow);
                    return Admission::DroppedOverflow;
                }
                OverflowStrategy::RejectAll => {
                    inner.admission_blocked = true;
                    drop(inner);
                    tracing::warn!("Queue at hard capacity; blocking admission until drained");
                    self.report_dropped(1, DropReason::Overflow);
                    return Admission::DroppedOverflow;
                }
            }
        }

        inner.total_size_bytes += event.size_bytes;
        self.persist(&event).await;
        let queued = event.clone();
        inner.events.push_back(QueuedEvent {
            event,
            attempts: 0,
            next_eligible_at: None,
        });
        let at_soft_threshold = inner.events.len() >= self.config.max_queue_size;
        drop(inner);

        self.bus.publish(PipelineEvent::Queued { event: queued });
        if at_soft_threshold {
            // Capacity-1 channel: at most one pending kick, never blocks.
            let _ = self.flush_kick.try_send(());
        }
        Admission::Admitted
    }

    /// Re-admit events loaded from the durable store at startup.
    ///
    /// Input is expected oldest-first. Already-expired events are discarded
    /// and reported; excess beyond the hard limit evicts oldest-first.
    /// No `Queued` notifications are emitted and nothing is re-persisted.
    pub async fn restore(&self, events: Vec<Event>) -> usize {
        let now = self.clock.now();
        let mut expired = Vec::new();
        let mut overflowed = 0usize;

        let mut inner = self.inner.lock().await;
        for event in events {
            if self.is_expired_at(&event, now) {
                self.delete_persisted(event.id).await;
                expired.push(event);
                continue;
            }
            if inner.events.len() == self.config.max_queue_size_hard {
                if let Some(evicted) = inner.events.pop_front() {
                    inner.total_size_bytes -= evicted.event.size_bytes;
                    self.delete_persisted(evicted.event.id).await;
                    overflowed += 1;
                }
            }
            inner.total_size_bytes += event.size_bytes;
            inner.events.push_back(QueuedEvent {
                event,
                attempts: 0,
                next_eligible_at: None,
            });
        }
        let restored = inner.events.len();
        drop(inner);

        if !expired.is_empty() {
            self.report_expired(expired);
        }
        if overflowed > 0 {
            self.report_dropped(overflowed, DropReason::Overflow);
        }
        restored
    }

    /// Select the oldest eligible events, bounded by bytes and count.
    ///
    /// Strict FIFO: selection stops at the first event that would exceed a
    /// budget (a single oversized event is still selected alone, so it can
    /// never jam the queue). Events still inside their retry backoff are
    /// skipped in place; expired events encountered during the scan are
    /// removed and reported.
    pub async fn drain(&self, max_bytes: usize, max_count: usize) -> Batch {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let mut selected: Vec<QueuedEvent> = Vec::new();
        let mut kept: VecDeque<QueuedEvent> = VecDeque::with_capacity(inner.events.len());
        let mut expired: Vec<Event> = Vec::new();
        let mut selected_bytes = 0usize;

        while let Some(candidate) = inner.events.pop_front() {
            if self.is_expired_at(&candidate.event, now) {
                inner.total_size_bytes -= candidate.event.size_bytes;
                self.delete_persisted(candidate.event.id).await;
                expired.push(candidate.event);
                continue;
            }

            let in_backoff = candidate
                .next_eligible_at
                .is_some_and(|at| now < at);
            if in_backoff {
                kept.push_back(candidate);
                continue;
            }

            if selected.len() >= max_count
                || (!selected.is_empty()
                    && selected_bytes + candidate.event.size_bytes > max_bytes)
            {
                kept.push_back(candidate);
                // Budgets are exhausted; the remainder keeps its order.
                kept.extend(inner.events.drain(..));
                break;
            }

            selected_bytes += candidate.event.size_bytes;
            selected.push(candidate);
        }

        inner.events = kept;
        inner.total_size_bytes -= selected_bytes;
        self.maybe_unblock(&mut inner);
        drop(inner);

        if !expired.is_empty() {
            self.report_expired(expired);
        }
        Batch { events: selected }
    }

    /// Apply the outcome of one delivery attempt.
    ///
    /// The only notifications emitted here are queue-side terminal losses
    /// (drops and in-flight expiry); `Sent`/`Failed` belong to the
    /// dispatcher.
    pub async fn apply_disposition(
        &self,
        batch: Batch,
        disposition: Disposition,
    ) -> DispositionReport {
        let mut report = DispositionReport::default();
        if batch.events.is_empty() {
            return report;
        }

        match disposition {
            Disposition::Ack => {
                for queued in &batch.events {
                    self.delete_persisted(queued.event.id).await;
                }
                report.acked = batch.events.len();
            }

            Disposition::Drop(reason) => {
                for queued in &batch.events {
                    self.delete_persisted(queued.event.id).await;
                }
                report.dropped = batch.events.len();
                self.report_dropped(report.dropped, reason);
            }

            Disposition::Requeue => {
                let now = self.clock.now();
                let mut requeue: Vec<QueuedEvent> = Vec::new();
                let mut exhausted = 0usize;
                let mut expired: Vec<Event> = Vec::new();

                for mut queued in batch.events {
                    queued.attempts = queued.attempts.saturating_add(1);
                    if self.is_expired_at(&queued.event, now) {
                        self.delete_persisted(queued.event.id).await;
                        expired.push(queued.event);
                    } else if queued.attempts > self.config.max_retry_attempts {
                        self.delete_persisted(queued.event.id).await;
                        exhausted += 1;
                    } else {
                        let delay = backoff::delay_for_attempt(
                            self.config.retry_backoff_base,
                            queued.attempts - 1,
                            self.config.retry_backoff_cap,
                        );
                        queued.next_eligible_at = Some(backoff::eligible_at(now, delay));
                        requeue.push(queued);
                    }
                }

                let mut overflowed = 0usize;
                let mut inner = self.inner.lock().await;
                report.requeued = requeue.len();
                for queued in requeue.into_iter().rev() {
                    inner.total_size_bytes += queued.event.size_bytes;
                    inner.events.push_front(queued);
                }
                // Producers may have refilled the queue while the batch was
                // in flight; shed from the newest end back to the hard cap.
                while inner.events.len() > self.config.max_queue_size_hard {
                    if let Some(evicted) = inner.events.pop_back() {
                        inner.total_size_bytes -= evicted.event.size_bytes;
                        self.delete_persisted(evicted.event.id).await;
                        overflowed += 1;
                    }
                }
                drop(inner);

                report.dropped = exhausted + overflowed;
                report.expired = expired.len();
                if exhausted > 0 {
                    self.report_dropped(exhausted, DropReason::RetriesExhausted);
                }
                if overflowed > 0 {
                    self.report_dropped(overflowed, DropReason::Overflow);
                }
                if !expired.is_empty() {
                    self.report_expired(expired);
                }
            }
        }

        report
    }

    /// Remove and report every event past its TTL.
    ///
    /// Runs at its own cadence, independent of dispatch.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        let mut kept: VecDeque<QueuedEvent> = VecDeque::with_capacity(inner.events.len());
        let mut expired: Vec<Event> = Vec::new();
        while let Some(queued) = inner.events.pop_front() {
            if self.is_expired_at(&queued.event, now) {
                inner.total_size_bytes -= queued.event.size_bytes;
                self.delete_persisted(queued.event.id).await;
                expired.push(queued.event);
            } else {
                kept.push_back(queued);
            }
        }
        inner.events = kept;
        self.maybe_unblock(&mut inner);
        drop(inner);

        let count = expired.len();
        if count > 0 {
            tracing::debug!(count, "Swept expired events");
            self.report_expired(expired);
        }
        count
    }

    /// Remove every resident event, reason `ManualClear`.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let removed: Vec<QueuedEvent> = inner.events.drain(..).collect();
        inner.total_size_bytes = 0;
        self.maybe_unblock(&mut inner);
        drop(inner);

        for queued in &removed {
            self.delete_persisted(queued.event.id).await;
        }
        let count = removed.len();
        if count > 0 {
            self.report_dropped(count, DropReason::ManualClear);
        }
        count
    }

    /// Bump the failed-batch counter (any non-success flush outcome).
    pub async fn record_failed_batch(&self) {
        self.inner.lock().await.failed_batch_count += 1;
    }

    /// Snapshot of resident counts. Bounded critical section.
    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            total_events: inner.events.len(),
            total_size_bytes: inner.total_size_bytes,
            failed_batch_count: inner.failed_batch_count,
        }
    }

    fn is_expired_at(&self, event: &Event, now: Timestamp) -> bool {
        match event.enqueued_at.checked_add_signed(self.ttl) {
            Some(deadline) => now >= deadline,
            // TTL so large it overflows the calendar: never expires.
            None => false,
        }
    }

    fn maybe_unblock(&self, inner: &mut QueueInner) {
        if inner.admission_blocked && inner.events.len() < self.config.max_queue_size {
            inner.admission_blocked = false;
            tracing::info!("Queue drained below soft threshold; admission resumed");
        }
    }

    fn report_dropped(&self, count: usize, reason: DropReason) {
        self.diagnostics.record_dropped(count);
        self.bus.publish(PipelineEvent::Dropped { count, reason });
    }

    fn report_expired(&self, events: Vec<Event>) {
        self.diagnostics.record_expired(events.len());
        self.bus.publish(PipelineEvent::Expired { events });
    }

    async fn persist(&self, event: &Event) {
        if let Err(e) = self.store.put(event).await {
            tracing::error!(event_id = %event.id, error = %e, "Failed to persist event");
        }
    }

    async fn delete_persisted(&self, id: EventId) {
        if let Err(e) = self.store.delete(id).await {
            tracing::error!(event_id = %id, error = %e, "Failed to delete persisted event");
        }
    }
}
