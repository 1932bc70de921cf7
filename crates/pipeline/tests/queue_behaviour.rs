//! Behavioural tests for `EventQueue`: admission, overflow strategies,
//! TTL expiry, FIFO drain, retry backoff, and size accounting.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use beacon_core::{
    Admission, Clock, DropReason, Event, ManualClock, Metadata, OverflowStrategy, PipelineConfig,
};
use beacon_events::{EventBus, PipelineEvent};
use beacon_pipeline::breaker::{BreakerConfig, CircuitBreaker};
use beacon_pipeline::queue::{Disposition, EventQueue};
use beacon_pipeline::Diagnostics;
use beacon_store::MemoryStore;
use tokio::sync::{broadcast, mpsc};

use common::{meta, next_notification};

/// Queue with a manual clock, memory store, and subscribed bus receiver.
struct QueueHarness {
    queue: EventQueue,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
    rx: broadcast::Receiver<PipelineEvent>,
    kick_rx: mpsc::Receiver<()>,
}

fn queue_harness(config: PipelineConfig) -> QueueHarness {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(EventBus::new(256));
    let rx = bus.subscribe();
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
        failure_threshold: config.breaker_failure_threshold,
        cooldown_base: config.breaker_cooldown_base,
        cooldown_cap: config.breaker_cooldown_cap,
    }));
    let diagnostics = Arc::new(Diagnostics::new(breaker));
    let (kick_tx, kick_rx) = mpsc::channel(1);
    let queue = EventQueue::new(
        config,
        store.clone(),
        bus,
        diagnostics,
        clock.clone() as Arc<dyn Clock>,
        kick_tx,
    );
    QueueHarness {
        queue,
        clock,
        store,
        rx,
        kick_rx,
    }
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        max_queue_size: 2,
        max_queue_size_hard: 2,
        event_ttl: Duration::from_secs(60),
        ..common::test_config()
    }
}

fn event(clock: &ManualClock, name: &str) -> Event {
    Event::new(name, Metadata::new(), clock.now())
}

/// Drain with budgets wide enough to take everything eligible.
async fn drain_all(queue: &EventQueue) -> beacon_pipeline::Batch {
    queue.drain(usize::MAX, usize::MAX).await
}

// ---------------------------------------------------------------------------
// Test: admission keeps count and byte accounting coherent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn size_accounting_matches_resident_events() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        ..common::test_config()
    });

    let mut expected_bytes = 0;
    for i in 0..10 {
        let e = Event::new(
            format!("event.{i}"),
            meta(&[("padding", "x".repeat(i).as_str())]),
            h.clock.now(),
        );
        expected_bytes += e.size_bytes;
        assert_matches!(h.queue.enqueue(e).await, Admission::Admitted);
    }

    let stats = h.queue.stats().await;
    assert_eq!(stats.total_events, 10);
    assert_eq!(stats.total_size_bytes, expected_bytes);
}

// ---------------------------------------------------------------------------
// Test: count never exceeds the hard cap under sustained overflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hard_cap_is_never_exceeded() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 3,
        max_queue_size_hard: 5,
        ..common::test_config()
    });

    for i in 0..25 {
        h.queue.enqueue(event(&h.clock, &format!("e{i}"))).await;
        let stats = h.queue.stats().await;
        assert!(stats.total_events <= 5, "resident {} > hard cap", stats.total_events);
    }
}

// ---------------------------------------------------------------------------
// Test: dropOldest keeps the newest events and reports one drop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drop_oldest_evicts_front_and_admits_new() {
    let mut h = queue_harness(small_config());

    for name in ["e1", "e2", "e3"] {
        assert_matches!(
            h.queue.enqueue(event(&h.clock, name)).await,
            Admission::Admitted
        );
    }

    let batch = drain_all(&h.queue).await;
    let names: Vec<&str> = batch.events().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["e2", "e3"]);

    // Skip the two Queued notifications for e1/e2, then expect the drop.
    let mut dropped = None;
    for _ in 0..8 {
        match next_notification(&mut h.rx).await {
            PipelineEvent::Dropped { count, reason } => {
                dropped = Some((count, reason));
                break;
            }
            _ => continue,
        }
    }
    assert_eq!(dropped, Some((1, DropReason::Overflow)));
}

// ---------------------------------------------------------------------------
// Test: dropNewest rejects the incoming event and keeps residents
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drop_newest_rejects_incoming() {
    let h = queue_harness(PipelineConfig {
        overflow_strategy: OverflowStrategy::DropNewest,
        ..small_config()
    });

    h.queue.enqueue(event(&h.clock, "e1")).await;
    h.queue.enqueue(event(&h.clock, "e2")).await;
    assert_matches!(
        h.queue.enqueue(event(&h.clock, "e3")).await,
        Admission::DroppedOverflow
    );

    let batch = drain_all(&h.queue).await;
    let names: Vec<&str> = batch.events().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["e1", "e2"]);
}

// ---------------------------------------------------------------------------
// Test: rejectAll latches until the queue drains below the soft threshold
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reject_all_blocks_admission_until_drained() {
    let h = queue_harness(PipelineConfig {
        overflow_strategy: OverflowStrategy::RejectAll,
        max_queue_size: 2,
        max_queue_size_hard: 3,
        ..common::test_config()
    });

    for name in ["e1", "e2", "e3"] {
        h.queue.enqueue(event(&h.clock, name)).await;
    }
    // Hard limit reached: this trips the latch.
    assert_matches!(
        h.queue.enqueue(event(&h.clock, "e4")).await,
        Admission::DroppedOverflow
    );
    // Still latched even though there is room below the hard cap.
    assert_matches!(
        h.queue.enqueue(event(&h.clock, "e5")).await,
        Admission::DroppedOverflow
    );

    // Draining everything brings the count below the soft threshold.
    let batch = drain_all(&h.queue).await;
    h.queue.apply_disposition(batch, Disposition::Ack).await;

    assert_matches!(
        h.queue.enqueue(event(&h.clock, "e6")).await,
        Admission::Admitted
    );
}

// ---------------------------------------------------------------------------
// Test: events older than the TTL are rejected at admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_event_rejected_at_admission() {
    let mut h = queue_harness(small_config());

    let stale = event(&h.clock, "stale");
    h.clock.advance(chrono::Duration::seconds(61));

    assert_matches!(h.queue.enqueue(stale).await, Admission::DroppedTtl);
    assert_eq!(h.queue.stats().await.total_events, 0);

    let notification = next_notification(&mut h.rx).await;
    assert_matches!(notification, PipelineEvent::Expired { events } if events.len() == 1);
}

// ---------------------------------------------------------------------------
// Test: drain skips and reports events that expired while queued
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drain_reports_expired_events_separately() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 10,
        max_queue_size_hard: 10,
        event_ttl: Duration::from_secs(60),
        ..common::test_config()
    });

    h.queue.enqueue(event(&h.clock, "old")).await;
    h.clock.advance(chrono::Duration::seconds(45));
    h.queue.enqueue(event(&h.clock, "fresh")).await;
    h.clock.advance(chrono::Duration::seconds(30));

    // "old" is now 75s old (expired); "fresh" is 30s old.
    let batch = drain_all(&h.queue).await;
    let names: Vec<&str> = batch.events().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["fresh"]);

    // The expired event is gone from the store as well.
    assert_eq!(h.store.len().await, 1);
}

// ---------------------------------------------------------------------------
// Test: sweep removes expired events independently of dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_expires_and_subsequent_drain_misses_them() {
    let mut h = queue_harness(PipelineConfig {
        max_queue_size: 10,
        max_queue_size_hard: 10,
        event_ttl: Duration::from_secs(60),
        ..common::test_config()
    });

    h.queue.enqueue(event(&h.clock, "doomed")).await;
    h.clock.advance(chrono::Duration::seconds(60));

    assert_eq!(h.queue.sweep_expired().await, 1);
    assert_eq!(h.queue.stats().await.total_events, 0);
    assert!(drain_all(&h.queue).await.is_empty());

    // Queued then Expired.
    assert_matches!(
        next_notification(&mut h.rx).await,
        PipelineEvent::Queued { .. }
    );
    assert_matches!(
        next_notification(&mut h.rx).await,
        PipelineEvent::Expired { events } if events[0].name == "doomed"
    );
}

// ---------------------------------------------------------------------------
// Test: single drain preserves enqueue order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drain_is_strict_fifo() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        ..common::test_config()
    });

    let names: Vec<String> = (0..8).map(|i| format!("e{i}")).collect();
    for name in &names {
        h.queue.enqueue(event(&h.clock, name)).await;
    }

    let batch = drain_all(&h.queue).await;
    let drained: Vec<&str> = batch.events().map(|e| e.name.as_str()).collect();
    assert_eq!(drained, names.iter().map(String::as_str).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Test: drain honours the count budget
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drain_respects_count_budget() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        ..common::test_config()
    });

    for i in 0..5 {
        h.queue.enqueue(event(&h.clock, &format!("e{i}"))).await;
    }

    let batch = h.queue.drain(usize::MAX, 2).await;
    assert_eq!(batch.len(), 2);
    assert_eq!(h.queue.stats().await.total_events, 3);
}

// ---------------------------------------------------------------------------
// Test: drain honours the byte budget but never starves an oversized event
// ---------------------------------------------------------------------------

#[tokio::test]
async fn drain_respects_byte_budget() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        ..common::test_config()
    });

    for i in 0..3 {
        h.queue.enqueue(event(&h.clock, &format!("e{i}"))).await;
    }
    let per_event = h.queue.stats().await.total_size_bytes / 3;

    // Budget for two events: the third stays behind.
    let batch = h.queue.drain(per_event * 2, usize::MAX).await;
    assert_eq!(batch.len(), 2);

    // A budget smaller than a single event still yields one event.
    let batch = h.queue.drain(1, usize::MAX).await;
    assert_eq!(batch.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: requeued events return to the front in their original order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requeue_preserves_order_at_the_front() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        retry_backoff_base: Duration::from_secs(1),
        ..common::test_config()
    });

    for name in ["e1", "e2", "e3"] {
        h.queue.enqueue(event(&h.clock, name)).await;
    }

    let batch = h.queue.drain(usize::MAX, 2).await;
    h.queue.apply_disposition(batch, Disposition::Requeue).await;

    // Past the backoff, the retried events come out first, in order.
    h.clock.advance(chrono::Duration::seconds(2));
    let batch = drain_all(&h.queue).await;
    let names: Vec<&str> = batch.events().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["e1", "e2", "e3"]);
}

// ---------------------------------------------------------------------------
// Test: retried events are invisible to drain until their backoff passes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backoff_hides_events_from_drain() {
    let h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        retry_backoff_base: Duration::from_secs(10),
        ..common::test_config()
    });

    h.queue.enqueue(event(&h.clock, "retry-me")).await;
    let batch = drain_all(&h.queue).await;
    h.queue.apply_disposition(batch, Disposition::Requeue).await;

    // Inside the backoff window nothing is eligible.
    assert!(drain_all(&h.queue).await.is_empty());
    assert_eq!(h.queue.stats().await.total_events, 1);

    h.clock.advance(chrono::Duration::seconds(10));
    let batch = drain_all(&h.queue).await;
    assert_eq!(batch.len(), 1);
}

// ---------------------------------------------------------------------------
// Test: requeue converts to a drop once the retry budget is spent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requeue_drops_after_budget_exhausted() {
    let mut h = queue_harness(PipelineConfig {
        max_queue_size: 50,
        max_queue_size_hard: 100,
        max_retry_attempts: 1,
        retry_backoff_base: Duration::from_millis(10),
        ..common::test_config()
    });

    h.queue.enqueue(event(&h.clock, "doomed")).await;

    // First failure: requeued.
    let batch = drain_all(&h.queue).await;
    let report = h.queue.apply_disposition(batch, Disposition::Requeue).await;
    assert_eq!(report.requeued, 1);

    // Second failure: budget exhausted, converted to a drop.
    h.clock.advance(chrono::Duration::seconds(1));
    let batch = drain_all(&h.queue).await;
    let report = h.queue.apply_disposition(batch, Disposition::Requeue).await;
    assert_eq!(report.requeued, 0);
    assert_eq!(report.dropped, 1);
    assert_eq!(h.queue.stats().await.total_events, 0);

    let mut saw_drop = false;
    for _ in 0..4 {
        if let PipelineEvent::Dropped { count, reason } = next_notification(&mut h.rx).await {
            assert_eq!(count, 1);
            assert_eq!(reason, DropReason::RetriesExhausted);
            saw_drop = true;
            break;
        }
    }
    assert!(saw_drop, "expected a RetriesExhausted drop notification");
}

// ---------------------------------------------------------------------------
// Test: acked events leave the durable store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ack_removes_events_from_store() {
    let h = queue_harness(small_config());

    h.queue.enqueue(event(&h.clock, "e1")).await;
    h.queue.enqueue(event(&h.clock, "e2")).await;
    assert_eq!(h.store.len().await, 2);

    let batch = drain_all(&h.queue).await;
    let report = h.queue.apply_disposition(batch, Disposition::Ack).await;

    assert_eq!(report.acked, 2);
    assert!(h.store.is_empty().await);
}

// ---------------------------------------------------------------------------
// Test: clear drops everything with the manualClear reason
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clear_empties_queue_and_store() {
    let mut h = queue_harness(small_config());

    h.queue.enqueue(event(&h.clock, "e1")).await;
    h.queue.enqueue(event(&h.clock, "e2")).await;

    assert_eq!(h.queue.clear().await, 2);
    assert_eq!(h.queue.stats().await.total_events, 0);
    assert!(h.store.is_empty().await);

    let mut saw_clear = false;
    for _ in 0..4 {
        if let PipelineEvent::Dropped { count, reason } = next_notification(&mut h.rx).await {
            assert_eq!(count, 2);
            assert_eq!(reason, DropReason::ManualClear);
            saw_clear = true;
            break;
        }
    }
    assert!(saw_clear, "expected a ManualClear drop notification");
}

// ---------------------------------------------------------------------------
// Test: crossing the soft threshold kicks the scheduler channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn soft_threshold_signals_flush_kick() {
    let mut h = queue_harness(PipelineConfig {
        max_queue_size: 2,
        max_queue_size_hard: 10,
        ..common::test_config()
    });

    h.queue.enqueue(event(&h.clock, "e1")).await;
    assert!(h.kick_rx.try_recv().is_err());

    h.queue.enqueue(event(&h.clock, "e2")).await;
    assert!(h.kick_rx.try_recv().is_ok());
}

// ---------------------------------------------------------------------------
// Test: restored events skip notifications and drop the already-expired
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restore_discards_expired_and_keeps_the_rest() {
    let mut h = queue_harness(PipelineConfig {
        max_queue_size: 10,
        max_queue_size_hard: 10,
        event_ttl: Duration::from_secs(60),
        ..common::test_config()
    });

    let old = Event::new(
        "old",
        Metadata::new(),
        h.clock.now() - chrono::Duration::seconds(120),
    );
    let fresh = Event::new("fresh", Metadata::new(), h.clock.now());

    let restored = h.queue.restore(vec![old, fresh]).await;
    assert_eq!(restored, 1);
    assert_eq!(h.queue.stats().await.total_events, 1);

    // Only the expiry notification; restore never publishes Queued.
    assert_matches!(
        next_notification(&mut h.rx).await,
        PipelineEvent::Expired { events } if events[0].name == "old"
    );
    assert!(common::no_notification(&mut h.rx).await);
}
