//! Pipeline diagnostics: monotonic counters and rolling flush timings.
//!
//! Components record into the aggregator directly; reads are snapshots and
//! never mutate pipeline state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::breaker::{BreakerState, CircuitBreaker};

/// How many recent flush durations the rolling window keeps.
const FLUSH_WINDOW: usize = 32;

/// Failure-to-total ratio above which the pipeline reports unhealthy.
const UNHEALTHY_FAILURE_RATIO: f64 = 0.5;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of the aggregated diagnostics.
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    pub events_sent: u64,
    pub events_failed: u64,
    pub events_dropped: u64,
    pub events_expired: u64,

    /// Serialized batch bytes before compression.
    pub bytes_serialized: u64,
    /// Bytes handed to the transport (post-compression when enabled).
    pub bytes_sent: u64,

    pub flush_count: u64,
    pub average_flush_duration: Duration,
    pub recent_flush_durations: Vec<Duration>,

    pub breaker: BreakerState,
    pub healthy: bool,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// Accumulates counters and timings from the queue and dispatcher.
pub struct Diagnostics {
    events_sent: AtomicU64,
    events_failed: AtomicU64,
    events_dropped: AtomicU64,
    events_expired: AtomicU64,
    bytes_serialized: AtomicU64,
    bytes_sent: AtomicU64,
    flush_count: AtomicU64,
    flush_durations: Mutex<VecDeque<Duration>>,
    breaker: Arc<CircuitBreaker>,
}

impl Diagnostics {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            events_sent: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_expired: AtomicU64::new(0),
            bytes_serialized: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
            flush_durations: Mutex::new(VecDeque::with_capacity(FLUSH_WINDOW)),
            breaker,
        }
    }

    pub fn record_sent(&self, count: usize) {
        self.events_sent.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, count: usize) {
        self.events_failed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: usize) {
        self.events_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: usize) {
        self.events_expired.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record one completed flush: its duration and both payload sizes.
    pub async fn record_flush(&self, duration: Duration, serialized: usize, sent: usize) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_serialized
            .fetch_add(serialized as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);

        let mut durations = self.flush_durations.lock().await;
        if durations.len() == FLUSH_WINDOW {
            durations.pop_front();
        }
        durations.push_back(duration);
    }

    /// Health signal: breaker not open and failure rate within bounds.
    pub fn healthy(&self) -> bool {
        if matches!(self.breaker.current_state(), BreakerState::Open { .. }) {
            return false;
        }
        let sent = self.events_sent.load(Ordering::Relaxed);
        let failed = self.events_failed.load(Ordering::Relaxed);
        let total = sent + failed;
        if total == 0 {
            return true;
        }
        (failed as f64 / total as f64) < UNHEALTHY_FAILURE_RATIO
    }

    /// Read-only snapshot of every counter plus the breaker state.
    pub async fn snapshot(&self) -> DiagnosticsSnapshot {
        let durations = self.flush_durations.lock().await;
        let recent: Vec<Duration> = durations.iter().copied().collect();
        drop(durations);

        let average = if recent.is_empty() {
            Duration::ZERO
        } else {
            recent.iter().sum::<Duration>() / recent.len() as u32
        };

        DiagnosticsSnapshot {
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_expired: self.events_expired.load(Ordering::Relaxed),
            bytes_serialized: self.bytes_serialized.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            average_flush_duration: average,
            recent_flush_durations: recent,
            breaker: self.breaker.current_state(),
            healthy: self.healthy(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
