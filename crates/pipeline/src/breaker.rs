//! Delivery-health circuit breaker.
//!
//! Tracks consecutive batch failures and short-circuits dispatch while the
//! collector is unhealthy, with a cooldown that doubles on repeated trips.
//! The breaker itself never touches the network; the dispatcher consults
//! [`CircuitBreaker::call_permitted`] before draining the queue.

use std::sync::Mutex;
use std::time::Duration;

use beacon_core::Timestamp;

use crate::backoff;

/// Current position in the breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Attempts permitted; failures are being counted.
    Closed,
    /// All attempts short-circuited until `until`.
    Open { until: Timestamp },
    /// One trial batch permitted; its result decides the next state.
    HalfOpen,
}

/// Tunables lifted from `PipelineConfig` at construction.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// First cooldown; doubles per consecutive trip.
    pub cooldown_base: Duration,
    /// Ceiling on the cooldown.
    pub cooldown_cap: Duration,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    /// Trips since the last success, drives the growing cooldown.
    trips: u32,
}

/// Health-gating state machine for the dispatch path.
///
/// All methods take `now` from the caller so tests can drive transitions
/// with a manual clock. The "exactly one trial batch" property of
/// `HalfOpen` holds because the dispatcher serializes flushes; the breaker
/// itself only decides permission.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                trips: 0,
            }),
        }
    }

    /// Whether a dispatch attempt may proceed at `now`.
    ///
    /// Lapses `Open` into `HalfOpen` once the cooldown has elapsed.
    pub fn call_permitted(&self, now: Timestamp) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open { until } => {
                if now >= until {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!("Circuit breaker half-open, permitting trial batch");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful batch: close and reset all counters.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker closed after successful delivery");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.trips = 0;
    }

    /// Record a failed batch, opening the breaker when the threshold is
    /// reached (or immediately when a half-open trial fails).
    pub fn record_failure(&self, now: Timestamp) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let should_trip = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => {
                inner.consecutive_failures >= self.config.failure_threshold
            }
            // Already open; nothing further to do.
            BreakerState::Open { .. } => false,
        };

        if should_trip {
            inner.trips = inner.trips.saturating_add(1);
            let cooldown = backoff::delay_for_attempt(
                self.config.cooldown_base,
                inner.trips - 1,
                self.config.cooldown_cap,
            );
            let until = backoff::eligible_at(now, cooldown);
            inner.state = BreakerState::Open { until };
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                trips = inner.trips,
                cooldown_secs = cooldown.as_secs(),
                "Circuit breaker opened",
            );
        }
    }

    /// Snapshot of the current state for diagnostics.
    pub fn current_state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Breaker mutations never panic, so the mutex cannot be poisoned.
        self.inner.lock().expect("breaker mutex poisoned")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
