//! Pipeline configuration and validation.
//!
//! All tunables live on [`PipelineConfig`]. Construction-time validation is
//! the only place configuration errors can surface; once a pipeline holds a
//! config it never re-checks it.

use std::time::Duration;

use crate::error::ConfigError;

/// Policy applied when the hard queue limit is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowStrategy {
    /// Evict the oldest resident event and admit the new one.
    #[default]
    DropOldest,
    /// Reject the incoming event; residents are untouched.
    DropNewest,
    /// Reject the incoming event and block all admission until the queue
    /// drains below the soft threshold.
    RejectAll,
}

/// Tunables for the queue, dispatcher, scheduler, and circuit breaker.
///
/// [`PipelineConfig::default`] is suitable for production use; tests
/// typically shrink the limits and intervals.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum events per dispatch batch.
    pub batch_size: usize,
    /// Interval between scheduled automatic flushes.
    pub auto_flush_interval: Duration,
    /// Soft queue threshold; crossing it requests an out-of-band flush.
    pub max_queue_size: usize,
    /// Hard admission ceiling; reaching it applies the overflow strategy.
    pub max_queue_size_hard: usize,
    /// Maximum age of an unsent event before it is discarded as expired.
    pub event_ttl: Duration,
    /// Per-event retry budget before the event is dropped.
    pub max_retry_attempts: u32,
    /// Wall-clock limit per transport send attempt.
    pub request_timeout: Duration,
    /// Whether batch bodies may be gzip-compressed.
    pub compression_enabled: bool,
    /// Minimum serialized size before compression kicks in.
    pub compression_threshold: usize,
    /// What to do when the hard limit is reached.
    pub overflow_strategy: OverflowStrategy,

    /// Capacity of the notification broadcast channel.
    pub bus_capacity: usize,
    /// Cadence of the TTL expiry sweep, independent of auto-flush.
    pub sweep_interval: Duration,
    /// First retry backoff step; doubles per attempt.
    pub retry_backoff_base: Duration,
    /// Ceiling on the per-event retry backoff.
    pub retry_backoff_cap: Duration,
    /// Consecutive failures before the circuit breaker opens.
    pub breaker_failure_threshold: u32,
    /// First open-state cooldown; doubles per consecutive trip.
    pub breaker_cooldown_base: Duration,
    /// Ceiling on the open-state cooldown.
    pub breaker_cooldown_cap: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            auto_flush_interval: Duration::from_secs(30),
            max_queue_size: 500,
            max_queue_size_hard: 1000,
            event_ttl: Duration::from_secs(24 * 3600),
            max_retry_attempts: 3,
            request_timeout: Duration::from_secs(10),
            compression_enabled: true,
            compression_threshold: 1024,
            overflow_strategy: OverflowStrategy::default(),
            bus_capacity: 1024,
            sweep_interval: Duration::from_secs(60),
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_cap: Duration::from_secs(60),
            breaker_failure_threshold: 5,
            breaker_cooldown_base: Duration::from_secs(15),
            breaker_cooldown_cap: Duration::from_secs(300),
        }
    }
}

impl PipelineConfig {
    /// Check invariants between thresholds.
    ///
    /// Called once by the pipeline constructor; an `Err` here is fatal to
    /// initialization.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_queue_size_hard == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_queue_size > self.max_queue_size_hard {
            return Err(ConfigError::QueueThresholds {
                soft: self.max_queue_size,
                hard: self.max_queue_size_hard,
            });
        }
        if self.bus_capacity == 0 {
            return Err(ConfigError::ZeroBusCapacity);
        }
        if self.auto_flush_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("auto_flush_interval"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("sweep_interval"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroInterval("request_timeout"));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(ConfigError::ZeroBreakerThreshold);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
