//! Periodic flush and expiry-sweep driver.
//!
//! A single long-lived Tokio task owns all time-based triggers: the
//! auto-flush interval, the slower TTL sweep, and the queue's
//! soft-threshold kick (debounced to at most one extra flush per
//! interval). Manual `flush()` calls bypass the scheduler and go straight
//! to the dispatcher, whose coalescing keeps everything single-file.

use std::sync::Arc;

use beacon_core::PipelineConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::queue::EventQueue;

/// Background loop driving [`Dispatcher::flush_once`] on a timer.
pub struct FlushScheduler {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<EventQueue>,
    config: PipelineConfig,
    kick_rx: mpsc::Receiver<()>,
}

impl FlushScheduler {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        queue: Arc<EventQueue>,
        config: PipelineConfig,
        kick_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher,
            queue,
            config,
            kick_rx,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// The final flush on shutdown belongs to the pipeline facade, not to
    /// this loop; cancellation here just stops the timers.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut flush_tick = tokio::time::interval(self.config.auto_flush_interval);
        let mut sweep_tick = tokio::time::interval(self.config.sweep_interval);
        // Both intervals fire immediately on the first tick; consume those
        // so the first real flush happens one full interval after startup.
        flush_tick.tick().await;
        sweep_tick.tick().await;

        tracing::info!(
            flush_interval_ms = self.config.auto_flush_interval.as_millis() as u64,
            sweep_interval_ms = self.config.sweep_interval.as_millis() as u64,
            "Flush scheduler started",
        );

        let mut kicked_this_interval = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Flush scheduler shutting down");
                    break;
                }
                _ = flush_tick.tick() => {
                    kicked_this_interval = false;
                    let outcome = Arc::clone(&self.dispatcher).flush_once().await;
                    tracing::debug!(?outcome, "Scheduled flush completed");
                }
                _ = sweep_tick.tick() => {
                    self.queue.sweep_expired().await;
                }
                Some(()) = self.kick_rx.recv() => {
                    if kicked_this_interval {
                        tracing::debug!("Soft-threshold kick ignored; already flushed this interval");
                        continue;
                    }
                    kicked_this_interval = true;
                    let outcome = Arc::clone(&self.dispatcher).flush_once().await;
                    tracing::debug!(?outcome, "Soft-threshold flush completed");
                }
            }
        }
    }
}
