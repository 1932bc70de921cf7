//! Batch dispatch: drain, serialize, compress, send, classify.
//!
//! [`Dispatcher::flush_once`] is the single physical path from the queue to
//! the transport. Concurrent invocations coalesce: one flush proceeds at a
//! time and waiters adopt its outcome instead of running their own. The
//! flush body runs on a detached task, so a caller that stops waiting
//! never leaves a drained batch without its disposition.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use beacon_core::{Clock, DropReason, PipelineConfig, Timestamp, WireEvent};
use beacon_events::{EventBus, PipelineEvent};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::breaker::CircuitBreaker;
use crate::diagnostics::Diagnostics;
use crate::queue::{Batch, Disposition, EventQueue};
use crate::transport::{Transport, TransportError};

/// Implicit byte ceiling per drained batch, independent of `batch_size`.
const MAX_BATCH_BYTES: usize = 512 * 1024;

// ---------------------------------------------------------------------------
// FlushOutcome
// ---------------------------------------------------------------------------

/// What one coalesced flush cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty; nothing sent, nothing reported.
    Noop,
    /// Circuit breaker denied the attempt; the queue was not drained.
    CircuitOpen,
    /// Batch accepted by the collector.
    Sent { count: usize },
    /// Collector answered 4xx; the batch was dropped without retry.
    Rejected { status: u16, dropped: usize },
    /// Retriable failure; events were requeued with backoff, minus any
    /// that exhausted their budget or expired in flight.
    Retrying { requeued: usize, dropped: usize },
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Serialized wire form of one delivery attempt.
#[derive(Serialize)]
struct BatchEnvelope<'a> {
    sent_at: Timestamp,
    events: Vec<WireEvent<'a>>,
}

struct FlushState {
    /// Number of completed flush cycles.
    completed: u64,
    last_outcome: FlushOutcome,
}

/// Drains the queue into batches and drives them through the transport.
pub struct Dispatcher {
    config: PipelineConfig,
    queue: Arc<EventQueue>,
    breaker: Arc<CircuitBreaker>,
    bus: Arc<EventBus>,
    diagnostics: Arc<Diagnostics>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    flush_gate: Mutex<FlushState>,
    /// Lock-free mirror of `FlushState::completed` for the coalescing
    /// pre-read.
    completed: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        config: PipelineConfig,
        queue: Arc<EventQueue>,
        breaker: Arc<CircuitBreaker>,
        bus: Arc<EventBus>,
        diagnostics: Arc<Diagnostics>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            queue,
            breaker,
            bus,
            diagnostics,
            transport,
            clock,
            flush_gate: Mutex::new(FlushState {
                completed: 0,
                last_outcome: FlushOutcome::Noop,
            }),
            completed: AtomicU64::new(0),
        }
    }

    /// Run (or join) one flush cycle.
    ///
    /// Safe to invoke concurrently with itself: invocations that arrive
    /// while a flush is running wait for it and return its outcome. The
    /// cycle itself executes on a spawned task, so cancelling this future
    /// does not abandon an in-flight batch.
    pub async fn flush_once(self: Arc<Self>) -> FlushOutcome {
        let observed = self.completed.load(Ordering::Acquire);
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move { this.coalesced_flush(observed).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Flush task failed");
                FlushOutcome::Noop
            }
        }
    }

    async fn coalesced_flush(&self, observed: u64) -> FlushOutcome {
        let mut gate = self.flush_gate.lock().await;
        if gate.completed != observed {
            // A flush completed while we waited for the gate; adopt it.
            return gate.last_outcome;
        }
        let outcome = self.run_flush().await;
        gate.completed += 1;
        self.completed.store(gate.completed, Ordering::Release);
        gate.last_outcome = outcome;
        outcome
    }

    async fn run_flush(&self) -> FlushOutcome {
        if !self.breaker.call_permitted(self.clock.now()) {
            tracing::debug!("Flush skipped: circuit open");
            return FlushOutcome::CircuitOpen;
        }

        let batch = self
            .queue
            .drain(MAX_BATCH_BYTES, self.config.batch_size)
            .await;
        if batch.is_empty() {
            return FlushOutcome::Noop;
        }

        let started = Instant::now();
        let envelope = BatchEnvelope {
            sent_at: self.clock.now(),
            events: batch.events().map(|e| e.wire()).collect(),
        };
        let body =
            serde_json::to_vec(&envelope).expect("batch envelope is always serialisable");
        drop(envelope);
        let serialized_len = body.len();
        let (body, compressed) = self.maybe_compress(body);
        let sent_len = body.len();

        let result = match tokio::time::timeout(
            self.config.request_timeout,
            self.transport.send(body, compressed),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };

        let outcome = match result {
            Ok(status) if (200..300).contains(&status) => self.handle_success(batch).await,
            Ok(status) if (400..500).contains(&status) => {
                self.handle_rejected(batch, status).await
            }
            Ok(status) => self.handle_retriable(batch, format!("HTTP {status}")).await,
            Err(e) => self.handle_retriable(batch, e.to_string()).await,
        };

        self.diagnostics
            .record_flush(started.elapsed(), serialized_len, sent_len)
            .await;
        outcome
    }

    async fn handle_success(&self, batch: Batch) -> FlushOutcome {
        let events = batch.to_events();
        let count = events.len();
        self.queue.apply_disposition(batch, Disposition::Ack).await;
        self.breaker.record_success();
        self.diagnostics.record_sent(count);
        self.bus.publish(PipelineEvent::Sent { events });
        tracing::debug!(count, "Batch delivered");
        FlushOutcome::Sent { count }
    }

    async fn handle_rejected(&self, batch: Batch, status: u16) -> FlushOutcome {
        self.breaker.record_failure(self.clock.now());
        self.queue.record_failed_batch().await;
        let dropped = batch.len();
        tracing::warn!(status, dropped, "Collector rejected batch; dropping without retry");
        self.queue
            .apply_disposition(batch, Disposition::Drop(DropReason::RejectedByServer))
            .await;
        FlushOutcome::Rejected { status, dropped }
    }

    async fn handle_retriable(&self, batch: Batch, error: String) -> FlushOutcome {
        self.breaker.record_failure(self.clock.now());
        self.queue.record_failed_batch().await;
        let events = batch.to_events();
        self.diagnostics.record_failed(events.len());
        tracing::warn!(
            count = events.len(),
            error = %error,
            "Batch delivery failed; events scheduled for retry",
        );
        self.bus.publish(PipelineEvent::Failed { events, error });
        let report = self
            .queue
            .apply_disposition(batch, Disposition::Requeue)
            .await;
        FlushOutcome::Retrying {
            requeued: report.requeued,
            dropped: report.dropped,
        }
    }

    fn maybe_compress(&self, body: Vec<u8>) -> (Vec<u8>, bool) {
        if !self.config.compression_enabled || body.len() < self.config.compression_threshold {
            return (body, false);
        }

        let mut encoder = GzEncoder::new(
            Vec::with_capacity(body.len() / 2),
            Compression::default(),
        );
        if let Err(e) = encoder.write_all(&body) {
            tracing::warn!(error = %e, "Compression failed; sending uncompressed");
            return (body, false);
        }
        match encoder.finish() {
            Ok(compressed) => {
                tracing::trace!(
                    raw_bytes = body.len(),
                    compressed_bytes = compressed.len(),
                    "Compressed batch body",
                );
                (compressed, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Compression failed; sending uncompressed");
                (body, false)
            }
        }
    }
}
