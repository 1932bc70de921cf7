//! Pipeline facade.
//!
//! [`TelemetryPipeline`] is the one object embedders construct and own.
//! There is no process-wide shared instance: whoever calls
//! [`TelemetryPipeline::start`] owns the pipeline and is responsible for
//! calling [`TelemetryPipeline::shutdown`] before exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use beacon_core::{
    Admission, Clock, Event, Metadata, PipelineConfig, PipelineError, Sanitizer,
};
use beacon_events::{EventBus, PipelineEvent};
use beacon_store::DurableStore;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::dispatcher::{Dispatcher, FlushOutcome};
use crate::queue::{EventQueue, QueueStats};
use crate::scheduler::FlushScheduler;
use crate::transport::Transport;

/// Client-side telemetry pipeline: sanitize, queue durably, ship in
/// batches with retry, backoff, and circuit breaking.
pub struct TelemetryPipeline {
    queue: Arc<EventQueue>,
    dispatcher: Arc<Dispatcher>,
    breaker: Arc<CircuitBreaker>,
    diagnostics: Arc<Diagnostics>,
    bus: Arc<EventBus>,
    sanitizer: Arc<dyn Sanitizer>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    enabled: AtomicBool,
    shut_down: AtomicBool,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TelemetryPipeline {
    /// Validate the configuration, rehydrate the queue from the durable
    /// store, and spawn the flush scheduler.
    ///
    /// A [`beacon_core::ConfigError`] here is fatal; nothing is spawned.
    pub async fn start(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn DurableStore>,
        sanitizer: Arc<dyn Sanitizer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let bus = Arc::new(EventBus::new(config.bus_capacity));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            cooldown_base: config.breaker_cooldown_base,
            cooldown_cap: config.breaker_cooldown_cap,
        }));
        let diagnostics = Arc::new(Diagnostics::new(Arc::clone(&breaker)));
        let (kick_tx, kick_rx) = mpsc::channel(1);

        let queue = Arc::new(EventQueue::new(
            config.clone(),
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&diagnostics),
            Arc::clone(&clock),
            kick_tx,
        ));

        match store.load_all().await {
            Ok(persisted) if !persisted.is_empty() => {
                let loaded = persisted.len();
                let restored = queue.restore(persisted).await;
                tracing::info!(loaded, restored, "Rehydrated queue from durable store");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted events; starting empty");
            }
        }

        let dispatcher = Arc::new(Dispatcher::new(
            config.clone(),
            Arc::clone(&queue),
            Arc::clone(&breaker),
            Arc::clone(&bus),
            Arc::clone(&diagnostics),
            transport,
            Arc::clone(&clock),
        ));

        let cancel = CancellationToken::new();
        let scheduler = FlushScheduler::new(
            Arc::clone(&dispatcher),
            Arc::clone(&queue),
            config.clone(),
            kick_rx,
        );
        let handle = tokio::spawn(scheduler.run(cancel.clone()));

        tracing::info!(
            batch_size = config.batch_size,
            max_queue_size_hard = config.max_queue_size_hard,
            "Telemetry pipeline started",
        );

        Ok(Self {
            queue,
            dispatcher,
            breaker,
            diagnostics,
            bus,
            sanitizer,
            clock,
            cancel,
            enabled: AtomicBool::new(true),
            shut_down: AtomicBool::new(false),
            scheduler_handle: Mutex::new(Some(handle)),
        })
    }

    /// Record one named event.
    ///
    /// Sanitizes the metadata, stamps the event, and offers it to the
    /// queue. Never blocks on network I/O; delivery is asynchronous and
    /// its outcome is observable on the event bus, not here.
    pub async fn track(
        &self,
        name: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Admission, PipelineError> {
        self.guard()?;
        let metadata = self.sanitizer.sanitize(metadata);
        let event = Event::new(name, metadata, self.clock.now());
        Ok(self.queue.enqueue(event).await)
    }

    /// Await one full flush cycle (coalesced with any concurrent one).
    pub async fn flush(&self) -> Result<FlushOutcome, PipelineError> {
        self.guard()?;
        Ok(Arc::clone(&self.dispatcher).flush_once().await)
    }

    /// Drop every queued event, reporting each batch as `ManualClear`.
    pub async fn clear(&self) -> Result<usize, PipelineError> {
        self.guard()?;
        Ok(self.queue.clear().await)
    }

    /// Enable or disable tracking. While disabled, pipeline-facing calls
    /// return [`PipelineError::Disabled`] synchronously.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        tracing::info!(enabled, "Telemetry pipeline toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Queue snapshot: resident events, resident bytes, failed batches.
    pub async fn stats(&self) -> QueueStats {
        self.queue.stats().await
    }

    /// Counters, rolling flush timings, breaker state, health flag.
    pub async fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot().await
    }

    /// Health signal derived from the breaker state and failure rate.
    pub fn healthy(&self) -> bool {
        self.diagnostics.healthy()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.current_state()
    }

    /// Subscribe to pipeline lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.bus.subscribe()
    }

    /// Stop the scheduler, run one final flush, and mark the pipeline
    /// shut down. Idempotent.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Flush scheduler task failed");
            }
        }
        let outcome = Arc::clone(&self.dispatcher).flush_once().await;
        tracing::info!(?outcome, "Telemetry pipeline shut down");
    }

    fn guard(&self) -> Result<(), PipelineError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PipelineError::ShutDown);
        }
        if !self.enabled.load(Ordering::Acquire) {
            return Err(PipelineError::Disabled);
        }
        Ok(())
    }
}
