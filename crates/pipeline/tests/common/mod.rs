//! Shared fixtures: a scriptable counting transport, a manual clock, and
//! a pipeline harness with test-friendly limits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_core::{Metadata, NoopSanitizer, PipelineConfig};
use beacon_core::{Clock, ManualClock};
use beacon_events::PipelineEvent;
use beacon_pipeline::{TelemetryPipeline, Transport, TransportError};
use beacon_store::MemoryStore;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

/// What the fake transport should answer for one call.
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(u16),
    ConnectionError,
    TimeoutError,
}

/// One captured send.
pub struct SentBody {
    pub bytes: Vec<u8>,
    pub gzip: bool,
}

/// Transport double that counts calls, captures bodies, and replays a
/// script of replies (falling back to a default once exhausted).
pub struct FakeTransport {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    delay: Duration,
    pub sent: Mutex<Vec<SentBody>>,
}

impl FakeTransport {
    /// Every call succeeds with 200.
    pub fn ok() -> Arc<Self> {
        Self::scripted(Vec::new(), Reply::Status(200))
    }

    /// Every call gets the same reply.
    pub fn replying(fallback: Reply) -> Arc<Self> {
        Self::scripted(Vec::new(), fallback)
    }

    /// Replay `script` in order, then answer `fallback` forever.
    pub fn scripted(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Like [`FakeTransport::replying`], but each call stalls for `delay`
    /// before answering.
    pub fn slow(fallback: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, body: Vec<u8>, gzip: bool) -> Result<u16, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentBody { bytes: body, gzip });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        match reply {
            Reply::Status(status) => Ok(status),
            Reply::ConnectionError => Err(TransportError::Connection("connection refused".into())),
            Reply::TimeoutError => Err(TransportError::Timeout),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Config with small limits and timers parked far in the future, so tests
/// drive every flush and sweep by hand.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        batch_size: 10,
        auto_flush_interval: Duration::from_secs(3600),
        max_queue_size: 100,
        max_queue_size_hard: 200,
        event_ttl: Duration::from_secs(3600),
        max_retry_attempts: 3,
        request_timeout: Duration::from_secs(5),
        compression_enabled: false,
        compression_threshold: 1024,
        sweep_interval: Duration::from_secs(3600),
        retry_backoff_base: Duration::from_secs(1),
        retry_backoff_cap: Duration::from_secs(60),
        breaker_failure_threshold: 5,
        breaker_cooldown_base: Duration::from_secs(15),
        breaker_cooldown_cap: Duration::from_secs(300),
        ..Default::default()
    }
}

/// A started pipeline plus handles to its doubles.
pub struct Harness {
    pub pipeline: TelemetryPipeline,
    pub transport: Arc<FakeTransport>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub async fn harness(config: PipelineConfig, transport: Arc<FakeTransport>) -> Harness {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let store = Arc::new(MemoryStore::new());
    let pipeline = TelemetryPipeline::start(
        config,
        transport.clone() as Arc<dyn Transport>,
        store.clone(),
        Arc::new(NoopSanitizer),
        clock.clone() as Arc<dyn Clock>,
    )
    .await
    .expect("pipeline should start");
    Harness {
        pipeline,
        transport,
        clock,
        store,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Receive the next bus notification, failing the test after one second.
pub async fn next_notification(rx: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("event bus closed")
}

/// True if no notification arrives within a short grace period.
pub async fn no_notification(rx: &mut broadcast::Receiver<PipelineEvent>) -> bool {
    tokio::time::timeout(Duration::from_millis(50), rx.recv())
        .await
        .is_err()
}
