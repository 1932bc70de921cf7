//! Agent configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use beacon_core::PipelineConfig;

/// Tunables for the agent process.
///
/// All fields have sensible defaults; the collector URL is required and
/// read separately in `main`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Spool directory for undelivered events (default: `./beacon-spool`).
    pub spool_dir: PathBuf,
    /// Seconds between automatic flushes (default: `30`).
    pub flush_interval_secs: u64,
    /// Maximum events per batch (default: `50`).
    pub batch_size: usize,
    /// Seconds per delivery attempt (default: `10`).
    pub request_timeout_secs: u64,
    /// Seconds before an undelivered event expires (default: `86400`).
    pub event_ttl_secs: u64,
}

impl AgentConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default          |
    /// |------------------------|------------------|
    /// | `SPOOL_DIR`            | `./beacon-spool` |
    /// | `FLUSH_INTERVAL_SECS`  | `30`             |
    /// | `BATCH_SIZE`           | `50`             |
    /// | `REQUEST_TIMEOUT_SECS` | `10`             |
    /// | `EVENT_TTL_SECS`       | `86400`          |
    pub fn from_env() -> Self {
        let spool_dir: PathBuf = std::env::var("SPOOL_DIR")
            .unwrap_or_else(|_| "./beacon-spool".into())
            .into();

        let flush_interval_secs: u64 = std::env::var("FLUSH_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("FLUSH_INTERVAL_SECS must be a valid u64");

        let batch_size: usize = std::env::var("BATCH_SIZE")
            .unwrap_or_else(|_| "50".into())
            .parse()
            .expect("BATCH_SIZE must be a valid usize");

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let event_ttl_secs: u64 = std::env::var("EVENT_TTL_SECS")
            .unwrap_or_else(|_| "86400".into())
            .parse()
            .expect("EVENT_TTL_SECS must be a valid u64");

        Self {
            spool_dir,
            flush_interval_secs,
            batch_size,
            request_timeout_secs,
            event_ttl_secs,
        }
    }

    /// Pipeline configuration derived from the agent tunables.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size,
            auto_flush_interval: Duration::from_secs(self.flush_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            event_ttl: Duration::from_secs(self.event_ttl_secs),
            ..PipelineConfig::default()
        }
    }
}
