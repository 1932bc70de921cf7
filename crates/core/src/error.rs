//! Error taxonomy for the pipeline surface.
//!
//! Transport and storage failures have their own error types next to the
//! code that produces them; this module only holds the errors a producer
//! can observe synchronously.

/// Invalid configuration detected at construction time. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_queue_size ({soft}) must not exceed max_queue_size_hard ({hard})")]
    QueueThresholds { soft: usize, hard: usize },

    #[error("batch_size must be greater than zero")]
    ZeroBatchSize,

    #[error("max_queue_size_hard must be greater than zero")]
    ZeroQueueCapacity,

    #[error("bus_capacity must be greater than zero")]
    ZeroBusCapacity,

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("breaker_failure_threshold must be greater than zero")]
    ZeroBreakerThreshold,
}

/// Errors surfaced synchronously to pipeline-facing calls.
///
/// Delivery failures are never raised here; they travel through the event
/// bus as dropped/failed/expired notifications.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("telemetry pipeline is disabled")]
    Disabled,

    #[error("telemetry pipeline has been shut down")]
    ShutDown,
}
