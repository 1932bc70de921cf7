//! Beacon pipeline notification stream.
//!
//! - [`EventBus`] — in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`] — the lifecycle notifications observers receive:
//!   queued, sent, failed, dropped, expired.

pub mod bus;

pub use bus::{EventBus, PipelineEvent};
