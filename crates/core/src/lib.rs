//! Beacon shared data model and collaborator traits.
//!
//! This crate holds everything the pipeline crates agree on but that has
//! no behaviour of its own:
//!
//! - [`Event`] — the immutable telemetry event and its wire form.
//! - [`PipelineConfig`] — tunables for the queue, dispatcher, and scheduler,
//!   validated at construction.
//! - [`Sanitizer`] — metadata scrubbing, with deny-list and no-op
//!   implementations.
//! - [`Clock`] — injectable time source so expiry and backoff are testable.
//! - Error taxonomy ([`ConfigError`], [`PipelineError`]).

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod sanitize;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OverflowStrategy, PipelineConfig};
pub use error::{ConfigError, PipelineError};
pub use event::{Admission, DropReason, Event, Metadata, WireEvent};
pub use sanitize::{KeyDenySanitizer, NoopSanitizer, Sanitizer};
pub use types::{EventId, Timestamp};
