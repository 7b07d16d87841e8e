//! Audit pipeline: events, sinks, and the fan-out emitter.

pub mod emitter;
pub mod event;
pub mod killkrill;
pub mod sinks;

pub use emitter::AuditEmitter;
pub use event::{AuditEvent, EventType, Outcome};
pub use killkrill::{KillKrillConfig, KillKrillSink};
pub use sinks::{AuditSink, CallbackSink, FileSink, StdoutSink, SyslogSink};

use thiserror::Error;

/// Failure of a single sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Callback failed: {0}")]
    Callback(String),
}

/// Failure of the emitter as a whole.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit emitter requires at least one sink")]
    NoSinks,

    /// Every sink failed; one entry per sink, in registration order.
    #[error("All {} audit sinks failed", .errors.len())]
    AllSinksFailed { errors: Vec<(String, SinkError)> },
}
