//! Fan-out of audit events to every registered sink.

use crate::audit::sinks::AuditSink;
use crate::audit::{AuditError, AuditEvent, SinkError};
use crate::observability::metrics::record_audit_delivery;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Dispatches each event to all sinks in registration order.
///
/// A failing sink never stops delivery to the sinks after it. `emit` fails
/// only when every sink failed; partial failures are logged by the emitter
/// and otherwise swallowed.
pub struct AuditEmitter {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditEmitter {
    /// # Errors
    ///
    /// `AuditError::NoSinks` if `sinks` is empty.
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Result<Self, AuditError> {
        if sinks.is_empty() {
            return Err(AuditError::NoSinks);
        }
        Ok(Self { sinks })
    }

    #[must_use]
    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Serialize `event` once and deliver it to every sink.
    ///
    /// # Errors
    ///
    /// `AuditError::AllSinksFailed` carrying each sink's error when no sink
    /// accepted the event.
    pub async fn emit(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.emit_map(&event.to_map()).await
    }

    /// Deliver an already-serialized event.
    ///
    /// # Errors
    ///
    /// `AuditError::AllSinksFailed` when no sink accepted the event.
    pub async fn emit_map(&self, event: &Map<String, Value>) -> Result<(), AuditError> {
        let mut errors: Vec<(String, SinkError)> = Vec::new();

        for sink in &self.sinks {
            match sink.emit(event).await {
                Ok(()) => record_audit_delivery(sink.name(), "success", 1),
                Err(e) => {
                    record_audit_delivery(sink.name(), "error", 1);
                    tracing::warn!(target: "aaa.audit", sink = %sink.name(), error = %e, "Audit sink failed");
                    errors.push((sink.name().to_string(), e));
                }
            }
        }

        if errors.len() == self.sinks.len() {
            tracing::error!(target: "aaa.audit", sinks = errors.len(), "All audit sinks failed");
            return Err(AuditError::AllSinksFailed { errors });
        }
        Ok(())
    }

    /// Flush every sink. Errors are logged and discarded.
    pub async fn flush(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.flush().await {
                tracing::warn!(target: "aaa.audit", sink = %sink.name(), error = %e, "Audit sink flush failed");
            }
        }
    }

    /// Close every sink. Errors are logged and discarded.
    pub async fn close(&self) {
        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                tracing::warn!(target: "aaa.audit", sink = %sink.name(), error = %e, "Audit sink close failed");
            }
        }
    }
}
