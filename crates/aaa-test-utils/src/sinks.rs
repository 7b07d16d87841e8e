//! Audit sinks for emitter tests.

use aaa_core::audit::{AuditSink, SinkError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Keeps every emitted event in memory and counts flush/close calls.
pub struct RecordingSink {
    name: String,
    events: Mutex<Vec<Map<String, Value>>>,
    flushes: AtomicUsize,
    closes: AtomicUsize,
}

impl RecordingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Snapshot of the recorded events, in emission order
    pub fn events(&self) -> Vec<Map<String, Value>> {
        self.events.lock().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every operation and counts emit attempts.
pub struct FailingSink {
    name: String,
    attempts: AtomicUsize,
}

impl FailingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for FailingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn emit(&self, _event: &Map<String, Value>) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Delivery(format!("{} is down", self.name)))
    }

    async fn flush(&self) -> Result<(), SinkError> {
        Err(SinkError::Delivery(format!("{} is down", self.name)))
    }

    async fn close(&self) -> Result<(), SinkError> {
        Err(SinkError::Delivery(format!("{} is down", self.name)))
    }
}
