//! KillKrill audit sink: batched HTTP delivery with retries.
//!
//! Events are buffered and POSTed as a JSON array to
//! `{endpoint}/api/v1/events`:
//! - eagerly, by the emitting task, once the buffer reaches `batch_size`
//! - by a background task every `flush_interval`
//! - once more on [`close`](KillKrillSink::close)
//!
//! A failed POST is retried `max_retries` times with a delay of
//! `backoff_base * 2^attempt`. After the last attempt the batch is dropped
//! and logged; there is no dead-letter storage.
//!
//! # Graceful Shutdown
//!
//! `close` cancels the background task, waits for it for at most
//! `flush_interval + timeout + 1s`, then performs a final flush. An
//! in-flight delivery is never cancelled.

use crate::audit::sinks::AuditSink;
use crate::audit::SinkError;
use crate::errors::AaaError;
use crate::hardening::validate_https_url;
use crate::observability::metrics::{record_audit_delivery, record_audit_dropped};
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

const EVENTS_PATH: &str = "api/v1/events";
const SINK_NAME: &str = "killkrill";

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bounds accepted by [`KillKrillConfigBuilder::build`].
pub const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const MAX_BACKOFF_BASE: Duration = Duration::from_secs(60);

// =============================================================================
// Configuration
// =============================================================================

/// Validated KillKrill sink configuration.
pub struct KillKrillConfig {
    events_url: Url,
    api_key: SecretString,
    batch_size: usize,
    flush_interval: Duration,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl fmt::Debug for KillKrillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KillKrillConfig")
            .field("events_url", &self.events_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .finish()
    }
}

pub struct KillKrillConfigBuilder {
    endpoint: String,
    api_key: SecretString,
    batch_size: usize,
    flush_interval: Duration,
    timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl KillKrillConfig {
    /// Start a configuration for the KillKrill service at `endpoint`
    /// (base URL; the events path is appended).
    pub fn builder(endpoint: impl Into<String>, api_key: SecretString) -> KillKrillConfigBuilder {
        KillKrillConfigBuilder {
            endpoint: endpoint.into(),
            api_key,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Full URL events are POSTed to.
    #[must_use]
    pub fn events_url(&self) -> &Url {
        &self.events_url
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt + 1`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl KillKrillConfigBuilder {
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// # Errors
    ///
    /// `AaaError::Configuration` for a non-HTTPS endpoint (localhost
    /// excepted), an empty API key, a zero batch size, a zero flush
    /// interval or timeout, or a duration above its `MAX_*` bound.
    pub fn build(self) -> Result<KillKrillConfig, AaaError> {
        let mut endpoint = validate_https_url(&self.endpoint, "killkrill endpoint")?;

        if self.api_key.expose_secret().trim().is_empty() {
            return Err(AaaError::Configuration("killkrill api_key must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(AaaError::Configuration("batch_size must be at least 1".to_string()));
        }
        if self.flush_interval.is_zero() || self.timeout.is_zero() {
            return Err(AaaError::Configuration(
                "flush_interval and timeout must be non-zero".to_string(),
            ));
        }
        if self.flush_interval > MAX_FLUSH_INTERVAL {
            return Err(AaaError::Configuration(format!(
                "flush_interval must be at most {}s",
                MAX_FLUSH_INTERVAL.as_secs()
            )));
        }
        if self.timeout > MAX_TIMEOUT {
            return Err(AaaError::Configuration(format!(
                "timeout must be at most {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }
        if self.backoff_base > MAX_BACKOFF_BASE {
            return Err(AaaError::Configuration(format!(
                "backoff_base must be at most {}s",
                MAX_BACKOFF_BASE.as_secs()
            )));
        }

        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let events_url = endpoint
            .join(EVENTS_PATH)
            .map_err(|e| AaaError::Configuration(format!("killkrill endpoint: {e}")))?;

        Ok(KillKrillConfig {
            events_url,
            api_key: self.api_key,
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            timeout: self.timeout,
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
        })
    }
}

// =============================================================================
// Sink
// =============================================================================

struct Shared {
    config: KillKrillConfig,
    http_client: reqwest::Client,
    buffer: Mutex<Vec<Map<String, Value>>>,
}

impl Shared {
    /// Drain the buffer and deliver it. An empty buffer is a no-op.
    async fn flush_now(&self) -> Result<(), SinkError> {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        if batch.is_empty() {
            return Ok(());
        }
        self.deliver(batch).await
    }

    async fn deliver(&self, batch: Vec<Map<String, Value>>) -> Result<(), SinkError> {
        let count = u64::try_from(batch.len()).unwrap_or(u64::MAX);
        let body = serde_json::to_vec(&batch)?;
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.post(&body).await {
                Ok(()) => {
                    record_audit_delivery(SINK_NAME, "success", count);
                    tracing::debug!(target: "aaa.audit.killkrill", events = count, attempt = attempt + 1, "Batch delivered");
                    return Ok(());
                }
                Err(e) => {
                    last_error = e;
                    if attempt < self.config.max_retries {
                        let backoff = self.config.backoff(attempt);
                        warn!(
                            target: "aaa.audit.killkrill",
                            attempt = attempt + 1,
                            max_attempts = attempts,
                            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                            error = %last_error,
                            "KillKrill delivery failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        record_audit_delivery(SINK_NAME, "error", count);
        record_audit_dropped(SINK_NAME, count);
        error!(
            target: "aaa.audit.killkrill",
            attempts = attempts,
            dropped = count,
            error = %last_error,
            "KillKrill delivery failed, batch dropped"
        );
        Err(SinkError::Delivery(format!(
            "{count} events dropped after {attempts} attempts: {last_error}"
        )))
    }

    async fn post(&self, body: &[u8]) -> Result<(), String> {
        let response = self
            .http_client
            .post(self.config.events_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-API-Key", self.config.api_key.expose_secret())
            .body(body.to_vec())
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("endpoint returned {status}"))
        }
    }
}

/// Batched HTTP audit sink. See the module docs for the delivery policy.
pub struct KillKrillSink {
    shared: Arc<Shared>,
    cancel_token: CancellationToken,
    flush_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl KillKrillSink {
    /// Create the sink and start its background flush task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: KillKrillConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(target: "aaa.audit.killkrill", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        let shared = Arc::new(Shared {
            config,
            http_client,
            buffer: Mutex::new(Vec::new()),
        });
        let cancel_token = CancellationToken::new();
        let flush_task = tokio::spawn(run_flush_loop(Arc::clone(&shared), cancel_token.clone()));

        Self {
            shared,
            cancel_token,
            flush_task: parking_lot::Mutex::new(Some(flush_task)),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &KillKrillConfig {
        &self.shared.config
    }

    /// Number of events waiting for the next flush.
    pub async fn buffered(&self) -> usize {
        self.shared.buffer.lock().await.len()
    }
}

async fn run_flush_loop(shared: Arc<Shared>, cancel_token: CancellationToken) {
    info!(
        target: "aaa.audit.killkrill",
        endpoint = %shared.config.events_url,
        flush_interval_ms = u64::try_from(shared.config.flush_interval.as_millis()).unwrap_or(u64::MAX),
        "Starting KillKrill flush task"
    );

    let mut interval = tokio::time::interval_at(
        tokio::time::Instant::now() + shared.config.flush_interval,
        shared.config.flush_interval,
    );
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Failures are logged inside deliver; the loop keeps running
                let _ = shared.flush_now().await;
            }
            () = cancel_token.cancelled() => {
                break;
            }
        }
    }

    info!(target: "aaa.audit.killkrill", "KillKrill flush task stopped");
}

#[async_trait]
impl AuditSink for KillKrillSink {
    fn name(&self) -> &str {
        SINK_NAME
    }

    /// Buffer `event`; when the buffer reaches `batch_size` the calling task
    /// delivers the batch itself, retries included.
    async fn emit(&self, event: &Map<String, Value>) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Delivery("sink is closed".to_string()));
        }

        let should_flush = {
            let mut buffer = self.shared.buffer.lock().await;
            buffer.push(event.clone());
            buffer.len() >= self.shared.config.batch_size
        };

        if should_flush {
            self.shared.flush_now().await
        } else {
            Ok(())
        }
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.shared.flush_now().await
    }

    /// Stop the background task and flush what is left. Later calls only
    /// flush.
    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        self.cancel_token.cancel();

        let handle = self.flush_task.lock().take();
        if let Some(handle) = handle {
            let config = &self.shared.config;
            let grace = config
                .flush_interval
                .saturating_add(config.timeout)
                .saturating_add(Duration::from_secs(1));
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!(target: "aaa.audit.killkrill", "KillKrill flush task did not stop in time");
            }
        }

        self.shared.flush_now().await
    }
}

impl Drop for KillKrillSink {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
