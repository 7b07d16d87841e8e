//! Metrics for the AAA toolkit.
//!
//! All metrics follow Prometheus naming conventions:
//! - `aaa_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `algorithm`: 9 values (the signing allow-list)
//! - `status`: success, error
//! - `reason`: bounded by `ValidationError::reason`
//! - `sink`: bounded by the sinks a host registers

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance duration and outcome
///
/// Metric: `aaa_token_issuance_duration_seconds`, `aaa_token_issuance_total`
/// Labels: `algorithm`, `status`
pub fn record_token_issuance(algorithm: &str, status: &str, duration: Duration) {
    histogram!("aaa_token_issuance_duration_seconds", "algorithm" => algorithm.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("aaa_token_issuance_total", "algorithm" => algorithm.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record token validation result
///
/// Metric: `aaa_token_validations_total`
/// Labels: `status`, `reason`
pub fn record_token_validation(status: &str, reason: Option<&str>) {
    let reason = reason.unwrap_or("none");
    counter!("aaa_token_validations_total", "status" => status.to_string(), "reason" => reason.to_string())
        .increment(1);
}

// ============================================================================
// Key Management Metrics
// ============================================================================

/// Record key rotation event
///
/// Metric: `aaa_key_rotation_total`
/// Labels: `status`
pub fn record_key_rotation(status: &str) {
    counter!("aaa_key_rotation_total", "status" => status.to_string()).increment(1);
}

/// Update retained signing keys count
///
/// Metric: `aaa_retained_signing_keys`
#[allow(clippy::cast_precision_loss)]
pub fn set_retained_signing_keys(count: usize) {
    gauge!("aaa_retained_signing_keys").set(count as f64);
}

// ============================================================================
// Audit Metrics
// ============================================================================

/// Record audit delivery outcome per sink
///
/// Metric: `aaa_audit_events_total`
/// Labels: `sink`, `status`
pub fn record_audit_delivery(sink: &str, status: &str, events: u64) {
    counter!("aaa_audit_events_total", "sink" => sink.to_string(), "status" => status.to_string())
        .increment(events);
}

/// Record audit events dropped after retries were exhausted
///
/// Metric: `aaa_audit_events_dropped_total`
/// Labels: `sink`
pub fn record_audit_dropped(sink: &str, events: u64) {
    counter!("aaa_audit_events_dropped_total", "sink" => sink.to_string()).increment(events);
}
