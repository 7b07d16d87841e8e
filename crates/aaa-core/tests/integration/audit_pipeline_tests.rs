//! Integration tests for the audit pipeline
//!
//! Events flow through `AuditEmitter` to local sinks and to a KillKrill
//! endpoint served by wiremock.

use aaa_core::audit::sinks::AuditSink;
use aaa_core::audit::{
    AuditEmitter, AuditError, AuditEvent, FileSink, KillKrillConfig, KillKrillSink,
};
use aaa_test_utils::*;
use common::secret::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn login_event() -> AuditEvent {
    AuditEvent::auth_success(TEST_SUBJECT_ALICE, "portal")
        .with_ip("203.0.113.7")
        .with_user_agent("Mozilla/5.0")
        .with_correlation_id("req-1")
}

// ============================================================================
// Fan-out
// ============================================================================

/// A failing sink does not stop delivery to the sinks after it
#[tokio::test]
async fn test_fan_out_survives_failing_sink() -> Result<(), anyhow::Error> {
    // Arrange
    let first = Arc::new(RecordingSink::new("first"));
    let broken = Arc::new(FailingSink::new("broken"));
    let last = Arc::new(RecordingSink::new("last"));
    let sinks: Vec<Arc<dyn AuditSink>> = vec![first.clone(), broken.clone(), last.clone()];
    let emitter = AuditEmitter::new(sinks)?;

    // Act
    emitter.emit(&login_event()).await?;
    emitter
        .emit(&AuditEvent::auth_failure(TEST_SUBJECT_BOB, "portal", "bad_password"))
        .await?;

    // Assert
    assert_eq!(emitter.sink_names(), vec!["first", "broken", "last"]);
    assert_eq!(broken.attempts(), 2);

    for sink in [&first, &last] {
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "auth.success");
        assert_eq!(events[0]["subject"], TEST_SUBJECT_ALICE);
        assert_eq!(events[0]["outcome"], "success");
        assert_eq!(events[0]["ip"], "203.0.113.7");
        assert_eq!(events[1]["type"], "auth.failure");
        assert_eq!(events[1]["outcome"], "failure");
        assert_eq!(events[1]["details"]["reason"], "bad_password");
    }

    // Both sinks received the same serialized event
    assert_eq!(first.events(), last.events());

    Ok(())
}

/// Every sink failing is reported with each sink's error
#[tokio::test]
async fn test_all_sinks_failing_is_an_error() -> Result<(), anyhow::Error> {
    let sinks: Vec<Arc<dyn AuditSink>> = vec![
        Arc::new(FailingSink::new("a")),
        Arc::new(FailingSink::new("b")),
    ];
    let emitter = AuditEmitter::new(sinks)?;

    match emitter.emit(&login_event()).await {
        Err(AuditError::AllSinksFailed { errors }) => {
            let names: Vec<&str> = errors.iter().map(|(name, _)| name.as_str()).collect();
            assert_eq!(names, vec!["a", "b"]);
        }
        other => panic!("expected AllSinksFailed, got {other:?}"),
    }

    Ok(())
}

/// An emitter needs at least one sink
#[test]
fn test_emitter_requires_sinks() {
    assert!(matches!(AuditEmitter::new(Vec::new()), Err(AuditError::NoSinks)));
}

/// flush and close reach every sink, failing ones included
#[tokio::test]
async fn test_flush_and_close_reach_every_sink() -> Result<(), anyhow::Error> {
    let recording = Arc::new(RecordingSink::new("recording"));
    let sinks: Vec<Arc<dyn AuditSink>> =
        vec![Arc::new(FailingSink::new("broken")), recording.clone()];
    let emitter = AuditEmitter::new(sinks)?;

    emitter.flush().await;
    emitter.close().await;

    assert_eq!(recording.flushes(), 1);
    assert_eq!(recording.closes(), 1);
    Ok(())
}

// ============================================================================
// Local sinks
// ============================================================================

/// The file sink appends one JSON object per line
#[tokio::test]
async fn test_file_sink_through_emitter() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let log_path = dir.path().join("audit").join("events.log");
    let sink: Arc<dyn AuditSink> = Arc::new(FileSink::open(&log_path).await?);
    let emitter = AuditEmitter::new(vec![sink])?;

    emitter.emit(&login_event()).await?;
    emitter
        .emit(&AuditEvent::token_issued(TEST_SUBJECT_ALICE, TEST_CLIENT_ID))
        .await?;
    emitter.close().await;

    let contents = tokio::fs::read_to_string(&log_path).await?;
    let lines: Vec<Value> = contents
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "auth.success");
    assert_eq!(lines[1]["type"], "token.issued");
    assert_ne!(lines[0]["id"], lines[1]["id"]);
    Ok(())
}

// ============================================================================
// KillKrill
// ============================================================================

fn killkrill_config(server: &MockServer, batch_size: usize) -> KillKrillConfig {
    KillKrillConfig::builder(server.uri(), SecretString::from(TEST_KILLKRILL_API_KEY))
        .batch_size(batch_size)
        .flush_interval(Duration::from_secs(60))
        .max_retries(1)
        .backoff_base(Duration::from_millis(10))
        .build()
        .expect("valid killkrill config")
}

/// KillKrill receives batches as JSON arrays with the API key header
#[tokio::test]
async fn test_killkrill_batches_through_emitter() -> Result<(), anyhow::Error> {
    // Arrange
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/events"))
        .and(header("X-API-Key", TEST_KILLKRILL_API_KEY))
        .respond_with(ResponseTemplate::new(202))
        .expect(2)
        .mount(&server)
        .await;

    let recording = Arc::new(RecordingSink::new("recording"));
    let sinks: Vec<Arc<dyn AuditSink>> = vec![
        Arc::new(KillKrillSink::new(killkrill_config(&server, 2))),
        recording.clone(),
    ];
    let emitter = AuditEmitter::new(sinks)?;

    // Act: two events fill a batch, the third waits for close
    for i in 0..3 {
        emitter
            .emit(&login_event().with_detail("sequence", json!(i)))
            .await?;
    }
    emitter.close().await;

    // Assert
    let requests = server.received_requests().await.unwrap_or_default();
    let batches: Vec<Value> = requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body))
        .collect::<Result<_, _>>()?;

    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].as_array().map(Vec::len), Some(2));
    assert_eq!(batches[1].as_array().map(Vec::len), Some(1));
    assert_eq!(batches[0][0]["details"]["sequence"], 0);
    assert_eq!(batches[1][0]["details"]["sequence"], 2);
    assert_eq!(recording.events().len(), 3);

    Ok(())
}

/// An unreachable KillKrill does not fail the emitter while another sink works
#[tokio::test]
async fn test_killkrill_outage_is_isolated() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/events"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let killkrill = Arc::new(KillKrillSink::new(killkrill_config(&server, 1)));
    let recording = Arc::new(RecordingSink::new("recording"));
    let sinks: Vec<Arc<dyn AuditSink>> = vec![killkrill.clone(), recording.clone()];
    let emitter = AuditEmitter::new(sinks)?;

    emitter.emit(&login_event()).await?;

    assert_eq!(recording.events().len(), 1);
    assert_eq!(killkrill.buffered().await, 0, "dropped batch must not be requeued");

    killkrill.close().await?;
    Ok(())
}
