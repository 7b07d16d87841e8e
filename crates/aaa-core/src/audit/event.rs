//! Audit event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Closed set of auditable event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "auth.success")]
    AuthSuccess,
    #[serde(rename = "auth.failure")]
    AuthFailure,
    #[serde(rename = "token.issued")]
    TokenIssued,
    #[serde(rename = "token.revoked")]
    TokenRevoked,
    #[serde(rename = "token.refreshed")]
    TokenRefreshed,
    #[serde(rename = "authz.granted")]
    AuthzGranted,
    #[serde(rename = "authz.denied")]
    AuthzDenied,
    #[serde(rename = "spiffe.auth")]
    SpiffeAuth,
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.destroyed")]
    SessionDestroyed,
}

impl EventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::AuthSuccess => "auth.success",
            EventType::AuthFailure => "auth.failure",
            EventType::TokenIssued => "token.issued",
            EventType::TokenRevoked => "token.revoked",
            EventType::TokenRefreshed => "token.refreshed",
            EventType::AuthzGranted => "authz.granted",
            EventType::AuthzDenied => "authz.denied",
            EventType::SpiffeAuth => "spiffe.auth",
            EventType::SessionCreated => "session.created",
            EventType::SessionDestroyed => "session.destroyed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Immutable record of a security-relevant action.
///
/// `id` and `timestamp` are assigned at construction. Optional request
/// context is attached with the `with_*` builders before the event is
/// handed to an emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    id: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    event_type: EventType,
    subject: String,
    action: String,
    resource: String,
    outcome: Outcome,
    ip: Option<String>,
    user_agent: Option<String>,
    correlation_id: Option<String>,
    details: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        subject: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            subject: subject.into(),
            action: action.into(),
            resource: resource.into(),
            outcome,
            ip: None,
            user_agent: None,
            correlation_id: None,
            details: Map::new(),
        }
    }

    /// Successful authentication of `subject` to `resource`.
    pub fn auth_success(subject: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(EventType::AuthSuccess, subject, "authenticate", resource, Outcome::Success)
    }

    /// Failed authentication; `reason` lands in `details.reason`.
    pub fn auth_failure(
        subject: impl Into<String>,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(EventType::AuthFailure, subject, "authenticate", resource, Outcome::Failure)
            .with_detail("reason", Value::String(reason.into()))
    }

    /// Token set issued to `subject` for `audience`.
    pub fn token_issued(subject: impl Into<String>, audience: impl Into<String>) -> Self {
        Self::new(EventType::TokenIssued, subject, "issue", audience, Outcome::Success)
    }

    /// `subject` was refused `action` on `resource`.
    pub fn authz_denied(
        subject: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self::new(EventType::AuthzDenied, subject, action, resource, Outcome::Failure)
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    #[must_use]
    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    /// Plain JSON map handed to sinks. Absent optional fields are `null`;
    /// the timestamp is RFC 3339 in UTC.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("timestamp".into(), Value::String(self.timestamp.to_rfc3339()));
        map.insert("type".into(), Value::String(self.event_type.as_str().to_string()));
        map.insert("subject".into(), Value::String(self.subject.clone()));
        map.insert("action".into(), Value::String(self.action.clone()));
        map.insert("resource".into(), Value::String(self.resource.clone()));
        let outcome = match self.outcome {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        };
        map.insert("outcome".into(), Value::String(outcome.to_string()));
        map.insert("ip".into(), optional(self.ip.as_deref()));
        map.insert("user_agent".into(), optional(self.user_agent.as_deref()));
        map.insert("correlation_id".into(), optional(self.correlation_id.as_deref()));
        map.insert("details".into(), Value::Object(self.details.clone()));
        map
    }
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}
