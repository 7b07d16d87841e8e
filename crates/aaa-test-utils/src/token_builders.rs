//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating test tokens, including tokens the
//! provider would never mint (expired, foreign issuer, unsigned).

use aaa_core::crypto::jws::sign_compact;
use aaa_core::crypto::SigningKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_scope("meetings:read meetings:write")
///     .expires_in(3600)
///     .sign_with(&signing_key);
/// ```
pub struct TestTokenBuilder {
    sub: String,
    tenant: String,
    iss: String,
    aud: Vec<String>,
    scope: String,
    roles: Vec<String>,
    exp: i64,
    iat: i64,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            tenant: "test-tenant".to_string(),
            iss: "https://idp.example.com".to_string(),
            aud: vec!["test-client".to_string()],
            scope: String::new(),
            roles: Vec::new(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Set the subject (user/service)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn in_tenant(mut self, tenant: &str) -> Self {
        self.tenant = tenant.to_string();
        self
    }

    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Replace the audience list
    pub fn for_audience(mut self, audience: &[&str]) -> Self {
        self.aud = audience.iter().map(ToString::to_string).collect();
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(ToString::to_string).collect();
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set an arbitrary claim, overriding any default
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = json!({
            "sub": self.sub,
            "tenant": self.tenant,
            "iss": self.iss,
            "aud": self.aud,
            "scope": self.scope,
            "roles": self.roles,
            "exp": self.exp,
            "iat": self.iat,
        });

        if let Some(object) = claims.as_object_mut() {
            if let Some(nbf) = self.nbf {
                object.insert("nbf".to_string(), json!(nbf));
            }
            object.extend(self.extra);
        }

        claims
    }

    /// Build and sign with `key`; the header carries the key's `alg` and `kid`
    pub fn sign_with(self, key: &SigningKey) -> String {
        sign_compact(&self.build(), key).expect("Failed to sign test token")
    }

    /// Build with an arbitrary header and a junk signature
    ///
    /// For `alg: none` and algorithm-confusion scenarios.
    pub fn forge(self, alg: &str, kid: Option<&str>) -> String {
        let mut header = json!({ "alg": alg, "typ": "JWT" });
        if let Some(kid) = kid {
            header["kid"] = json!(kid);
        }

        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(self.build().to_string()),
            URL_SAFE_NO_PAD.encode(b"forged-signature")
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace the payload of a signed token, keeping header and signature
pub fn tamper_payload(token: &str, claims: &Value) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "token must have 3 parts");
    format!(
        "{}.{}.{}",
        parts[0],
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        parts[2]
    )
}
