//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for issued tokens. Nothing here verifies
//! signatures; use the relying party for that.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;

fn decode_part(token: &str, index: usize) -> Value {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT has no part {index}"));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT part {index}: {e}"));
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("Failed to parse JWT part {index} as JSON: {e}"))
}

fn header(token: &str) -> Value {
    decode_part(token, 0)
}

fn claims(token: &str) -> Value {
    decode_part(token, 1)
}

/// Custom assertions for issued tokens
///
/// # Example
/// ```rust,ignore
/// tokens.access_token
///     .assert_valid_jwt("ES256")
///     .assert_has_scope("meetings:read")
///     .assert_signed_by(&kid);
/// ```
pub trait TokenAssertions {
    /// Assert JWT structure, `typ: JWT`, and the given `alg`
    fn assert_valid_jwt(&self, alg: &str) -> &Self;

    /// Assert that the token contains the specified scope
    fn assert_has_scope(&self, scope: &str) -> &Self;

    /// Assert that the header carries the specified key ID
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert that the token expires within the specified seconds
    fn assert_expires_in(&self, seconds: u64) -> &Self;

    /// Assert that the token is for the specified subject
    fn assert_for_subject(&self, subject: &str) -> &Self;

    /// Assert that `aud` includes the specified audience
    fn assert_has_audience(&self, audience: &str) -> &Self;

    /// Assert the `token_use` claim (`access` or `id`)
    fn assert_token_use(&self, token_use: &str) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self, alg: &str) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "JWT must have 3 parts (header.payload.signature), got {}",
            parts.len()
        );
        assert!(!parts[2].is_empty(), "JWT signature must not be empty");

        let header = header(self);
        assert_eq!(header["alg"], alg, "Expected {alg} algorithm");
        assert_eq!(header["typ"], "JWT", "Expected JWT type");

        let claims = claims(self);
        assert!(claims.is_object(), "JWT payload must be a JSON object");

        self
    }

    fn assert_has_scope(&self, scope: &str) -> &Self {
        let claims = claims(self);
        let scopes: Vec<&str> = match &claims["scope"] {
            Value::String(s) => s.split_whitespace().collect(),
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };

        assert!(
            scopes.contains(&scope),
            "Token does not contain scope '{}'. Available scopes: {:?}",
            scope,
            scopes
        );

        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header = header(self);
        assert_eq!(
            header["kid"].as_str(),
            Some(key_id),
            "Expected key_id '{}', got {:?}",
            key_id,
            header["kid"]
        );

        self
    }

    fn assert_expires_in(&self, seconds: u64) -> &Self {
        let claims = claims(self);
        let exp = claims["exp"].as_i64().expect("exp must be an integer");

        let now = chrono::Utc::now().timestamp();
        let expires_in = exp - now;

        // Allow 5-second tolerance for slow test runs
        assert!(
            (expires_in - seconds as i64).abs() <= 5,
            "Expected token to expire in {} seconds, but expires in {} seconds",
            seconds,
            expires_in
        );

        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims = claims(self);
        assert_eq!(
            claims["sub"], subject,
            "Expected subject '{}', got {}",
            subject, claims["sub"]
        );

        self
    }

    fn assert_has_audience(&self, audience: &str) -> &Self {
        let claims = claims(self);
        let found = match &claims["aud"] {
            Value::String(s) => s == audience,
            Value::Array(items) => items.iter().any(|a| a == audience),
            _ => false,
        };

        assert!(
            found,
            "Token audience does not include '{}': {}",
            audience, claims["aud"]
        );

        self
    }

    fn assert_token_use(&self, token_use: &str) -> &Self {
        let claims = claims(self);
        assert_eq!(claims["token_use"], token_use, "Unexpected token_use");

        self
    }
}
