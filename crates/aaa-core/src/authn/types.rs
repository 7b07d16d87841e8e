//! Identity types exchanged with the issuer and relying party.

use crate::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Maximum length of a `sub` claim, in characters.
pub const MAX_SUBJECT_LENGTH: usize = 256;

/// List-valued claims that may arrive as a bare string.
const LIST_CLAIMS: [&str; 4] = ["scope", "roles", "teams", "aud"];

// =============================================================================
// Principal
// =============================================================================

/// The identity a token set is issued for.
///
/// Issuer, audience and timestamps are supplied by the provider's
/// configuration at issuance time.
///
/// ```rust,ignore
/// let principal = Principal::new("user-1", "acme")
///     .with_scope(["openid", "meetings:read"])
///     .with_roles(["admin"]);
/// ```
#[derive(Clone, PartialEq)]
pub struct Principal {
    pub sub: String,
    pub tenant: String,
    pub scope: Vec<String>,
    pub roles: Vec<String>,
    pub teams: Vec<String>,
    pub ext: Map<String, Value>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("sub", &"[REDACTED]")
            .field("tenant", &self.tenant)
            .field("scope", &self.scope)
            .field("roles", &self.roles)
            .field("teams", &self.teams)
            .finish_non_exhaustive()
    }
}

impl Principal {
    #[must_use]
    pub fn new(sub: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            tenant: tenant.into(),
            scope: Vec::new(),
            roles: Vec::new(),
            teams: Vec::new(),
            ext: Map::new(),
        }
    }

    #[must_use]
    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_teams<I, S>(mut self, teams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.teams = teams.into_iter().map(Into::into).collect();
        self
    }

    /// Add a free-form extension claim (carried under `ext`).
    #[must_use]
    pub fn with_ext(mut self, key: impl Into<String>, value: Value) -> Self {
        self.ext.insert(key.into(), value);
        self
    }

    /// Check the subject and tenant invariants.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidClaims` describing the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_subject(&self.sub)?;
        validate_tenant(&self.tenant)
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Verified, normalized token claims.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
    pub scope: Vec<String>,
    pub roles: Vec<String>,
    pub tenant: String,
    pub teams: Vec<String>,
    #[serde(default)]
    pub ext: Map<String, Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("scope", &self.scope)
            .field("roles", &self.roles)
            .field("tenant", &self.tenant)
            .field("teams", &self.teams)
            .finish_non_exhaustive()
    }
}

impl Claims {
    /// Normalize a verified JWT payload and check it against the claim
    /// invariants.
    ///
    /// - `scope` given as a string is split on whitespace
    /// - `roles`, `teams` and `aud` given as a string become one-element lists
    /// - absent or null list claims become empty lists
    /// - numeric `iat`/`exp` become timestamps (fractional seconds truncated)
    ///
    /// No other coercion happens: a numeric `sub`, for example, is rejected.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidClaims` on any type or invariant
    /// violation.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self, ValidationError> {
        let normalized = normalize_payload(payload);

        let claims: Claims = serde_json::from_value(Value::Object(normalized)).map_err(|e| {
            tracing::debug!(target: "aaa.authn.claims", error = %e, "Claims failed strict typing");
            ValidationError::InvalidClaims(e.to_string())
        })?;

        claims.validate()?;
        Ok(claims)
    }

    /// Check the claim invariants.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidClaims` describing the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_subject(&self.sub)?;
        validate_tenant(&self.tenant)?;

        if self.iss.trim().is_empty() {
            return Err(ValidationError::InvalidClaims("iss must not be empty".to_string()));
        }
        if self.exp <= self.iat {
            return Err(ValidationError::InvalidClaims("exp must be after iat".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.iter().any(|s| s == scope)
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

fn normalize_payload(mut payload: Map<String, Value>) -> Map<String, Value> {
    for field in LIST_CLAIMS {
        let normalized = match payload.remove(field) {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(Value::String(s)) if field == "scope" => Value::Array(
                s.split_whitespace()
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ),
            Some(Value::String(s)) => Value::Array(vec![Value::String(s)]),
            Some(other) => other,
        };
        payload.insert(field.to_string(), normalized);
    }

    for field in ["iat", "exp"] {
        let truncated = payload
            .get(field)
            .and_then(|v| match v {
                Value::Number(n) => Some(n),
                _ => None,
            })
            .filter(|n| !n.is_i64() && !n.is_u64())
            .and_then(serde_json::Number::as_f64)
            .filter(|f| f.is_finite())
            .map(f64::trunc);

        if let Some(seconds) = truncated {
            // Saturating float-to-int conversion; out-of-range values fail later
            #[allow(clippy::cast_possible_truncation)]
            payload.insert(field.to_string(), Value::from(seconds as i64));
        }
    }

    payload
}

fn validate_subject(sub: &str) -> Result<(), ValidationError> {
    if sub.trim().is_empty() {
        return Err(ValidationError::InvalidClaims("sub must not be empty".to_string()));
    }
    if sub.chars().count() > MAX_SUBJECT_LENGTH {
        return Err(ValidationError::InvalidClaims(format!(
            "sub must be at most {MAX_SUBJECT_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_tenant(tenant: &str) -> Result<(), ValidationError> {
    if tenant.trim().is_empty() {
        return Err(ValidationError::InvalidClaims("tenant must not be empty".to_string()));
    }
    Ok(())
}

// =============================================================================
// TokenSet
// =============================================================================

/// Tokens returned by one issuance.
///
/// The refresh token is opaque; this crate neither stores nor validates it.
#[derive(Clone, Serialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access/id token lifetime in seconds.
    pub expires_in: u64,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
