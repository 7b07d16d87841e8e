//! JWT utilities shared by the token issuer and the relying party.
//!
//! This module provides the pieces of compact-JWS handling that do not need
//! key material:
//! - Size limits for DoS prevention
//! - Clock skew constants
//! - Header decoding and key ID extraction
//! - Time-claim (`exp`, `nbf`, `iat`) validation with leeway
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature; callers must verify before
//!   trusting any decoded value other than the header's `kid`/`alg`
//! - Error messages are generic; details go to `debug!` logs only
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, validate_exp_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_header(token)?;
//! let kid = header.kid.as_deref().ok_or(JwtValidationError::MissingKid)?;
//! // ... resolve key, verify signature ...
//! validate_exp_at(claims_exp, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Tokens larger than this are rejected BEFORE any base64 decoding, JSON
/// parsing, network lookups or signature checks.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew leeway applied to `exp`, `nbf` and `iat` (30 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Maximum configurable clock skew leeway (5 minutes).
///
/// Larger values are refused at configuration time.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

// =============================================================================
// Error Types
// =============================================================================

/// Errors produced while decoding or time-checking a compact JWT.
///
/// Messages are intentionally generic to prevent information leakage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The token is invalid or expired")]
    TokenTooLarge,

    /// Token is not a three-segment compact JWS with JSON header/payload.
    #[error("The token is invalid or expired")]
    MalformedToken,

    /// Token header has no usable `kid`.
    #[error("The token is invalid or expired")]
    MissingKid,

    /// `exp` is in the past beyond the leeway.
    #[error("The token is invalid or expired")]
    Expired,

    /// `nbf` is in the future beyond the leeway.
    #[error("The token is invalid or expired")]
    NotYetValid,

    /// `iat` is in the future beyond the leeway.
    #[error("The token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// Protected header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signature algorithm label, e.g. `RS256`.
    pub alg: String,

    /// Media type, `JWT` for tokens minted by this toolkit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Key ID used to select the verification key from a JWKS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwtHeader {
    /// Header for a token signed with `alg` by the key identified by `kid`.
    #[must_use]
    pub fn new(alg: &str, kid: &str) -> Self {
        Self {
            alg: alg.to_string(),
            typ: Some("JWT".to_string()),
            kid: Some(kid.to_string()),
        }
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Reject tokens larger than [`MAX_JWT_SIZE_BYTES`].
///
/// # Errors
///
/// Returns `TokenTooLarge` when the limit is exceeded.
pub fn check_token_size(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }
    Ok(())
}

/// Split a compact JWS into `(header, payload, signature)` segments.
///
/// The token size is checked first.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken`.
pub fn split_compact(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    check_token_size(token)?;

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => {
            tracing::debug!(
                target: "common.jwt",
                parts = token.split('.').count(),
                "Token rejected: invalid JWT format"
            );
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Decode the protected header of a compact JWS without verifying it.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken`.
pub fn decode_header(token: &str) -> Result<JwtHeader, JwtValidationError> {
    let (header_part, _, _) = split_compact(token)?;

    let header_bytes = b64url_decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// The `kid` must only be used for key lookup in a trusted JWKS; the token
/// MUST still be verified with the resolved key.
///
/// # Errors
///
/// Returns `TokenTooLarge`, `MalformedToken`, or `MissingKid` (absent or empty).
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    decode_header(token)?
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(JwtValidationError::MissingKid)
}

/// Decode the payload of a compact JWS as a JSON object WITHOUT verifying it.
///
/// For diagnostics and tests only. Never authorize on the result.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `MalformedToken` (including non-object payloads).
pub fn decode_payload_unverified(
    token: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, JwtValidationError> {
    let (_, payload_part, _) = split_compact(token)?;

    let payload_bytes = b64url_decode(payload_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
        JwtValidationError::MalformedToken
    })
}

/// Validate the `iat` (issued-at) claim against the wall clock.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    validate_iat_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat > now + clock_skew`.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Deterministic `exp` validation against an explicit `now` timestamp.
///
/// # Errors
///
/// Returns `Expired` if `now > exp + clock_skew`.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let deadline = exp.saturating_add(skew_secs(clock_skew));

    if now > deadline {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

/// Deterministic `nbf` validation against an explicit `now` timestamp.
///
/// # Errors
///
/// Returns `NotYetValid` if `nbf > now + clock_skew`.
pub fn validate_nbf_at(nbf: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    if nbf > now.saturating_add(skew_secs(clock_skew)) {
        tracing::debug!(
            target: "common.jwt",
            nbf = nbf,
            now = now,
            "Token rejected: not yet valid"
        );
        return Err(JwtValidationError::NotYetValid);
    }

    Ok(())
}

/// Base64url encoding without padding (JOSE encoding).
#[must_use]
pub fn b64url_encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Base64url decoding without padding (JOSE encoding).
///
/// # Errors
///
/// Returns `base64::DecodeError` on invalid input.
pub fn b64url_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(input)
}

fn skew_secs(clock_skew: Duration) -> i64 {
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

// =============================================================================
// Tests
// =============================================================================
