//! Compact JWS serialization on top of [`SigningKey`] / [`VerificationKey`].

use crate::crypto::keys::{SigningKey, VerificationKey};
use crate::errors::{AaaError, ValidationError};
use common::jwt::{b64url_decode, b64url_encode, split_compact, JwtHeader};
use serde::Serialize;
use serde_json::{Map, Value};

/// Sign `claims` as a compact JWT whose header carries `alg` and `kid`.
///
/// # Errors
///
/// Returns `AaaError::Crypto` if serialization or signing fails.
pub fn sign_compact<T: Serialize>(claims: &T, key: &SigningKey) -> Result<String, AaaError> {
    let header = JwtHeader::new(key.algorithm().as_str(), key.kid());

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| AaaError::Crypto(format!("Header serialization failed: {e}")))?;
    let payload_json = serde_json::to_vec(claims)
        .map_err(|e| AaaError::Crypto(format!("Claims serialization failed: {e}")))?;

    let signing_input = format!("{}.{}", b64url_encode(header_json), b64url_encode(payload_json));
    let signature = key.sign(signing_input.as_bytes())?;

    Ok(format!("{signing_input}.{signature}"))
}

/// Verify a compact JWT with `key` and return its payload object.
///
/// Only the signature is checked here; registered claims are the caller's
/// responsibility.
///
/// # Errors
///
/// `TokenTooLarge`, `MalformedToken`, or `InvalidSignature`.
pub fn verify_compact(
    token: &str,
    key: &VerificationKey,
) -> Result<Map<String, Value>, ValidationError> {
    let (header_part, payload_part, signature) = split_compact(token)?;

    let signing_input = token
        .get(..header_part.len() + 1 + payload_part.len())
        .ok_or(ValidationError::MalformedToken)?;
    key.verify(signing_input.as_bytes(), signature)?;

    let payload = b64url_decode(payload_part).map_err(|_| ValidationError::MalformedToken)?;
    serde_json::from_slice(&payload).map_err(|e| {
        tracing::debug!(target: "aaa.crypto.jws", error = %e, "Signed payload is not a JSON object");
        ValidationError::MalformedToken
    })
}
