//! CSRF `state` values for the authorization-code redirect.

use crate::crypto::generate_random_bytes;
use crate::errors::AaaError;
use common::jwt::b64url_encode;
use subtle::ConstantTimeEq;

/// Entropy of generated state values, in bytes.
pub const STATE_BYTES: usize = 32;

/// Generate a random, URL-safe state value.
///
/// # Errors
///
/// `AaaError::Crypto` if the system RNG fails.
pub fn generate_state() -> Result<String, AaaError> {
    Ok(b64url_encode(generate_random_bytes(STATE_BYTES)?))
}

/// Compare the state returned by the authorization server with the one
/// issued, in constant time.
///
/// Lengths are not secret; the comparison time does not depend on where
/// equal-length inputs first differ.
#[must_use]
pub fn validate_state(expected: &str, received: &str) -> bool {
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}
