//! Observability helpers.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit fields.
//! Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (algorithms, kids, outcomes)
//! - **HASHED**: Logged via [`hash_for_correlation`] (subjects, tenants)
//! - **NEVER**: Tokens, refresh tokens, private keys, API keys, client secrets

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a value for log correlation (SHA-256, first 8 hex chars).
///
/// One-way and truncated: enough to correlate log lines about the same
/// subject without storing the subject itself.
#[must_use]
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}
