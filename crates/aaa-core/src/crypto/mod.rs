//! Signing algorithms, key material, JWK encoding and key storage.
//!
//! # Security
//!
//! - Only asymmetric algorithms are accepted; `none` and `HS*` are refused at
//!   configuration time to rule out algorithm-confusion attacks
//! - Private key material never leaves [`keys::SigningKey`] except as the
//!   PKCS#8 PEM written by the file-backed key store
//! - Randomness comes from `ring::rand::SystemRandom` (CSPRNG)

pub mod jwk;
pub mod jws;
pub mod keys;
pub mod keystore;

use crate::errors::AaaError;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub use jwk::{public_key_pem_to_jwk, public_key_to_jwk, Jwk, Jwks};
pub use keys::{SigningKey, VerificationKey};
pub use keystore::{FileKeyStore, KeyStore, MemoryKeyStore, MAX_KEYS};

/// Algorithms a signing key may be generated for and a token may be signed with.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
    ES384,
    ES512,
}

/// Every algorithm accepted by [`SigningAlgorithm::parse`].
pub const SUPPORTED_ALGORITHMS: [SigningAlgorithm; 9] = [
    SigningAlgorithm::RS256,
    SigningAlgorithm::RS384,
    SigningAlgorithm::RS512,
    SigningAlgorithm::PS256,
    SigningAlgorithm::PS384,
    SigningAlgorithm::PS512,
    SigningAlgorithm::ES256,
    SigningAlgorithm::ES384,
    SigningAlgorithm::ES512,
];

/// Key pair type an algorithm requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    P256,
    P384,
    P521,
}

impl KeyFamily {
    /// JWK `crv` name for EC families.
    #[must_use]
    pub fn curve_name(self) -> Option<&'static str> {
        match self {
            KeyFamily::Rsa => None,
            KeyFamily::P256 => Some("P-256"),
            KeyFamily::P384 => Some("P-384"),
            KeyFamily::P521 => Some("P-521"),
        }
    }
}

impl SigningAlgorithm {
    /// Parse a JOSE algorithm label against the allow-list.
    ///
    /// # Errors
    ///
    /// Returns `AaaError::Configuration` for `none`, any `HS*` algorithm, or any
    /// label outside the allow-list.
    pub fn parse(value: &str) -> Result<Self, AaaError> {
        let normalized = value.trim();

        if normalized.eq_ignore_ascii_case("none")
            || normalized.to_ascii_uppercase().starts_with("HS")
        {
            return Err(AaaError::Configuration(format!(
                "Algorithm '{normalized}' is forbidden: unsigned and symmetric algorithms are not allowed"
            )));
        }

        SUPPORTED_ALGORITHMS
            .iter()
            .copied()
            .find(|alg| alg.as_str() == normalized)
            .ok_or_else(|| {
                let allowed: Vec<&str> = SUPPORTED_ALGORITHMS.iter().map(|a| a.as_str()).collect();
                AaaError::Configuration(format!(
                    "Algorithm '{normalized}' is not supported; allowed: {}",
                    allowed.join(", ")
                ))
            })
    }

    /// JOSE label, e.g. `ES256`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
            SigningAlgorithm::ES256 => "ES256",
            SigningAlgorithm::ES384 => "ES384",
            SigningAlgorithm::ES512 => "ES512",
        }
    }

    #[must_use]
    pub fn family(self) -> KeyFamily {
        match self {
            SigningAlgorithm::RS256
            | SigningAlgorithm::RS384
            | SigningAlgorithm::RS512
            | SigningAlgorithm::PS256
            | SigningAlgorithm::PS384
            | SigningAlgorithm::PS512 => KeyFamily::Rsa,
            SigningAlgorithm::ES256 => KeyFamily::P256,
            SigningAlgorithm::ES384 => KeyFamily::P384,
            SigningAlgorithm::ES512 => KeyFamily::P521,
        }
    }

    /// The `jsonwebtoken` algorithm, when that crate implements it.
    ///
    /// `jsonwebtoken` has no ES512; that algorithm is handled with `p521`.
    pub(crate) fn jsonwebtoken_algorithm(self) -> Option<jsonwebtoken::Algorithm> {
        use jsonwebtoken::Algorithm;
        match self {
            SigningAlgorithm::RS256 => Some(Algorithm::RS256),
            SigningAlgorithm::RS384 => Some(Algorithm::RS384),
            SigningAlgorithm::RS512 => Some(Algorithm::RS512),
            SigningAlgorithm::PS256 => Some(Algorithm::PS256),
            SigningAlgorithm::PS384 => Some(Algorithm::PS384),
            SigningAlgorithm::PS512 => Some(Algorithm::PS512),
            SigningAlgorithm::ES256 => Some(Algorithm::ES256),
            SigningAlgorithm::ES384 => Some(Algorithm::ES384),
            SigningAlgorithm::ES512 => None,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SigningAlgorithm {
    type Err = AaaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SigningAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SigningAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Generate cryptographically secure random bytes.
///
/// # Errors
///
/// Returns `AaaError::Crypto` if the system RNG fails.
pub fn generate_random_bytes(len: usize) -> Result<Vec<u8>, AaaError> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|e| AaaError::Crypto(format!("Random bytes generation failed: {e}")))?;
    Ok(bytes)
}
