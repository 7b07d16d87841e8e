use common::jwt::JwtValidationError;
use thiserror::Error;

/// Crate-wide error type.
///
/// Configuration problems are fatal to the caller and surface at construction.
/// Validation problems are expected in normal operation (bad or hostile
/// tokens) and surface per call. Audit delivery has its own error types in
/// [`crate::audit`].
#[derive(Debug, Error)]
pub enum AaaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Unsupported curve {curve}; supported curves: {}", .supported.join(", "))]
    UnsupportedCurve {
        curve: String,
        supported: Vec<&'static str>,
    },

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Insufficient scope: required {required}, provided {provided:?}")]
    InsufficientScope {
        required: String,
        provided: Vec<String>,
    },

    #[error("Missing role: {0}")]
    MissingRole(String),
}

/// Reasons a token or an issuer's metadata was rejected.
///
/// Token-level messages stay generic; the specific reason is recorded in
/// debug logs and in the `aaa_token_validations_total` metric.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("The token is invalid or expired")]
    TokenTooLarge,

    #[error("The token is invalid or expired")]
    MalformedToken,

    #[error("The token is invalid or expired")]
    MissingKid,

    #[error("Token algorithm is not allowed")]
    DisallowedAlgorithm,

    #[error("The token is invalid or expired")]
    UnknownKey,

    #[error("The token is invalid or expired")]
    InvalidSignature,

    #[error("The token is invalid or expired")]
    Expired,

    #[error("The token is invalid or expired")]
    NotYetValid,

    #[error("The token is invalid or expired")]
    IatTooFarInFuture,

    #[error("Token audience does not include this client")]
    InvalidAudience,

    #[error("Token issuer does not match the discovered issuer")]
    InvalidIssuer,

    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Discovery document is missing required fields: {}", .0.join(", "))]
    MissingDiscoveryFields(Vec<String>),

    #[error("Provider metadata has not been discovered")]
    NotDiscovered,

    #[error("Signing keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl ValidationError {
    /// Bounded label for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::TokenTooLarge => "too_large",
            ValidationError::MalformedToken => "malformed",
            ValidationError::MissingKid => "missing_kid",
            ValidationError::DisallowedAlgorithm => "disallowed_alg",
            ValidationError::UnknownKey => "unknown_key",
            ValidationError::InvalidSignature => "bad_signature",
            ValidationError::Expired => "expired",
            ValidationError::NotYetValid => "not_yet_valid",
            ValidationError::IatTooFarInFuture => "iat_future",
            ValidationError::InvalidAudience => "audience",
            ValidationError::InvalidIssuer => "issuer",
            ValidationError::InvalidClaims(_) => "claims",
            ValidationError::DiscoveryFailed(_)
            | ValidationError::MissingDiscoveryFields(_)
            | ValidationError::NotDiscovered => "discovery",
            ValidationError::KeySetUnavailable(_) => "jwks",
        }
    }
}

impl From<JwtValidationError> for ValidationError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge => ValidationError::TokenTooLarge,
            JwtValidationError::MalformedToken => ValidationError::MalformedToken,
            JwtValidationError::MissingKid => ValidationError::MissingKid,
            JwtValidationError::Expired => ValidationError::Expired,
            JwtValidationError::NotYetValid => ValidationError::NotYetValid,
            JwtValidationError::IatTooFarInFuture => ValidationError::IatTooFarInFuture,
        }
    }
}

impl From<JwtValidationError> for AaaError {
    fn from(err: JwtValidationError) -> Self {
        AaaError::Validation(err.into())
    }
}
