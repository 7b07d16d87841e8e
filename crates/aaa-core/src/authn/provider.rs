//! OIDC provider: issues signed access/id tokens and publishes discovery
//! metadata and the JWKS.
//!
//! # Security
//!
//! - Only asymmetric algorithms from the allow-list are accepted
//! - The issuer must be HTTPS (local development hosts excepted)
//! - Refresh tokens are 48 random bytes, base64url encoded; never JWTs
//! - Subjects are logged only as correlation hashes

use crate::authn::types::{Principal, TokenSet};
use crate::crypto::jws::sign_compact;
use crate::crypto::{generate_random_bytes, Jwks, KeyStore, SigningAlgorithm};
use crate::errors::AaaError;
use crate::hardening::{normalize_issuer, validate_https_url};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::record_token_issuance;
use chrono::Utc;
use common::jwt::b64url_encode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Default access/id token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Entropy of generated refresh tokens, in bytes.
pub const REFRESH_TOKEN_BYTES: usize = 48;

/// Claims advertised in the discovery document.
const SUPPORTED_CLAIMS: [&str; 9] = [
    "sub", "iss", "aud", "iat", "exp", "scope", "roles", "tenant", "teams",
];

// =============================================================================
// Configuration
// =============================================================================

/// Validated provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    issuer: String,
    audiences: Vec<String>,
    algorithm: SigningAlgorithm,
    token_ttl: Duration,
}

/// Builder for [`ProviderConfig`]; validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ProviderConfigBuilder {
    issuer: String,
    audiences: Vec<String>,
    algorithm: String,
    token_ttl: Duration,
}

impl ProviderConfig {
    /// Start a configuration for `issuer` serving `audiences`.
    ///
    /// Defaults: `RS256`, one hour token lifetime.
    pub fn builder<I, S>(issuer: impl Into<String>, audiences: I) -> ProviderConfigBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProviderConfigBuilder {
            issuer: issuer.into(),
            audiences: audiences.into_iter().map(Into::into).collect(),
            algorithm: SigningAlgorithm::RS256.as_str().to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Issuer URL without trailing slash.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audiences(&self) -> &[String] {
        &self.audiences
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }
}

impl ProviderConfigBuilder {
    /// Signing algorithm label, e.g. `ES256`. Checked in `build`.
    #[must_use]
    pub fn algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = algorithm.into();
        self
    }

    #[must_use]
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// `AaaError::Configuration` if the issuer is not an acceptable URL, the
    /// algorithm is not allowed, the audience list is empty, or the token
    /// lifetime is shorter than one second.
    pub fn build(self) -> Result<ProviderConfig, AaaError> {
        validate_https_url(&self.issuer, "issuer")?;
        let algorithm = SigningAlgorithm::parse(&self.algorithm)?;

        let audiences: Vec<String> = self
            .audiences
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if audiences.is_empty() {
            return Err(AaaError::Configuration(
                "audiences must contain at least one entry".to_string(),
            ));
        }

        if self.token_ttl.as_secs() == 0 {
            return Err(AaaError::Configuration(
                "token_ttl must be at least one second".to_string(),
            ));
        }

        Ok(ProviderConfig {
            issuer: normalize_issuer(&self.issuer).to_string(),
            audiences,
            algorithm,
            token_ttl: self.token_ttl,
        })
    }
}

// =============================================================================
// Discovery metadata
// =============================================================================

/// OpenID Provider Metadata served at `/.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Serialize)]
struct TokenPayload<'a> {
    sub: &'a str,
    iss: &'a str,
    aud: &'a [String],
    iat: i64,
    exp: i64,
    scope: &'a [String],
    roles: &'a [String],
    tenant: &'a str,
    teams: &'a [String],
    ext: &'a Map<String, Value>,
    token_use: &'static str,
}

/// Token issuer backed by a [`KeyStore`].
pub struct OidcProvider {
    config: ProviderConfig,
    key_store: Arc<dyn KeyStore>,
}

impl OidcProvider {
    /// Create a provider signing with `key_store`.
    ///
    /// # Errors
    ///
    /// `AaaError::Configuration` if the store generates keys for a different
    /// algorithm than the configuration names.
    pub fn new(config: ProviderConfig, key_store: Arc<dyn KeyStore>) -> Result<Self, AaaError> {
        if key_store.algorithm() != config.algorithm {
            return Err(AaaError::Configuration(format!(
                "key store algorithm {} does not match configured algorithm {}",
                key_store.algorithm(),
                config.algorithm
            )));
        }

        Ok(Self { config, key_store })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    /// Issue an access token, id token and refresh token for `principal`.
    ///
    /// Both JWTs share one payload except for `token_use` (`access` / `id`)
    /// and carry the active key's `kid` in their header.
    ///
    /// # Errors
    ///
    /// - `Validation(InvalidClaims)` if the principal violates the claim invariants
    /// - `Crypto` if signing or random generation fails
    #[instrument(skip_all, fields(algorithm = %self.config.algorithm))]
    pub fn issue_token_set(&self, principal: &Principal) -> Result<TokenSet, AaaError> {
        let start = Instant::now();
        let result = self.sign_token_set(principal);

        let status = if result.is_ok() { "success" } else { "error" };
        record_token_issuance(self.config.algorithm.as_str(), status, start.elapsed());

        match &result {
            Ok(_) => info!(
                target: "aaa.authn.provider",
                subject = %hash_for_correlation(&principal.sub),
                tenant = %hash_for_correlation(&principal.tenant),
                "Token set issued"
            ),
            Err(e) => warn!(target: "aaa.authn.provider", error = %e, "Token issuance failed"),
        }

        result
    }

    fn sign_token_set(&self, principal: &Principal) -> Result<TokenSet, AaaError> {
        principal.validate()?;

        let key = self.key_store.signing_key();
        let iat = Utc::now().timestamp();
        let ttl_secs = self.config.token_ttl.as_secs();
        let exp = iat.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX));

        let payload = |token_use| TokenPayload {
            sub: &principal.sub,
            iss: &self.config.issuer,
            aud: &self.config.audiences,
            iat,
            exp,
            scope: &principal.scope,
            roles: &principal.roles,
            tenant: &principal.tenant,
            teams: &principal.teams,
            ext: &principal.ext,
            token_use,
        };

        let access_token = sign_compact(&payload("access"), &key)?;
        let id_token = sign_compact(&payload("id"), &key)?;
        let refresh_token = b64url_encode(generate_random_bytes(REFRESH_TOKEN_BYTES)?);

        Ok(TokenSet {
            access_token,
            id_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: ttl_secs,
        })
    }

    /// Discovery metadata derived from the configuration.
    #[must_use]
    pub fn discovery_document(&self) -> ProviderMetadata {
        let issuer = &self.config.issuer;
        let strings = |values: &[&str]| values.iter().map(ToString::to_string).collect();

        ProviderMetadata {
            issuer: issuer.clone(),
            authorization_endpoint: format!("{issuer}/oauth2/authorize"),
            token_endpoint: format!("{issuer}/oauth2/token"),
            userinfo_endpoint: format!("{issuer}/oauth2/userinfo"),
            jwks_uri: format!("{issuer}/.well-known/jwks.json"),
            response_types_supported: strings(&["code"]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: vec![self.config.algorithm.to_string()],
            scopes_supported: strings(&["openid", "profile", "email"]),
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_basic",
                "client_secret_post",
            ]),
            claims_supported: strings(&SUPPORTED_CLAIMS),
        }
    }

    /// Public keys of every retained signing key.
    ///
    /// # Errors
    ///
    /// Propagates JWK encoding errors.
    pub fn jwks(&self) -> Result<Jwks, AaaError> {
        self.key_store.jwks()
    }
}

// =============================================================================
// Tests
// =============================================================================
