//! OIDC relying party: discovers a remote issuer and validates its tokens.
//!
//! # Validation order
//!
//! 1. Size guard (8KB) before any parsing, network or crypto work
//! 2. Header `alg` must be in the configured allow-list
//! 3. Discovery (once, cached for the lifetime of the relying party)
//! 4. Key lookup by `kid` in the issuer's JWKS (cached, one refetch on miss)
//! 5. Signature verification with a key whose type matches `alg`
//! 6. Claim normalization and strict typing
//! 7. `exp` / `nbf` / `iat` with clock-skew leeway, then `aud` and `iss`
//!
//! Rejections are returned as generic `ValidationError`s; the specific
//! reason goes to debug logs and the `aaa_token_validations_total` metric.

use crate::authn::jwks_client::{JwksClient, DEFAULT_JWKS_CACHE_TTL, MAX_JWKS_CACHE_TTL};
use crate::authn::types::Claims;
use crate::crypto::jws::verify_compact;
use crate::crypto::{SigningAlgorithm, VerificationKey};
use crate::errors::{AaaError, ValidationError};
use crate::hardening::{normalize_issuer, validate_https_url};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::record_token_validation;
use chrono::Utc;
use common::jwt::{
    check_token_size, decode_header, validate_exp_at, validate_iat_at, validate_nbf_at,
    DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW,
};
use common::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::instrument;
use url::Url;

/// Timeout for discovery and JWKS requests.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest discovery/JWKS request timeout a relying party may configure.
pub const MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Algorithms accepted when none are configured.
pub const DEFAULT_ALGORITHMS: [SigningAlgorithm; 3] = [
    SigningAlgorithm::RS256,
    SigningAlgorithm::ES256,
    SigningAlgorithm::PS256,
];

const REQUIRED_DISCOVERY_FIELDS: [&str; 4] = [
    "issuer",
    "jwks_uri",
    "authorization_endpoint",
    "token_endpoint",
];

// =============================================================================
// Configuration
// =============================================================================

/// Validated relying-party configuration.
pub struct RelyingPartyConfig {
    issuer_url: Url,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_url: Url,
    scopes: Vec<String>,
    algorithms: Vec<SigningAlgorithm>,
    clock_skew: Duration,
    jwks_cache_ttl: Duration,
    http_timeout: Duration,
}

impl fmt::Debug for RelyingPartyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelyingPartyConfig")
            .field("issuer_url", &self.issuer_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_url", &self.redirect_url.as_str())
            .field("scopes", &self.scopes)
            .field("algorithms", &self.algorithms)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RelyingPartyConfig`].
pub struct RelyingPartyConfigBuilder {
    issuer_url: String,
    client_id: String,
    client_secret: Option<SecretString>,
    redirect_url: String,
    scopes: Vec<String>,
    algorithms: Option<Vec<String>>,
    clock_skew: Duration,
    jwks_cache_ttl: Duration,
    http_timeout: Duration,
}

impl RelyingPartyConfig {
    /// Start a configuration. Defaults: scopes `openid profile email`, algorithms
    /// `RS256`/`ES256`/`PS256`, 30s clock skew.
    pub fn builder(
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> RelyingPartyConfigBuilder {
        RelyingPartyConfigBuilder {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_url: redirect_url.into(),
            scopes: ["openid", "profile", "email"].map(String::from).to_vec(),
            algorithms: None,
            clock_skew: DEFAULT_CLOCK_SKEW,
            jwks_cache_ttl: DEFAULT_JWKS_CACHE_TTL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Issuer URL without trailing slash.
    #[must_use]
    pub fn issuer(&self) -> &str {
        normalize_issuer(self.issuer_url.as_str())
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret for the token endpoint, if this is a confidential client.
    #[must_use]
    pub fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    #[must_use]
    pub fn redirect_url(&self) -> &Url {
        &self.redirect_url
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn algorithms(&self) -> &[SigningAlgorithm] {
        &self.algorithms
    }

    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        self.clock_skew
    }
}

impl RelyingPartyConfigBuilder {
    #[must_use]
    pub fn client_secret(mut self, secret: SecretString) -> Self {
        self.client_secret = Some(secret);
        self
    }

    #[must_use]
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Accepted token algorithms. Each label is checked in `build`.
    #[must_use]
    pub fn algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.algorithms = Some(algorithms.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    #[must_use]
    pub fn jwks_cache_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// `AaaError::Configuration` for non-HTTPS URLs (localhost excepted), an
    /// empty client id, a disallowed or empty algorithm list, a clock skew
    /// above five minutes, a zero or over-long JWKS cache ttl, or a zero or
    /// over-long HTTP timeout.
    pub fn build(self) -> Result<RelyingPartyConfig, AaaError> {
        let issuer_url = validate_https_url(&self.issuer_url, "issuer_url")?;
        let redirect_url = validate_https_url(&self.redirect_url, "redirect_url")?;

        let client_id = self.client_id.trim().to_string();
        if client_id.is_empty() {
            return Err(AaaError::Configuration("client_id must not be empty".to_string()));
        }

        let algorithms = match self.algorithms {
            None => DEFAULT_ALGORITHMS.to_vec(),
            Some(labels) => {
                let mut parsed = Vec::with_capacity(labels.len());
                for label in &labels {
                    let alg = SigningAlgorithm::parse(label)?;
                    if !parsed.contains(&alg) {
                        parsed.push(alg);
                    }
                }
                parsed
            }
        };
        if algorithms.is_empty() {
            return Err(AaaError::Configuration(
                "algorithms must contain at least one entry".to_string(),
            ));
        }

        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(AaaError::Configuration(format!(
                "clock_skew must be at most {} seconds",
                MAX_CLOCK_SKEW.as_secs()
            )));
        }
        if self.jwks_cache_ttl.is_zero() || self.jwks_cache_ttl > MAX_JWKS_CACHE_TTL {
            return Err(AaaError::Configuration(format!(
                "jwks_cache_ttl must be between 1s and {}s",
                MAX_JWKS_CACHE_TTL.as_secs()
            )));
        }
        if self.http_timeout.is_zero() || self.http_timeout > MAX_HTTP_TIMEOUT {
            return Err(AaaError::Configuration(format!(
                "http_timeout must be between 1s and {}s",
                MAX_HTTP_TIMEOUT.as_secs()
            )));
        }

        Ok(RelyingPartyConfig {
            issuer_url,
            client_id,
            client_secret: self.client_secret,
            redirect_url,
            scopes: self.scopes,
            algorithms,
            clock_skew: self.clock_skew,
            jwks_cache_ttl: self.jwks_cache_ttl,
            http_timeout: self.http_timeout,
        })
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// The parts of an issuer's OpenID Provider Metadata this crate uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

struct Discovered {
    document: DiscoveryDocument,
    jwks: JwksClient,
}

// =============================================================================
// Relying party
// =============================================================================

/// Token validator bound to one issuer and one client.
pub struct OidcRelyingParty {
    config: RelyingPartyConfig,
    http_client: reqwest::Client,
    discovered: OnceCell<Discovered>,
}

impl OidcRelyingParty {
    /// Create a relying party. No network traffic happens until the first
    /// [`discover`](Self::discover) or [`validate_token`](Self::validate_token).
    #[must_use]
    pub fn new(config: RelyingPartyConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "aaa.authn.rp", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            config,
            http_client,
            discovered: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    /// Fetch and cache the issuer's discovery document.
    ///
    /// Idempotent: after the first success the cached document is returned
    /// without a network round-trip. A failed discovery is not cached.
    ///
    /// # Errors
    ///
    /// - `Validation(DiscoveryFailed)` on transport, status or parse errors
    /// - `Validation(MissingDiscoveryFields)` naming every missing field
    pub async fn discover(&self) -> Result<&DiscoveryDocument, AaaError> {
        Ok(&self.discovered().await?.document)
    }

    async fn discovered(&self) -> Result<&Discovered, ValidationError> {
        self.discovered
            .get_or_try_init(|| self.fetch_discovery())
            .await
    }

    #[instrument(skip_all, fields(issuer = %self.config.issuer()))]
    async fn fetch_discovery(&self) -> Result<Discovered, ValidationError> {
        let url = format!("{}/.well-known/openid-configuration", self.config.issuer());
        tracing::debug!(target: "aaa.authn.rp", url = %url, "Fetching discovery document");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            tracing::error!(target: "aaa.authn.rp", error = %e, "Failed to fetch discovery document");
            ValidationError::DiscoveryFailed("request failed".to_string())
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "aaa.authn.rp",
                status = %response.status(),
                "Discovery endpoint returned error"
            );
            return Err(ValidationError::DiscoveryFailed(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let raw: Map<String, Value> = response.json().await.map_err(|e| {
            tracing::error!(target: "aaa.authn.rp", error = %e, "Failed to parse discovery document");
            ValidationError::DiscoveryFailed("response is not a JSON object".to_string())
        })?;

        let missing: Vec<String> = REQUIRED_DISCOVERY_FIELDS
            .iter()
            .filter(|field| {
                raw.get(**field)
                    .and_then(Value::as_str)
                    .map_or(true, |v| v.trim().is_empty())
            })
            .map(|field| (*field).to_string())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(target: "aaa.authn.rp", missing = ?missing, "Discovery document incomplete");
            return Err(ValidationError::MissingDiscoveryFields(missing));
        }

        let document: DiscoveryDocument = serde_json::from_value(Value::Object(raw))
            .map_err(|e| ValidationError::DiscoveryFailed(e.to_string()))?;

        if normalize_issuer(&document.issuer) != self.config.issuer() {
            tracing::warn!(
                target: "aaa.authn.rp",
                discovered = %document.issuer,
                "Discovered issuer does not match configured issuer"
            );
            return Err(ValidationError::DiscoveryFailed(
                "issuer does not match configuration".to_string(),
            ));
        }

        let jwks_url = validate_https_url(&document.jwks_uri, "jwks_uri")
            .map_err(|e| ValidationError::DiscoveryFailed(e.to_string()))?;

        tracing::info!(target: "aaa.authn.rp", jwks_uri = %jwks_url, "Issuer discovered");

        Ok(Discovered {
            jwks: JwksClient::new(jwks_url, self.http_client.clone(), self.config.jwks_cache_ttl),
            document,
        })
    }

    /// Validate a raw token and return its normalized claims.
    ///
    /// # Errors
    ///
    /// `AaaError::Validation` with the rejection reason.
    #[instrument(skip_all)]
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AaaError> {
        let result = self.validate_inner(token).await;

        match &result {
            Ok(claims) => {
                record_token_validation("success", None);
                tracing::debug!(
                    target: "aaa.authn.rp",
                    subject = %hash_for_correlation(&claims.sub),
                    "Token validated"
                );
            }
            Err(e) => {
                record_token_validation("error", Some(e.reason()));
                tracing::debug!(target: "aaa.authn.rp", reason = e.reason(), "Token rejected");
            }
        }

        result.map_err(AaaError::from)
    }

    async fn validate_inner(&self, token: &str) -> Result<Claims, ValidationError> {
        check_token_size(token)?;

        let header = decode_header(token)?;
        let algorithm = SigningAlgorithm::parse(&header.alg)
            .ok()
            .filter(|alg| self.config.algorithms.contains(alg))
            .ok_or_else(|| {
                tracing::debug!(target: "aaa.authn.rp", alg = %header.alg, "Token algorithm not allowed");
                ValidationError::DisallowedAlgorithm
            })?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(ValidationError::MissingKid)?;

        let discovered = self.discovered().await?;
        let jwk = discovered.jwks.get_key(&kid).await?;
        let key = VerificationKey::from_jwk(&jwk, algorithm)?;
        let payload = verify_compact(token, &key)?;

        let nbf = match payload.get("nbf") {
            None | Some(Value::Null) => None,
            Some(value) => Some(timestamp_claim(value).ok_or_else(|| {
                ValidationError::InvalidClaims("nbf must be a number".to_string())
            })?),
        };
        let claims = Claims::from_payload(payload)?;

        let now = Utc::now().timestamp();
        let skew = self.config.clock_skew;
        validate_exp_at(claims.exp.timestamp(), skew, now)?;
        validate_iat_at(claims.iat.timestamp(), skew, now)?;
        if let Some(nbf) = nbf {
            validate_nbf_at(nbf, skew, now)?;
        }

        if !claims.aud.iter().any(|aud| aud == &self.config.client_id) {
            tracing::debug!(target: "aaa.authn.rp", aud = ?claims.aud, "Token audience mismatch");
            return Err(ValidationError::InvalidAudience);
        }

        if normalize_issuer(&claims.iss) != normalize_issuer(&discovered.document.issuer) {
            tracing::debug!(target: "aaa.authn.rp", iss = %claims.iss, "Token issuer mismatch");
            return Err(ValidationError::InvalidIssuer);
        }

        Ok(claims)
    }

    /// Build the authorization-code redirect URL.
    ///
    /// # Errors
    ///
    /// `Validation(NotDiscovered)` if [`discover`](Self::discover) has not
    /// succeeded yet.
    pub fn build_authorization_url(
        &self,
        state: &str,
        nonce: Option<&str>,
    ) -> Result<String, AaaError> {
        let discovered = self.discovered.get().ok_or(ValidationError::NotDiscovered)?;

        let mut url = Url::parse(&discovered.document.authorization_endpoint)
            .map_err(|e| ValidationError::DiscoveryFailed(format!("authorization_endpoint: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.redirect_url.as_str())
                .append_pair("scope", &self.config.scopes.join(" "))
                .append_pair("state", state);
            if let Some(nonce) = nonce {
                query.append_pair("nonce", nonce);
            }
        }

        Ok(url.into())
    }
}

fn timestamp_claim(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                // Saturating float-to-int conversion
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let secs = f.trunc() as i64;
                    secs
                })
        }),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
