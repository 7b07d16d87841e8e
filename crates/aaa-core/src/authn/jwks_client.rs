//! JWKS client for fetching and caching an issuer's public keys.
//!
//! Keys are cached for a TTL (5 minutes by default). A `kid` missing from a
//! fresh cache triggers exactly one refetch so keys rotated in at the issuer
//! are picked up without waiting for expiry.

use crate::crypto::{Jwk, Jwks};
use crate::errors::ValidationError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;
use url::Url;

/// Default cache TTL (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL: Duration = Duration::from_secs(300);

/// Longest JWKS cache lifetime a relying party may configure.
pub const MAX_JWKS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct CachedJwks {
    keys: HashMap<String, Jwk>,
    expires_at: Instant,
}

/// Caching JWKS fetcher.
pub struct JwksClient {
    jwks_url: Url,
    http_client: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    cache_ttl: Duration,
}

impl JwksClient {
    /// Create a client for `jwks_url` that shares `http_client`.
    #[must_use]
    pub fn new(jwks_url: Url, http_client: reqwest::Client, cache_ttl: Duration) -> Self {
        Self {
            jwks_url,
            http_client,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl,
        }
    }

    #[must_use]
    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }

    /// Get the JWK for `kid`.
    ///
    /// # Errors
    ///
    /// - `KeySetUnavailable` if the JWKS cannot be fetched or parsed
    /// - `UnknownKey` if `kid` is absent even after a refetch
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, ValidationError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "aaa.authn.rp", kid = %kid, "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    tracing::debug!(target: "aaa.authn.rp", kid = %kid, "Key not in cached JWKS, refetching");
                }
            }
        }

        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|cached| cached.keys.get(kid)) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "aaa.authn.rp", kid = %kid, "Key not found in JWKS after refresh");
        Err(ValidationError::UnknownKey)
    }

    #[instrument(skip(self))]
    async fn refresh_cache(&self) -> Result<(), ValidationError> {
        tracing::debug!(target: "aaa.authn.rp", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "aaa.authn.rp", error = %e, "Failed to fetch JWKS");
                ValidationError::KeySetUnavailable("request failed".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "aaa.authn.rp",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(ValidationError::KeySetUnavailable(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let jwks: Jwks = response.json().await.map_err(|e| {
            tracing::error!(target: "aaa.authn.rp", error = %e, "Failed to parse JWKS response");
            ValidationError::KeySetUnavailable("response is not a JWKS document".to_string())
        })?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .filter(|key| !key.kid.is_empty())
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "aaa.authn.rp",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            expires_at: Instant::now() + self.cache_ttl.min(MAX_JWKS_CACHE_TTL),
        });

        Ok(())
    }

    /// Drop cached keys and refetch.
    ///
    /// # Errors
    ///
    /// `KeySetUnavailable` if the fetch fails.
    pub async fn force_refresh(&self) -> Result<(), ValidationError> {
        self.refresh_cache().await
    }
}
