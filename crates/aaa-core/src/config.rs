use crate::authn::provider::ProviderConfig;
use crate::crypto::{FileKeyStore, KeyStore, MemoryKeyStore, SigningAlgorithm};
use crate::errors::AaaError;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default token lifetime in seconds (1 hour).
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;

/// Minimum token lifetime in seconds.
pub const MIN_TOKEN_TTL_SECONDS: u64 = 60;

/// Maximum token lifetime in seconds (24 hours).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 86_400;

/// Process configuration for hosts embedding the toolkit.
#[derive(Debug, Clone)]
pub struct Config {
    pub issuer: String,
    pub audiences: Vec<String>,
    pub signing_algorithm: SigningAlgorithm,
    pub token_ttl: Duration,
    /// File-backed key store when set, in-memory otherwise.
    pub key_store_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = required(vars, "AAA_ISSUER")?;

        let audiences: Vec<String> = required(vars, "AAA_AUDIENCES")?
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(ToString::to_string)
            .collect();
        if audiences.is_empty() {
            return Err(invalid("AAA_AUDIENCES", "must list at least one audience"));
        }

        let signing_algorithm = match vars.get("AAA_SIGNING_ALGORITHM") {
            Some(value) => SigningAlgorithm::parse(value)
                .map_err(|e| invalid("AAA_SIGNING_ALGORITHM", &e.to_string()))?,
            None => SigningAlgorithm::RS256,
        };

        let token_ttl_seconds = match vars.get("AAA_TOKEN_TTL_SECONDS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|e| invalid("AAA_TOKEN_TTL_SECONDS", &e.to_string()))?,
            None => DEFAULT_TOKEN_TTL_SECONDS,
        };
        if !(MIN_TOKEN_TTL_SECONDS..=MAX_TOKEN_TTL_SECONDS).contains(&token_ttl_seconds) {
            return Err(invalid(
                "AAA_TOKEN_TTL_SECONDS",
                &format!("must be between {MIN_TOKEN_TTL_SECONDS} and {MAX_TOKEN_TTL_SECONDS}"),
            ));
        }

        let key_store_path = vars
            .get("AAA_KEY_STORE_PATH")
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Config {
            issuer,
            audiences,
            signing_algorithm,
            token_ttl: Duration::from_secs(token_ttl_seconds),
            key_store_path,
        })
    }

    /// Validated provider configuration.
    ///
    /// # Errors
    ///
    /// `AaaError::Configuration` if the issuer is not an acceptable URL.
    pub fn provider_config(&self) -> Result<ProviderConfig, AaaError> {
        ProviderConfig::builder(&self.issuer, self.audiences.clone())
            .algorithm(self.signing_algorithm.as_str())
            .token_ttl(self.token_ttl)
            .build()
    }

    /// Open the configured key store.
    ///
    /// # Errors
    ///
    /// Key generation or key file errors.
    pub fn open_key_store(&self) -> Result<Arc<dyn KeyStore>, AaaError> {
        Ok(match &self.key_store_path {
            Some(path) => Arc::new(FileKeyStore::open(path, self.signing_algorithm)?),
            None => Arc::new(MemoryKeyStore::new(self.signing_algorithm)?),
        })
    }
}

fn required(vars: &HashMap<String, String>, var: &str) -> Result<String, ConfigError> {
    vars.get(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
}

fn invalid(var: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}
