//! SPIFFE peer identity checks.
//!
//! Only the identity comparison lives here. Obtaining the peer's SVID from
//! the Workload API socket is left to the transport layer.

use crate::errors::AaaError;

const SPIFFE_SCHEME: &str = "spiffe://";

/// Check that `id` is a `spiffe://` URI with a non-empty trust domain.
///
/// # Errors
///
/// `AaaError::Configuration` describing the problem.
pub fn validate_spiffe_id(id: &str) -> Result<(), AaaError> {
    if id.trim().is_empty() {
        return Err(AaaError::Configuration("SPIFFE ID must not be empty".to_string()));
    }

    let remainder = id.strip_prefix(SPIFFE_SCHEME).ok_or_else(|| {
        AaaError::Configuration(format!("SPIFFE ID must start with '{SPIFFE_SCHEME}': {id:?}"))
    })?;

    if remainder.is_empty() || remainder.starts_with('/') {
        return Err(AaaError::Configuration(format!(
            "SPIFFE ID must include a trust domain: {id:?}"
        )));
    }

    Ok(())
}

/// Trust domain of a valid SPIFFE ID, `None` otherwise.
#[must_use]
pub fn trust_domain_of(id: &str) -> Option<&str> {
    validate_spiffe_id(id).ok()?;
    id.strip_prefix(SPIFFE_SCHEME)?.split('/').next()
}

/// Workload identity settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiffeConfig {
    trust_domain: String,
    workload_socket: String,
    allowed_ids: Vec<String>,
}

impl SpiffeConfig {
    /// # Errors
    ///
    /// `AaaError::Configuration` if the trust domain or socket is blank, or
    /// any allowed id is not a valid SPIFFE ID.
    pub fn new<I, S>(
        trust_domain: impl Into<String>,
        workload_socket: impl Into<String>,
        allowed_ids: I,
    ) -> Result<Self, AaaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let trust_domain = trust_domain.into();
        let workload_socket = workload_socket.into();
        let allowed_ids: Vec<String> = allowed_ids.into_iter().map(Into::into).collect();

        if trust_domain.trim().is_empty() {
            return Err(AaaError::Configuration("trust_domain must not be empty".to_string()));
        }
        if workload_socket.trim().is_empty() {
            return Err(AaaError::Configuration("workload_socket must not be empty".to_string()));
        }
        for id in &allowed_ids {
            validate_spiffe_id(id)?;
        }

        Ok(Self {
            trust_domain,
            workload_socket,
            allowed_ids,
        })
    }

    #[must_use]
    pub fn trust_domain(&self) -> &str {
        &self.trust_domain
    }

    #[must_use]
    pub fn workload_socket(&self) -> &str {
        &self.workload_socket
    }

    #[must_use]
    pub fn allowed_ids(&self) -> &[String] {
        &self.allowed_ids
    }
}

/// Allow-list matcher for peer SPIFFE IDs.
#[derive(Debug, Clone)]
pub struct SpiffeAuthenticator {
    config: SpiffeConfig,
}

impl SpiffeAuthenticator {
    #[must_use]
    pub fn new(config: SpiffeConfig) -> Self {
        Self { config }
    }

    /// True if `id` is valid and exactly matches an allowed id.
    ///
    /// An empty allow-list denies every peer.
    #[must_use]
    pub fn validate_peer_id(&self, id: &str) -> bool {
        let allowed = validate_spiffe_id(id).is_ok()
            && self.config.allowed_ids.iter().any(|allowed| allowed == id);

        if !allowed {
            tracing::debug!(target: "aaa.authn.spiffe", peer = %id, "Peer SPIFFE ID not allowed");
        }
        allowed
    }

    /// True if `id` belongs to the configured trust domain.
    #[must_use]
    pub fn is_same_trust_domain(&self, id: &str) -> bool {
        trust_domain_of(id) == Some(self.config.trust_domain.as_str())
    }

    #[must_use]
    pub fn config(&self) -> &SpiffeConfig {
        &self.config
    }
}
