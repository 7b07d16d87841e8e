//! Input hardening shared by the provider, relying party and audit sinks.

use crate::errors::AaaError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Parse `value` as an absolute URL that is safe to use as an endpoint.
///
/// HTTPS is required, except for local development hosts: `localhost`,
/// `*.localhost`, `127.0.0.1` and `::1` may use plain HTTP.
///
/// # Errors
///
/// Returns `AaaError::Configuration` naming `field` if the URL is malformed,
/// has no host, or uses HTTP for a non-local host.
pub fn validate_https_url(value: &str, field: &str) -> Result<Url, AaaError> {
    let url = Url::parse(value.trim())
        .map_err(|e| AaaError::Configuration(format!("{field} is not a valid URL: {e}")))?;

    let host = url
        .host()
        .ok_or_else(|| AaaError::Configuration(format!("{field} must include a host")))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_local_host(&host) => Ok(url),
        "http" => Err(AaaError::Configuration(format!(
            "{field} must use HTTPS for non-localhost hosts"
        ))),
        other => Err(AaaError::Configuration(format!(
            "{field} has unsupported scheme '{other}'"
        ))),
    }
}

fn is_local_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(addr) => *addr == Ipv4Addr::LOCALHOST,
        Host::Ipv6(addr) => *addr == Ipv6Addr::LOCALHOST,
    }
}

/// Trim trailing slashes so `https://idp/` and `https://idp` compare equal.
#[must_use]
pub fn normalize_issuer(issuer: &str) -> &str {
    issuer.trim().trim_end_matches('/')
}
