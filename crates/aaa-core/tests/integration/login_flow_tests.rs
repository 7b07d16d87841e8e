//! Integration tests for the browser login flow
//!
//! Discovery, authorization URL construction and CSRF state, against a live
//! issuer and against misbehaving discovery endpoints.

use aaa_core::authn::state::{generate_state, validate_state};
use aaa_core::authn::{OidcRelyingParty, RelyingPartyConfig};
use aaa_core::crypto::SigningAlgorithm;
use aaa_core::{AaaError, ValidationError};
use aaa_test_utils::*;
use serde_json::json;
use std::collections::HashMap;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn relying_party_for(issuer: &str) -> OidcRelyingParty {
    let config = RelyingPartyConfig::builder(issuer, TEST_CLIENT_ID, TEST_REDIRECT_URL)
        .scopes([SCOPE_OPENID, "profile", "email"])
        .build()
        .expect("valid relying party config");
    OidcRelyingParty::new(config)
}

// ============================================================================
// Discovery
// ============================================================================

/// Discovery against a real provider yields the provider's endpoints
#[tokio::test]
async fn test_discovery_against_provider() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();

    let document = rp.discover().await?;

    assert_eq!(document.issuer, issuer.issuer());
    assert_eq!(
        document.jwks_uri,
        format!("{}/.well-known/jwks.json", issuer.issuer())
    );
    assert_eq!(
        document.authorization_endpoint,
        format!("{}/oauth2/authorize", issuer.issuer())
    );
    assert_eq!(document.id_token_signing_alg_values_supported, vec!["ES256"]);
    assert_eq!(
        document.userinfo_endpoint.as_deref(),
        Some(format!("{}/oauth2/userinfo", issuer.issuer()).as_str())
    );

    // Cached
    rp.discover().await?;
    assert_eq!(issuer.request_count(DISCOVERY_PATH).await, 1);

    Ok(())
}

/// Every missing required field is named in the error
#[tokio::test]
async fn test_discovery_missing_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
        })))
        .mount(&server)
        .await;

    let rp = relying_party_for(&server.uri());
    let result = rp.discover().await;

    match result {
        Err(AaaError::Validation(ValidationError::MissingDiscoveryFields(fields))) => {
            assert_eq!(fields, vec!["jwks_uri", "token_endpoint"]);
        }
        other => panic!("expected MissingDiscoveryFields, got {other:?}"),
    }
}

/// Non-2xx discovery responses fail validation with a discovery error
#[tokio::test]
async fn test_discovery_server_error_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = relying_party_for(&server.uri())
        .validate_token(&TestTokenBuilder::new().forge("RS256", Some("kid-1")))
        .await;

    assert!(matches!(
        result,
        Err(AaaError::Validation(ValidationError::DiscoveryFailed(_)))
    ));
}

/// A JWKS endpoint that is down makes every token unverifiable
#[tokio::test]
async fn test_jwks_unavailable_fails_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "jwks_uri": format!("{}{}", server.uri(), JWKS_PATH),
            "authorization_endpoint": format!("{}/authorize", server.uri()),
            "token_endpoint": format!("{}/token", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = relying_party_for(&server.uri())
        .validate_token(&TestTokenBuilder::new().forge("RS256", Some("kid-1")))
        .await;

    assert!(matches!(
        result,
        Err(AaaError::Validation(ValidationError::KeySetUnavailable(_)))
    ));
}

// ============================================================================
// Authorization URL and state
// ============================================================================

/// Full login redirect: state generated, URL built, callback state checked
#[tokio::test]
async fn test_authorization_redirect_round_trip() -> Result<(), anyhow::Error> {
    // Arrange
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = relying_party_for(&issuer.issuer());
    rp.discover().await?;

    // Act
    let state = generate_state()?;
    let nonce = generate_state()?;
    let redirect = Url::parse(&rp.build_authorization_url(&state, Some(&nonce))?)?;

    // Assert
    assert_eq!(
        redirect.as_str().split('?').next(),
        Some(format!("{}/oauth2/authorize", issuer.issuer()).as_str())
    );

    let query: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["client_id"], TEST_CLIENT_ID);
    assert_eq!(query["redirect_uri"], TEST_REDIRECT_URL);
    assert_eq!(query["scope"], "openid profile email");
    assert_eq!(query["nonce"], nonce);

    // Callback: the state echoed back must match, anything else must not
    assert!(validate_state(&state, &query["state"]));
    assert!(!validate_state(&state, &generate_state()?));
    assert!(!validate_state(&state, ""));

    Ok(())
}

/// The redirect cannot be built before the issuer is known
#[tokio::test]
async fn test_authorization_url_requires_discovery() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();

    let result = rp.build_authorization_url("state", None);

    assert!(matches!(
        result,
        Err(AaaError::Validation(ValidationError::NotDiscovered))
    ));
}

/// Validating a token also completes discovery, enabling the redirect
#[tokio::test]
async fn test_validation_discovers_issuer() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();
    let tokens = issuer.issue(&aaa_core::authn::Principal::new(
        TEST_SUBJECT_ALICE,
        TEST_TENANT_ACME,
    ));

    rp.validate_token(&tokens.access_token).await?;
    let url = rp.build_authorization_url("abc", None)?;

    assert!(url.contains("state=abc"));
    assert!(!url.contains("nonce="));
    Ok(())
}
