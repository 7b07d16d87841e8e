//! Integration tests for clock skew tolerance on time claims
//!
//! The relying party tolerates `clock_skew` seconds of disagreement on
//! `exp`, `iat` and `nbf`; these tests pin the boundaries end to end.

use aaa_core::authn::{Claims, OidcRelyingParty, RelyingPartyConfig};
use aaa_core::crypto::SigningAlgorithm;
use aaa_core::{AaaError, ValidationError};
use aaa_test_utils::*;
use chrono::Utc;
use std::time::Duration;

fn token_for(issuer: &MockIssuer) -> TestTokenBuilder {
    TestTokenBuilder::new()
        .for_user(TEST_SUBJECT_ALICE)
        .in_tenant(TEST_TENANT_ACME)
        .issued_by(&issuer.issuer())
        .for_audience(&[TEST_CLIENT_ID])
}

fn relying_party_with_skew(issuer: &MockIssuer, skew: Duration) -> OidcRelyingParty {
    let config = RelyingPartyConfig::builder(issuer.issuer(), TEST_CLIENT_ID, TEST_REDIRECT_URL)
        .algorithms(["ES256"])
        .clock_skew(skew)
        .build()
        .expect("valid relying party config");
    OidcRelyingParty::new(config)
}

fn reason(result: Result<Claims, AaaError>) -> ValidationError {
    match result {
        Err(AaaError::Validation(reason)) => reason,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

// ============================================================================
// Default skew (30 seconds)
// ============================================================================

/// A token issued a few seconds "in the future" by a fast issuer clock passes
#[tokio::test]
async fn test_iat_within_default_skew_accepted() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = token_for(&issuer)
        .issued_at(Utc::now().timestamp() + 10)
        .sign_with(&issuer.key_store().signing_key());

    issuer.relying_party().validate_token(&token).await?;
    Ok(())
}

/// An iat far beyond the skew is rejected
#[tokio::test]
async fn test_iat_beyond_default_skew_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = token_for(&issuer)
        .issued_at(Utc::now().timestamp() + 600)
        .sign_with(&issuer.key_store().signing_key());

    let reason = reason(issuer.relying_party().validate_token(&token).await);

    assert_eq!(reason, ValidationError::IatTooFarInFuture);
}

/// A token that expired moments ago is still inside the grace window
#[tokio::test]
async fn test_recently_expired_within_skew_accepted() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = token_for(&issuer)
        .issued_at(Utc::now().timestamp() - 600)
        .expires_in(-5)
        .sign_with(&issuer.key_store().signing_key());

    issuer.relying_party().validate_token(&token).await?;
    Ok(())
}

/// nbf in the near future passes; nbf well in the future does not
#[tokio::test]
async fn test_nbf_respects_skew() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();
    let key = issuer.key_store().signing_key();

    let near = token_for(&issuer).not_before_in(10).sign_with(&key);
    rp.validate_token(&near).await?;

    let far = token_for(&issuer).not_before_in(3600).sign_with(&key);
    assert_eq!(
        reason(rp.validate_token(&far).await),
        ValidationError::NotYetValid
    );

    Ok(())
}

// ============================================================================
// Custom skew
// ============================================================================

/// A wider configured skew widens the accepted window
#[tokio::test]
async fn test_custom_skew_accepts_within_tolerance() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = token_for(&issuer)
        .issued_at(Utc::now().timestamp() + 90)
        .sign_with(&issuer.key_store().signing_key());

    // Rejected at the default 30s
    assert_eq!(
        reason(issuer.relying_party().validate_token(&token).await),
        ValidationError::IatTooFarInFuture
    );

    // Accepted at 120s
    let lenient = relying_party_with_skew(&issuer, Duration::from_secs(120));
    lenient.validate_token(&token).await?;

    Ok(())
}

/// Zero skew still accepts a freshly issued token
#[tokio::test]
async fn test_zero_skew_accepts_fresh_token() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let strict = relying_party_with_skew(&issuer, Duration::ZERO);
    let tokens = issuer.issue(&aaa_core::authn::Principal::new(
        TEST_SUBJECT_ALICE,
        TEST_TENANT_ACME,
    ));

    strict.validate_token(&tokens.access_token).await?;
    Ok(())
}

/// Skews above the hard maximum are refused at configuration time
#[test]
fn test_skew_above_maximum_rejected() {
    let result = RelyingPartyConfig::builder(
        "https://idp.example.com",
        TEST_CLIENT_ID,
        TEST_REDIRECT_URL,
    )
    .clock_skew(common::jwt::MAX_CLOCK_SKEW + Duration::from_secs(1))
    .build();

    assert!(matches!(result, Err(AaaError::Configuration(_))));
}
