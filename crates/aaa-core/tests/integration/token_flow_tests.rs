//! Integration tests for token issuance and validation
//!
//! Tokens are minted by a real provider served over HTTP by `MockIssuer` and
//! validated by a relying party that discovers the issuer and fetches its
//! JWKS, the same path a deployed client takes.

use aaa_core::authn::{OidcProvider, Principal, ProviderConfig};
use aaa_core::crypto::{KeyStore, SigningAlgorithm, SUPPORTED_ALGORITHMS};
use aaa_core::{AaaError, ValidationError};
use aaa_test_utils::*;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

fn alice() -> Principal {
    Principal::new(TEST_SUBJECT_ALICE, TEST_TENANT_ACME)
        .with_scope([SCOPE_OPENID, SCOPE_MEETINGS_READ])
        .with_roles(["admin"])
        .with_teams(["platform"])
}

fn rejection(result: Result<aaa_core::authn::Claims, AaaError>) -> ValidationError {
    match result {
        Err(AaaError::Validation(reason)) => reason,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

// ============================================================================
// Round trip
// ============================================================================

/// Every supported algorithm issues tokens its relying party accepts
#[tokio::test]
async fn test_issue_and_validate_round_trip_per_algorithm() -> Result<(), anyhow::Error> {
    for algorithm in SUPPORTED_ALGORITHMS {
        // Arrange
        let issuer = MockIssuer::start(algorithm).await;
        let rp = issuer.relying_party();

        // Act
        let tokens = issuer.issue(&alice());
        let claims = rp.validate_token(&tokens.access_token).await?;

        // Assert
        assert_eq!(claims.sub, TEST_SUBJECT_ALICE, "{algorithm}");
        assert_eq!(claims.tenant, TEST_TENANT_ACME, "{algorithm}");
        assert_eq!(claims.iss, issuer.issuer(), "{algorithm}");
        assert_eq!(claims.aud, vec![TEST_CLIENT_ID.to_string()], "{algorithm}");
        assert!(claims.has_scope(SCOPE_MEETINGS_READ), "{algorithm}");
        assert!(claims.has_role("admin"), "{algorithm}");
        assert_eq!(claims.teams, vec!["platform".to_string()], "{algorithm}");

        let id_claims = rp.validate_token(&tokens.id_token).await?;
        assert_eq!(id_claims.sub, TEST_SUBJECT_ALICE, "{algorithm}");
    }

    Ok(())
}

/// Issued tokens carry the active kid, the configured lifetime and a
/// token_use marker
#[tokio::test]
async fn test_token_set_shape() -> Result<(), anyhow::Error> {
    // Arrange
    let store = memory_store(SigningAlgorithm::ES256);
    let kid = store.signing_key().kid().to_string();
    let config = ProviderConfig::builder("https://idp.example.com", [TEST_CLIENT_ID])
        .algorithm("ES256")
        .token_ttl(Duration::from_secs(900))
        .build()?;
    let provider = OidcProvider::new(config, store)?;

    // Act
    let tokens = provider.issue_token_set(&alice())?;

    // Assert
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, 900);
    assert_eq!(tokens.refresh_token.len(), 64, "48 random bytes, base64url");

    tokens
        .access_token
        .assert_valid_jwt("ES256")
        .assert_signed_by(&kid)
        .assert_for_subject(TEST_SUBJECT_ALICE)
        .assert_has_audience(TEST_CLIENT_ID)
        .assert_has_scope(SCOPE_MEETINGS_READ)
        .assert_expires_in(900)
        .assert_token_use("access");

    tokens
        .id_token
        .assert_valid_jwt("ES256")
        .assert_signed_by(&kid)
        .assert_token_use("id");

    Ok(())
}

/// Two issuances never share a refresh token
#[tokio::test]
async fn test_refresh_tokens_are_unique() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;

    let first = issuer.issue(&alice());
    let second = issuer.issue(&alice());

    assert_ne!(first.refresh_token, second.refresh_token);
}

/// A principal with an empty subject is refused before anything is signed
#[tokio::test]
async fn test_invalid_principal_not_issued() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;

    let result = issuer
        .provider()
        .issue_token_set(&Principal::new("", TEST_TENANT_ACME));

    assert!(matches!(
        result,
        Err(AaaError::Validation(ValidationError::InvalidClaims(_)))
    ));
}

// ============================================================================
// Rejections
// ============================================================================

/// A token minted for another client is rejected
#[tokio::test]
async fn test_wrong_audience_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let tokens = issuer.issue(&alice());

    let other_rp = issuer.relying_party_for(TEST_OTHER_CLIENT_ID);
    let reason = rejection(other_rp.validate_token(&tokens.access_token).await);

    assert_eq!(reason, ValidationError::InvalidAudience);
}

/// A token signed with the issuer's key but naming another issuer is rejected
#[tokio::test]
async fn test_wrong_issuer_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = TestTokenBuilder::new()
        .for_user(TEST_SUBJECT_ALICE)
        .in_tenant(TEST_TENANT_ACME)
        .issued_by("https://evil.example.com")
        .for_audience(&[TEST_CLIENT_ID])
        .sign_with(&issuer.key_store().signing_key());

    let reason = rejection(issuer.relying_party().validate_token(&token).await);

    assert_eq!(reason, ValidationError::InvalidIssuer);
}

/// A trailing slash on the token's issuer is not a mismatch
#[tokio::test]
async fn test_issuer_trailing_slash_accepted() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = TestTokenBuilder::new()
        .for_user(TEST_SUBJECT_ALICE)
        .in_tenant(TEST_TENANT_ACME)
        .issued_by(&format!("{}/", issuer.issuer()))
        .for_audience(&[TEST_CLIENT_ID])
        .sign_with(&issuer.key_store().signing_key());

    let claims = issuer.relying_party().validate_token(&token).await?;

    assert_eq!(claims.sub, TEST_SUBJECT_ALICE);
    Ok(())
}

/// Expired tokens are rejected
#[tokio::test]
async fn test_expired_token_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = TestTokenBuilder::new()
        .for_user(TEST_SUBJECT_ALICE)
        .in_tenant(TEST_TENANT_ACME)
        .issued_by(&issuer.issuer())
        .for_audience(&[TEST_CLIENT_ID])
        .issued_at(Utc::now().timestamp() - 7200)
        .expires_in(-3600)
        .sign_with(&issuer.key_store().signing_key());

    let reason = rejection(issuer.relying_party().validate_token(&token).await);

    assert_eq!(reason, ValidationError::Expired);
}

/// Changing the payload of a signed token breaks the signature
#[tokio::test]
async fn test_tampered_token_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let tokens = issuer.issue(&alice());

    let forged_claims = TestTokenBuilder::new()
        .for_user(TEST_SUBJECT_BOB)
        .in_tenant(TEST_TENANT_ACME)
        .issued_by(&issuer.issuer())
        .for_audience(&[TEST_CLIENT_ID])
        .with_roles(&["admin"])
        .build();
    let tampered = tamper_payload(&tokens.access_token, &forged_claims);

    let reason = rejection(issuer.relying_party().validate_token(&tampered).await);

    assert_eq!(reason, ValidationError::InvalidSignature);
}

/// `none`, symmetric algorithms, and algorithms outside the relying party's
/// allow-list are refused before any key lookup
#[tokio::test]
async fn test_disallowed_algorithms_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();
    let kid = issuer.key_store().signing_key().kid().to_string();

    for alg in ["none", "HS256", "RS256", "EdDSA"] {
        let token = TestTokenBuilder::new()
            .for_user(TEST_SUBJECT_ALICE)
            .in_tenant(TEST_TENANT_ACME)
            .issued_by(&issuer.issuer())
            .for_audience(&[TEST_CLIENT_ID])
            .forge(alg, Some(&kid));

        let reason = rejection(rp.validate_token(&token).await);
        assert_eq!(reason, ValidationError::DisallowedAlgorithm, "alg {alg}");
    }

    assert_eq!(
        issuer.request_count(JWKS_PATH).await,
        0,
        "no keys should be fetched for refused algorithms"
    );
}

/// Tokens without a kid, or with a kid the issuer never published, are rejected
#[tokio::test]
async fn test_missing_and_unknown_kid_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();
    let builder = || {
        TestTokenBuilder::new()
            .for_user(TEST_SUBJECT_ALICE)
            .in_tenant(TEST_TENANT_ACME)
            .issued_by(&issuer.issuer())
            .for_audience(&[TEST_CLIENT_ID])
    };

    let missing = rejection(rp.validate_token(&builder().forge("ES256", None)).await);
    assert_eq!(missing, ValidationError::MissingKid);

    let unknown = rejection(
        rp.validate_token(&builder().forge("ES256", Some("never-published")))
            .await,
    );
    assert_eq!(unknown, ValidationError::UnknownKey);
}

/// Oversized tokens are rejected without touching the network
#[tokio::test]
async fn test_oversized_token_rejected_before_discovery() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let huge = "a".repeat(common::jwt::MAX_JWT_SIZE_BYTES + 1);

    let reason = rejection(issuer.relying_party().validate_token(&huge).await);

    assert_eq!(reason, ValidationError::TokenTooLarge);
    assert_eq!(issuer.request_count(DISCOVERY_PATH).await, 0);
}

/// Strictly-typed claims: a numeric subject is not coerced
#[tokio::test]
async fn test_wrongly_typed_claims_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let token = TestTokenBuilder::new()
        .in_tenant(TEST_TENANT_ACME)
        .issued_by(&issuer.issuer())
        .for_audience(&[TEST_CLIENT_ID])
        .with_claim("sub", json!(42))
        .sign_with(&issuer.key_store().signing_key());

    let reason = rejection(issuer.relying_party().validate_token(&token).await);

    assert!(matches!(reason, ValidationError::InvalidClaims(_)));
}

/// Garbage input is malformed, not a panic
#[tokio::test]
async fn test_garbage_token_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();

    for garbage in ["", "not-a-jwt", "a.b", "a.b.c.d", "!!!.???.###"] {
        let reason = rejection(rp.validate_token(garbage).await);
        assert_eq!(reason, ValidationError::MalformedToken, "input {garbage:?}");
    }
}
