//! Integration tests for signing key rotation
//!
//! Covers the retention bound, overlap for in-flight tokens, relying-party
//! pickup of new keys, and persistence across restarts.

use aaa_core::authn::Principal;
use aaa_core::crypto::jws::verify_compact;
use aaa_core::crypto::{FileKeyStore, KeyStore, SigningAlgorithm, MAX_KEYS};
use aaa_core::{AaaError, ValidationError};
use aaa_test_utils::*;
use std::sync::Arc;

fn alice() -> Principal {
    Principal::new(TEST_SUBJECT_ALICE, TEST_TENANT_ACME)
}

// ============================================================================
// Retention
// ============================================================================

/// The JWKS never publishes more than MAX_KEYS keys, newest included
#[test]
fn test_rotation_retains_at_most_max_keys() -> Result<(), anyhow::Error> {
    let store = memory_store(SigningAlgorithm::ES256);
    assert_eq!(store.jwks()?.keys.len(), 1);

    let mut kids = vec![store.signing_key().kid().to_string()];
    for expected_len in [2, 3, 3, 3] {
        let kid = store.rotate_key()?;
        kids.push(kid.clone());

        let jwks = store.jwks()?;
        assert_eq!(jwks.keys.len(), expected_len);
        assert!(jwks.find(&kid).is_some(), "new key must be published");
        assert_eq!(store.signing_key().kid(), kid, "new key must be active");
    }

    // Only the newest MAX_KEYS kids remain
    let jwks = store.jwks()?;
    let (evicted, retained) = kids.split_at(kids.len() - MAX_KEYS);
    for kid in retained {
        assert!(jwks.find(kid).is_some(), "{kid} should be retained");
    }
    for kid in evicted {
        assert!(jwks.find(kid).is_none(), "{kid} should be evicted");
    }

    Ok(())
}

// ============================================================================
// Overlap
// ============================================================================

/// Tokens signed before a rotation keep validating while their key is retained
#[tokio::test]
async fn test_tokens_survive_rotation() -> Result<(), anyhow::Error> {
    // Arrange
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let old_kid = issuer.key_store().signing_key().kid().to_string();
    let before = issuer.issue(&alice());

    // Act
    let new_kid = issuer.rotate();
    let after = issuer.issue(&alice());

    // Assert
    before.access_token.assert_signed_by(&old_kid);
    after.access_token.assert_signed_by(&new_kid);

    let rp = issuer.relying_party();
    rp.validate_token(&before.access_token).await?;
    rp.validate_token(&after.access_token).await?;

    Ok(())
}

/// A relying party with a cached JWKS picks up a new kid with one refetch
#[tokio::test]
async fn test_relying_party_picks_up_rotated_key() -> Result<(), anyhow::Error> {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let rp = issuer.relying_party();

    rp.validate_token(&issuer.issue(&alice()).access_token).await?;
    rp.validate_token(&issuer.issue(&alice()).access_token).await?;
    assert_eq!(
        issuer.request_count(JWKS_PATH).await,
        1,
        "second validation should hit the JWKS cache"
    );

    issuer.rotate();
    rp.validate_token(&issuer.issue(&alice()).access_token).await?;
    assert_eq!(
        issuer.request_count(JWKS_PATH).await,
        2,
        "unknown kid should trigger exactly one refetch"
    );
    assert_eq!(issuer.request_count(DISCOVERY_PATH).await, 1);

    Ok(())
}

/// Once a key is evicted, tokens it signed no longer validate
#[tokio::test]
async fn test_evicted_key_tokens_rejected() {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let stale = issuer.issue(&alice());

    for _ in 0..MAX_KEYS {
        issuer.rotate();
    }

    // Fresh relying party: no cached copy of the evicted key
    let result = issuer.relying_party().validate_token(&stale.access_token).await;

    assert!(matches!(
        result,
        Err(AaaError::Validation(ValidationError::UnknownKey))
    ));
}

// ============================================================================
// Persistence
// ============================================================================

/// Reopening a file-backed store restores the same keys and active kid
#[test]
fn test_file_store_round_trip() -> Result<(), anyhow::Error> {
    let (dir, store) = temp_file_store(SigningAlgorithm::ES256);
    store.rotate_key()?;
    let active = store.signing_key();
    let jwks = store.jwks()?;

    let token = TestTokenBuilder::new().sign_with(&active);
    drop(store);

    let reopened = FileKeyStore::open(dir.path().join("keys.json"), SigningAlgorithm::ES256)?;

    assert_eq!(reopened.signing_key().kid(), active.kid());
    assert_eq!(reopened.jwks()?, jwks);

    let payload = verify_compact(&token, &reopened.signing_key().verification_key()?)?;
    assert_eq!(payload["sub"], "test-subject");

    Ok(())
}

/// A store file written for one algorithm cannot be opened for another
#[test]
fn test_file_store_algorithm_mismatch_rejected() {
    let (dir, store) = temp_file_store(SigningAlgorithm::ES256);
    drop(store);

    let result = FileKeyStore::open(dir.path().join("keys.json"), SigningAlgorithm::ES384);

    assert!(matches!(result, Err(AaaError::KeyStore(_))));
}

/// A corrupt store file is an error, not a silent reset
#[test]
fn test_file_store_corrupt_file_rejected() -> Result<(), anyhow::Error> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("keys.json");
    std::fs::write(&path, b"{not json")?;

    let result = FileKeyStore::open(&path, SigningAlgorithm::ES256);

    assert!(matches!(result, Err(AaaError::KeyStore(_))));
    assert_eq!(std::fs::read(&path)?, b"{not json", "file must be left untouched");
    Ok(())
}

/// Private key material is written owner-only
#[cfg(unix)]
#[test]
fn test_file_store_permissions() -> Result<(), anyhow::Error> {
    use std::os::unix::fs::PermissionsExt;

    let (dir, store) = temp_file_store(SigningAlgorithm::ES256);
    store.rotate_key()?;

    let mode = std::fs::metadata(dir.path().join("keys.json"))?
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
    Ok(())
}

/// Tokens signed before a restart validate against the reopened store's JWKS
#[tokio::test]
async fn test_persisted_keys_serve_relying_parties() -> Result<(), anyhow::Error> {
    // Arrange: remember the active key, then drop the store like a restart
    let (dir, store) = temp_file_store(SigningAlgorithm::ES256);
    let path = dir.path().join("keys.json");
    let before_restart = store.signing_key();
    drop(store);

    let reopened = FileKeyStore::open(&path, SigningAlgorithm::ES256)?;
    let issuer = MockIssuer::start_with_store(Arc::new(reopened)).await;

    // Act: a token signed with the pre-restart key, naming the new issuer
    let token = TestTokenBuilder::new()
        .for_user(TEST_SUBJECT_ALICE)
        .in_tenant(TEST_TENANT_ACME)
        .issued_by(&issuer.issuer())
        .for_audience(&[TEST_CLIENT_ID])
        .sign_with(&before_restart);
    let claims = issuer.relying_party().validate_token(&token).await?;

    // Assert
    assert_eq!(claims.sub, TEST_SUBJECT_ALICE);
    assert_eq!(claims.tenant, TEST_TENANT_ACME);
    assert_eq!(issuer.key_store().signing_key().kid(), before_restart.kid());
    Ok(())
}
