//! Integration tests for authorization decisions on validated tokens
//!
//! Scope and role guards run on claims that came through the relying party,
//! and SPIFFE peer checks gate service-to-service calls.

use aaa_core::authn::spiffe::{SpiffeAuthenticator, SpiffeConfig};
use aaa_core::authn::{Claims, Principal};
use aaa_core::authz::{
    require_all_scopes, require_any_scope, require_role, require_scope, RbacEnforcer, Role,
};
use aaa_core::crypto::SigningAlgorithm;
use aaa_core::AaaError;
use aaa_test_utils::*;

async fn validated_claims(principal: &Principal) -> Claims {
    let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
    let tokens = issuer.issue(principal);
    issuer
        .relying_party()
        .validate_token(&tokens.access_token)
        .await
        .expect("token should validate")
}

fn enforcer() -> RbacEnforcer {
    let enforcer = RbacEnforcer::new();
    enforcer
        .register_role(
            Role::new("host", [SCOPE_MEETINGS_READ, SCOPE_MEETINGS_WRITE]).expect("valid role"),
        )
        .expect("register host");
    enforcer
        .register_role(Role::new("operator", [SCOPE_ADMIN_SERVICES]).expect("valid role"))
        .expect("register operator");
    enforcer
}

// ============================================================================
// Scope guards
// ============================================================================

/// Guards pass or fail on the scopes carried in the token
#[tokio::test]
async fn test_scope_guards_on_validated_claims() {
    let claims = validated_claims(
        &Principal::new(TEST_SUBJECT_ALICE, TEST_TENANT_ACME)
            .with_scope([SCOPE_OPENID, SCOPE_MEETINGS_READ]),
    )
    .await;

    assert!(require_scope(&claims, SCOPE_MEETINGS_READ).is_ok());
    assert!(require_any_scope(&claims, &[SCOPE_ADMIN_SERVICES, SCOPE_MEETINGS_READ]).is_ok());
    assert!(require_all_scopes(&claims, &[SCOPE_OPENID, SCOPE_MEETINGS_READ]).is_ok());

    match require_scope(&claims, SCOPE_MEETINGS_WRITE) {
        Err(AaaError::InsufficientScope { required, provided }) => {
            assert_eq!(required, SCOPE_MEETINGS_WRITE);
            assert_eq!(provided, vec![SCOPE_OPENID, SCOPE_MEETINGS_READ]);
        }
        other => panic!("expected InsufficientScope, got {other:?}"),
    }

    match require_all_scopes(
        &claims,
        &[SCOPE_MEETINGS_READ, SCOPE_MEETINGS_WRITE, SCOPE_ADMIN_SERVICES],
    ) {
        Err(AaaError::InsufficientScope { required, .. }) => {
            assert_eq!(required, "meetings:write admin:services");
        }
        other => panic!("expected InsufficientScope, got {other:?}"),
    }
}

/// Role guards and role-derived scopes
#[tokio::test]
async fn test_roles_grant_registered_scopes() {
    let claims = validated_claims(
        &Principal::new(TEST_SUBJECT_BOB, TEST_TENANT_GLOBEX)
            .with_scope([SCOPE_OPENID])
            .with_roles(["host", "unregistered"]),
    )
    .await;
    let enforcer = enforcer();

    assert!(require_role(&claims, "host").is_ok());
    assert!(matches!(
        require_role(&claims, "operator"),
        Err(AaaError::MissingRole(role)) if role == "operator"
    ));

    assert_eq!(
        enforcer.effective_scopes(&claims),
        vec![SCOPE_OPENID, SCOPE_MEETINGS_READ, SCOPE_MEETINGS_WRITE]
    );
    assert!(enforcer.has_all_scopes("host", &[SCOPE_MEETINGS_READ, SCOPE_MEETINGS_WRITE]));
    assert!(!enforcer.has_scope("host", SCOPE_ADMIN_SERVICES));
    assert!(!enforcer.has_any_scope("unregistered", &[SCOPE_OPENID]));
}

/// Role registration is checked
#[test]
fn test_role_registration_errors() {
    let enforcer = enforcer();

    assert!(matches!(
        enforcer.register_role(Role::new("host", [SCOPE_MEETINGS_READ]).unwrap()),
        Err(AaaError::Configuration(_))
    ));
    assert!(matches!(
        Role::new("broken", ["no-colon"]),
        Err(AaaError::Configuration(_))
    ));
    assert!(matches!(
        enforcer.role_scopes("ghost"),
        Err(AaaError::Configuration(_))
    ));
}

// ============================================================================
// SPIFFE
// ============================================================================

/// Only exact allow-listed peers in the trust domain are accepted
#[test]
fn test_spiffe_peer_allow_list() {
    let config = SpiffeConfig::new(
        "example.org",
        "unix:///run/spire/sockets/agent.sock",
        [
            "spiffe://example.org/ns/prod/sa/billing",
            "spiffe://example.org/ns/prod/sa/portal",
        ],
    )
    .unwrap();
    let authenticator = SpiffeAuthenticator::new(config);

    assert!(authenticator.validate_peer_id("spiffe://example.org/ns/prod/sa/billing"));
    assert!(!authenticator.validate_peer_id("spiffe://example.org/ns/prod/sa/billing/extra"));
    assert!(!authenticator.validate_peer_id("spiffe://example.org/ns/dev/sa/billing"));
    assert!(!authenticator.validate_peer_id("https://example.org/ns/prod/sa/billing"));

    assert!(authenticator.is_same_trust_domain("spiffe://example.org/anything"));
    assert!(!authenticator.is_same_trust_domain("spiffe://evil.org/ns/prod/sa/billing"));
}

/// An invalid allow-list entry is a configuration error
#[test]
fn test_spiffe_config_rejects_invalid_ids() {
    let result = SpiffeConfig::new("example.org", "unix:///tmp/agent.sock", ["example.org/sa"]);

    assert!(matches!(result, Err(AaaError::Configuration(_))));
}
