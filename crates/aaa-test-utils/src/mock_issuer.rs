//! In-process OIDC issuer for relying-party tests.
//!
//! Serves the real [`OidcProvider`]'s discovery document and JWKS from a
//! wiremock server, so relying parties exercise discovery, key fetch and
//! rotation over HTTP.

use crate::test_ids::{TEST_CLIENT_ID, TEST_REDIRECT_URL};
use aaa_core::authn::{OidcProvider, OidcRelyingParty, Principal, ProviderConfig, RelyingPartyConfig, TokenSet};
use aaa_core::crypto::{KeyStore, MemoryKeyStore, SigningAlgorithm};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Renders the key store's current JWKS on every request, so rotations are
/// visible to clients immediately.
struct JwksResponder {
    key_store: Arc<dyn KeyStore>,
}

impl Respond for JwksResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        match self.key_store.jwks() {
            Ok(jwks) => ResponseTemplate::new(200).set_body_json(jwks),
            Err(_) => ResponseTemplate::new(500),
        }
    }
}

/// OIDC issuer backed by a wiremock server.
///
/// Tokens are minted for [`TEST_CLIENT_ID`].
pub struct MockIssuer {
    server: MockServer,
    provider: OidcProvider,
    key_store: Arc<dyn KeyStore>,
}

impl MockIssuer {
    /// Start an issuer with a fresh in-memory key store
    pub async fn start(algorithm: SigningAlgorithm) -> Self {
        let key_store: Arc<dyn KeyStore> =
            Arc::new(MemoryKeyStore::new(algorithm).expect("Failed to create key store"));
        Self::start_with_store(key_store).await
    }

    /// Start an issuer signing with `key_store`
    pub async fn start_with_store(key_store: Arc<dyn KeyStore>) -> Self {
        let server = MockServer::start().await;

        let config = ProviderConfig::builder(server.uri(), [TEST_CLIENT_ID])
            .algorithm(key_store.algorithm().as_str())
            .build()
            .expect("Failed to build provider config");
        let provider =
            OidcProvider::new(config, Arc::clone(&key_store)).expect("Failed to create provider");

        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(provider.discovery_document()))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(JwksResponder {
                key_store: Arc::clone(&key_store),
            })
            .mount(&server)
            .await;

        Self {
            server,
            provider,
            key_store,
        }
    }

    /// Issuer URL (the wiremock base URI)
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn provider(&self) -> &OidcProvider {
        &self.provider
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Issue a token set for `principal`
    pub fn issue(&self, principal: &Principal) -> TokenSet {
        self.provider
            .issue_token_set(principal)
            .expect("Failed to issue token set")
    }

    /// Rotate the signing key and return the new kid
    pub fn rotate(&self) -> String {
        self.key_store.rotate_key().expect("Failed to rotate key")
    }

    /// Relying party for [`TEST_CLIENT_ID`] that accepts this issuer's algorithm
    pub fn relying_party(&self) -> OidcRelyingParty {
        self.relying_party_for(TEST_CLIENT_ID)
    }

    /// Relying party for an arbitrary client ID
    pub fn relying_party_for(&self, client_id: &str) -> OidcRelyingParty {
        let config = RelyingPartyConfig::builder(self.issuer(), client_id, TEST_REDIRECT_URL)
            .algorithms([self.key_store.algorithm().as_str()])
            .build()
            .expect("Failed to build relying party config");
        OidcRelyingParty::new(config)
    }

    /// Number of requests the server has received for `request_path`
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
