//! # AAA Test Utilities
//!
//! Shared test utilities for the AAA toolkit.
//!
//! This crate provides:
//! - Crypto fixtures (foreign key types, ready-made key stores)
//! - Token builders that sign arbitrary payloads
//! - A wiremock-backed OIDC issuer (`MockIssuer`)
//! - Recording and failing audit sinks
//! - Fixed test IDs
//! - Custom assertions (TokenAssertions trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aaa_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let issuer = MockIssuer::start(SigningAlgorithm::ES256).await;
//!     let tokens = issuer.issue(&Principal::new(TEST_SUBJECT_ALICE, TEST_TENANT_ACME));
//!
//!     tokens.access_token
//!         .assert_valid_jwt("ES256")
//!         .assert_for_subject(TEST_SUBJECT_ALICE);
//!
//!     let claims = issuer.relying_party().validate_token(&tokens.access_token).await?;
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod mock_issuer;
pub mod sinks;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use mock_issuer::*;
pub use sinks::*;
pub use test_ids::*;
pub use token_builders::*;
