//! AAA toolkit library
//!
//! Authentication, authorization and accounting building blocks: signing-key
//! lifecycle with JWKS publication, OIDC token issuance and validation,
//! RBAC, SPIFFE peer checks, and a fan-out audit pipeline.
//!
//! # Modules
//!
//! - `config` - Process configuration from environment variables
//! - `crypto` - Signing algorithms, JWK encoding, key stores
//! - `authn` - OIDC provider and relying party, SPIFFE, CSRF state
//! - `authz` - Roles and scope guards
//! - `audit` - Audit events, sinks, emitter
//! - `errors` - Error types
//! - `hardening` - Endpoint URL validation
//! - `observability` - Metrics and log-correlation helpers

pub mod audit;
pub mod authn;
pub mod authz;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod hardening;
pub mod observability;

pub use errors::{AaaError, ValidationError};
