//! Secret types for credentials and key material.
//!
//! Re-exports [`secrecy`] so every crate in the workspace carries secrets the
//! same way. `SecretString` redacts itself in `Debug` output and is zeroized on
//! drop, so config structs that derive `Debug` stay safe to log.
//!
//! Use `SecretString` for:
//! - OIDC client secrets
//! - Audit ingest API keys
//! - PEM-encoded private keys while they are in transit to or from disk
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let api_key = SecretString::from("kk-123");
//! assert!(!format!("{api_key:?}").contains("kk-123"));
//! assert_eq!(api_key.expose_secret(), "kk-123");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
