//! Common utilities shared across the AAA toolkit crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, header decoding, time claims)
pub mod jwt;
