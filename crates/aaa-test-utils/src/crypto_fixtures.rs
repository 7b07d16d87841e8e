//! Cryptographic fixtures for testing
//!
//! Foreign public keys (types and curves the toolkit must reject) and
//! ready-made key stores.

use aaa_core::crypto::{FileKeyStore, MemoryKeyStore, SigningAlgorithm};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::sync::Arc;
use tempfile::TempDir;

/// SubjectPublicKeyInfo prefix for an Ed25519 key (OID 1.3.101.112).
const ED25519_SPKI_PREFIX: &str = "302a300506032b6570032100";

/// SubjectPublicKeyInfo prefix for an uncompressed secp256k1 point
/// (OID 1.3.132.0.10).
const SECP256K1_SPKI_PREFIX: &str = "3056301006072a8648ce3d020106052b8104000a034200";

/// The secp256k1 generator point, uncompressed.
const SECP256K1_GENERATOR: &str = concat!(
    "04",
    "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
    "483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
);

/// Deterministic Ed25519 public key as SPKI DER.
///
/// The same seed always produces the same key.
pub fn ed25519_spki_der(seed: u8) -> Vec<u8> {
    let mut seed_bytes = [0u8; 32];
    for (i, byte) in seed_bytes.iter_mut().enumerate() {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }

    let key_pair =
        Ed25519KeyPair::from_seed_unchecked(&seed_bytes).expect("Ed25519 seed should be valid");

    let mut der = hex::decode(ED25519_SPKI_PREFIX).expect("valid hex");
    der.extend_from_slice(key_pair.public_key().as_ref());
    der
}

/// secp256k1 public key (the curve generator) as SPKI DER.
pub fn secp256k1_spki_der() -> Vec<u8> {
    let mut der = hex::decode(SECP256K1_SPKI_PREFIX).expect("valid hex");
    der.extend(hex::decode(SECP256K1_GENERATOR).expect("valid hex"));
    der
}

/// Fresh in-memory key store for `algorithm`.
pub fn memory_store(algorithm: SigningAlgorithm) -> Arc<MemoryKeyStore> {
    Arc::new(MemoryKeyStore::new(algorithm).expect("Failed to create memory key store"))
}

/// File-backed key store in a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_file_store(algorithm: SigningAlgorithm) -> (TempDir, FileKeyStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = FileKeyStore::open(dir.path().join("keys.json"), algorithm)
        .expect("Failed to create file key store");
    (dir, store)
}
