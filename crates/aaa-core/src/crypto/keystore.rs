//! Signing key stores.
//!
//! A store keeps at most [`MAX_KEYS`] keys, newest last. The newest key signs;
//! older keys stay published in the JWKS so tokens they signed keep
//! validating until they age out.
//!
//! # Concurrency
//!
//! The key sequence lives behind a `parking_lot::RwLock`. Rotation generates
//! the new key outside the lock, then swaps in the rotated sequence in one
//! write, so readers see either the old or the new set and never a partial one.
//! [`FileKeyStore`] additionally serializes rotations with a mutex and only
//! publishes a rotation after it has been written to disk.

use crate::crypto::jwk::Jwks;
use crate::crypto::keys::SigningKey;
use crate::crypto::SigningAlgorithm;
use crate::errors::AaaError;
use crate::observability::metrics::{record_key_rotation, set_retained_signing_keys};
use common::secret::ExposeSecret;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Maximum number of keys a store retains.
pub const MAX_KEYS: usize = 3;

/// Owner of signing key material.
pub trait KeyStore: Send + Sync {
    /// Algorithm every key in this store is generated for.
    fn algorithm(&self) -> SigningAlgorithm;

    /// The active (newest) signing key.
    fn signing_key(&self) -> Arc<SigningKey>;

    /// Public keys of every retained key, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates JWK encoding errors.
    fn jwks(&self) -> Result<Jwks, AaaError>;

    /// Generate and activate a new key, evicting the oldest beyond
    /// [`MAX_KEYS`]. Returns the new `kid`.
    ///
    /// # Errors
    ///
    /// Key generation or persistence failures; the store is left unchanged.
    fn rotate_key(&self) -> Result<String, AaaError>;
}

/// Retained keys: the active key plus up to `MAX_KEYS - 1` predecessors.
#[derive(Clone)]
struct KeySet {
    retired: VecDeque<Arc<SigningKey>>,
    active: Arc<SigningKey>,
}

impl KeySet {
    fn new(active: SigningKey) -> Self {
        Self {
            retired: VecDeque::new(),
            active: Arc::new(active),
        }
    }

    /// Build from keys ordered oldest to newest, keeping the newest `MAX_KEYS`.
    fn from_ordered(keys: Vec<SigningKey>) -> Option<Self> {
        let mut keys: VecDeque<Arc<SigningKey>> = keys.into_iter().map(Arc::new).collect();
        let active = keys.pop_back()?;
        while keys.len() >= MAX_KEYS {
            keys.pop_front();
        }
        Some(Self {
            retired: keys,
            active,
        })
    }

    fn rotated(&self, next: SigningKey) -> Self {
        let mut retired = self.retired.clone();
        retired.push_back(Arc::clone(&self.active));
        while retired.len() >= MAX_KEYS {
            retired.pop_front();
        }
        Self {
            retired,
            active: Arc::new(next),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<SigningKey>> {
        self.retired.iter().chain(std::iter::once(&self.active))
    }

    fn len(&self) -> usize {
        self.retired.len() + 1
    }

    fn jwks(&self) -> Result<Jwks, AaaError> {
        let keys = self.iter().map(|key| key.to_jwk()).collect::<Result<_, _>>()?;
        Ok(Jwks { keys })
    }
}

fn generate(algorithm: SigningAlgorithm) -> Result<SigningKey, AaaError> {
    SigningKey::generate(algorithm).inspect_err(|e| {
        warn!(target: "aaa.crypto.keystore", algorithm = %algorithm, error = %e, "Key generation failed");
        record_key_rotation("error");
    })
}

// =============================================================================
// In-memory store
// =============================================================================

/// Ephemeral key store. Keys are lost when the process exits.
pub struct MemoryKeyStore {
    algorithm: SigningAlgorithm,
    keys: RwLock<KeySet>,
}

impl MemoryKeyStore {
    /// Create a store holding one freshly generated key.
    ///
    /// # Errors
    ///
    /// Returns `AaaError::Crypto` if key generation fails.
    pub fn new(algorithm: SigningAlgorithm) -> Result<Self, AaaError> {
        let first = generate(algorithm)?;
        info!(
            target: "aaa.crypto.keystore",
            kid = %first.kid(),
            algorithm = %algorithm,
            "In-memory key store initialized"
        );
        set_retained_signing_keys(1);

        Ok(Self {
            algorithm,
            keys: RwLock::new(KeySet::new(first)),
        })
    }
}

impl KeyStore for MemoryKeyStore {
    fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    fn signing_key(&self) -> Arc<SigningKey> {
        Arc::clone(&self.keys.read().active)
    }

    fn jwks(&self) -> Result<Jwks, AaaError> {
        let snapshot = self.keys.read().clone();
        snapshot.jwks()
    }

    fn rotate_key(&self) -> Result<String, AaaError> {
        let next = generate(self.algorithm)?;
        let kid = next.kid().to_string();

        let retained = {
            let mut keys = self.keys.write();
            *keys = keys.rotated(next);
            keys.len()
        };

        info!(target: "aaa.crypto.keystore", kid = %kid, retained, "Signing key rotated");
        record_key_rotation("success");
        set_retained_signing_keys(retained);
        Ok(kid)
    }
}

// =============================================================================
// File-backed store
// =============================================================================

#[derive(Serialize, Deserialize)]
struct PersistedKeys {
    keys: Vec<PersistedKey>,
}

#[derive(Serialize, Deserialize)]
struct PersistedKey {
    kid: String,
    pem: String,
}

/// Key store persisted as `{"keys": [{"kid", "pem"}, ...]}`, newest last.
///
/// PEM material is PKCS#8 and unencrypted; protect the file accordingly.
/// One writer per file is assumed; there is no cross-process locking.
pub struct FileKeyStore {
    path: PathBuf,
    algorithm: SigningAlgorithm,
    keys: RwLock<KeySet>,
    rotation: Mutex<()>,
}

impl FileKeyStore {
    /// Load the store at `path`, or create it with one new key if absent.
    ///
    /// # Errors
    ///
    /// - `KeyStore` if an existing file is unreadable, corrupt, empty, or holds
    ///   keys that do not match `algorithm`
    /// - `KeyStore` if the initial file cannot be written
    #[instrument(skip_all, fields(path = %path.as_ref().display(), algorithm = %algorithm))]
    pub fn open(path: impl AsRef<Path>, algorithm: SigningAlgorithm) -> Result<Self, AaaError> {
        let path = path.as_ref().to_path_buf();

        let keys = if path.exists() {
            let keys = load(&path, algorithm)?;
            info!(
                target: "aaa.crypto.keystore",
                kid = %keys.active.kid(),
                retained = keys.len(),
                "Loaded persisted signing keys"
            );
            keys
        } else {
            let keys = KeySet::new(generate(algorithm)?);
            persist(&path, &keys)?;
            info!(
                target: "aaa.crypto.keystore",
                kid = %keys.active.kid(),
                "Created key store file"
            );
            keys
        };
        set_retained_signing_keys(keys.len());

        Ok(Self {
            path,
            algorithm,
            keys: RwLock::new(keys),
            rotation: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    fn signing_key(&self) -> Arc<SigningKey> {
        Arc::clone(&self.keys.read().active)
    }

    fn jwks(&self) -> Result<Jwks, AaaError> {
        let snapshot = self.keys.read().clone();
        snapshot.jwks()
    }

    fn rotate_key(&self) -> Result<String, AaaError> {
        let next = generate(self.algorithm)?;
        let kid = next.kid().to_string();

        let _rotation = self.rotation.lock();
        let rotated = self.keys.read().rotated(next);

        if let Err(e) = persist(&self.path, &rotated) {
            record_key_rotation("error");
            return Err(e);
        }

        let retained = rotated.len();
        *self.keys.write() = rotated;

        info!(target: "aaa.crypto.keystore", kid = %kid, retained, "Signing key rotated and persisted");
        record_key_rotation("success");
        set_retained_signing_keys(retained);
        Ok(kid)
    }
}

fn load(path: &Path, algorithm: SigningAlgorithm) -> Result<KeySet, AaaError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| AaaError::KeyStore(format!("Failed to read key store file: {e}")))?;

    let persisted: PersistedKeys = serde_json::from_str(&contents)
        .map_err(|e| AaaError::KeyStore(format!("Corrupt key store file: {e}")))?;

    let keys = persisted
        .keys
        .iter()
        .map(|k| SigningKey::from_pkcs8_pem(&k.kid, &k.pem, algorithm))
        .collect::<Result<Vec<_>, _>>()?;

    KeySet::from_ordered(keys)
        .ok_or_else(|| AaaError::KeyStore("Key store file contains no keys".to_string()))
}

/// Rewrite the whole file via a sibling temp file and rename.
fn persist(path: &Path, keys: &KeySet) -> Result<(), AaaError> {
    let document = PersistedKeys {
        keys: keys
            .iter()
            .map(|key| PersistedKey {
                kid: key.kid().to_string(),
                pem: key.to_pkcs8_pem().expose_secret().to_string(),
            })
            .collect(),
    };
    let json = serde_json::to_vec_pretty(&document)
        .map_err(|e| AaaError::KeyStore(format!("Failed to serialize keys: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AaaError::KeyStore(format!("Failed to create key directory: {e}")))?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        AaaError::KeyStore(format!("Failed to write key store file: {e}"))
    })
}

// =============================================================================
// Tests
// =============================================================================
