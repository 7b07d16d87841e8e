//! Signing and verification keys.
//!
//! RSA and P-256/P-384 signatures go through `jsonwebtoken::crypto` (ring).
//! ES512 is signed and verified with `p521` because `jsonwebtoken` does not
//! implement it.

use crate::crypto::jwk::{public_key_to_jwk, Jwk};
use crate::crypto::{KeyFamily, SigningAlgorithm};
use crate::errors::{AaaError, ValidationError};
use common::jwt::{b64url_decode, b64url_encode};
use common::secret::SecretString;
use jsonwebtoken::{DecodingKey, EncodingKey};
use p521::ecdsa::signature::{Signer as _, Verifier as _};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey};
use std::fmt;

/// RSA modulus size for generated keys.
pub const RSA_KEY_BITS: usize = 2048;

/// Public exponent required of RSA signing keys.
const RSA_PUBLIC_EXPONENT: u32 = 65_537;

enum Signer {
    Jwt(EncodingKey),
    Es512(p521::ecdsa::SigningKey),
}

/// A private signing key tagged with its `kid` and algorithm.
///
/// The private half is only reachable through [`SigningKey::sign`] and
/// [`SigningKey::to_pkcs8_pem`]. `Debug` output is redacted.
pub struct SigningKey {
    kid: String,
    algorithm: SigningAlgorithm,
    pkcs8_pem: SecretString,
    public_der: Vec<u8>,
    signer: Signer,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a fresh key pair for `algorithm` with a new UUID `kid`.
    ///
    /// RSA keys are 2048-bit with exponent 65537; EC keys use the curve the
    /// algorithm names.
    ///
    /// # Errors
    ///
    /// Returns `AaaError::Crypto` if key generation or encoding fails.
    pub fn generate(algorithm: SigningAlgorithm) -> Result<Self, AaaError> {
        let kid = uuid::Uuid::new_v4().to_string();

        match algorithm.family() {
            KeyFamily::Rsa => {
                let exponent = BigUint::from(RSA_PUBLIC_EXPONENT);
                let key = RsaPrivateKey::new_with_exp(&mut OsRng, RSA_KEY_BITS, &exponent)
                    .map_err(|e| AaaError::Crypto(format!("RSA key generation failed: {e}")))?;
                Self::from_rsa(kid, algorithm, &key)
            }
            KeyFamily::P256 => {
                Self::from_p256(kid, algorithm, &p256::SecretKey::random(&mut OsRng))
            }
            KeyFamily::P384 => {
                Self::from_p384(kid, algorithm, &p384::SecretKey::random(&mut OsRng))
            }
            KeyFamily::P521 => {
                Self::from_p521(kid, algorithm, &p521::SecretKey::random(&mut OsRng))
            }
        }
    }

    /// Load an unencrypted PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns `AaaError::KeyStore` if the PEM is not a key of the family
    /// `algorithm` requires.
    pub fn from_pkcs8_pem(
        kid: &str,
        pem: &str,
        algorithm: SigningAlgorithm,
    ) -> Result<Self, AaaError> {
        let wrong_type = |e: pkcs8::Error| {
            AaaError::KeyStore(format!(
                "Key {kid} is not a valid {algorithm} private key: {e}"
            ))
        };
        let kid = kid.to_string();

        match algorithm.family() {
            KeyFamily::Rsa => {
                let key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(wrong_type)?;
                Self::from_rsa(kid, algorithm, &key)
            }
            KeyFamily::P256 => {
                let key = p256::SecretKey::from_pkcs8_pem(pem).map_err(wrong_type)?;
                Self::from_p256(kid, algorithm, &key)
            }
            KeyFamily::P384 => {
                let key = p384::SecretKey::from_pkcs8_pem(pem).map_err(wrong_type)?;
                Self::from_p384(kid, algorithm, &key)
            }
            KeyFamily::P521 => {
                let key = p521::SecretKey::from_pkcs8_pem(pem).map_err(wrong_type)?;
                Self::from_p521(kid, algorithm, &key)
            }
        }
    }

    fn from_rsa(
        kid: String,
        algorithm: SigningAlgorithm,
        key: &RsaPrivateKey,
    ) -> Result<Self, AaaError> {
        if key.e() != &BigUint::from(RSA_PUBLIC_EXPONENT) {
            return Err(AaaError::KeyStore(format!(
                "Key {kid} has an unsupported RSA public exponent"
            )));
        }

        let pkcs1 = key.to_pkcs1_der().map_err(encode_err)?;
        let public_der = key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| AaaError::Crypto(format!("Public key encoding failed: {e}")))?;

        Ok(Self {
            pkcs8_pem: pem(key.to_pkcs8_pem(LineEnding::LF))?,
            public_der: public_der.as_bytes().to_vec(),
            signer: Signer::Jwt(EncodingKey::from_rsa_der(pkcs1.as_bytes())),
            kid,
            algorithm,
        })
    }

    fn from_p256(
        kid: String,
        algorithm: SigningAlgorithm,
        key: &p256::SecretKey,
    ) -> Result<Self, AaaError> {
        let pkcs8_der = key.to_pkcs8_der().map_err(encode_err)?;
        let public_der = key
            .public_key()
            .to_public_key_der()
            .map_err(|e| AaaError::Crypto(format!("Public key encoding failed: {e}")))?;

        Ok(Self {
            pkcs8_pem: pem(key.to_pkcs8_pem(LineEnding::LF))?,
            public_der: public_der.as_bytes().to_vec(),
            signer: Signer::Jwt(EncodingKey::from_ec_der(pkcs8_der.as_bytes())),
            kid,
            algorithm,
        })
    }

    fn from_p384(
        kid: String,
        algorithm: SigningAlgorithm,
        key: &p384::SecretKey,
    ) -> Result<Self, AaaError> {
        let pkcs8_der = key.to_pkcs8_der().map_err(encode_err)?;
        let public_der = key
            .public_key()
            .to_public_key_der()
            .map_err(|e| AaaError::Crypto(format!("Public key encoding failed: {e}")))?;

        Ok(Self {
            pkcs8_pem: pem(key.to_pkcs8_pem(LineEnding::LF))?,
            public_der: public_der.as_bytes().to_vec(),
            signer: Signer::Jwt(EncodingKey::from_ec_der(pkcs8_der.as_bytes())),
            kid,
            algorithm,
        })
    }

    fn from_p521(
        kid: String,
        algorithm: SigningAlgorithm,
        key: &p521::SecretKey,
    ) -> Result<Self, AaaError> {
        let signing_key = p521::ecdsa::SigningKey::from_bytes(&key.to_bytes())
            .map_err(|e| AaaError::Crypto(format!("P-521 signing key setup failed: {e}")))?;
        let public_der = key
            .public_key()
            .to_public_key_der()
            .map_err(|e| AaaError::Crypto(format!("Public key encoding failed: {e}")))?;

        Ok(Self {
            pkcs8_pem: pem(key.to_pkcs8_pem(LineEnding::LF))?,
            public_der: public_der.as_bytes().to_vec(),
            signer: Signer::Es512(signing_key),
            kid,
            algorithm,
        })
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Public half as DER `SubjectPublicKeyInfo`.
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    /// Unencrypted PKCS#8 PEM of the private key, for persistence only.
    #[must_use]
    pub fn to_pkcs8_pem(&self) -> &SecretString {
        &self.pkcs8_pem
    }

    /// Public JWK for this key.
    ///
    /// # Errors
    ///
    /// Propagates encoder errors (not expected for generated keys).
    pub fn to_jwk(&self) -> Result<Jwk, AaaError> {
        public_key_to_jwk(&self.public_der, &self.kid, self.algorithm)
    }

    /// Key that verifies signatures produced by this key.
    ///
    /// # Errors
    ///
    /// Propagates encoder errors (not expected for generated keys).
    pub fn verification_key(&self) -> Result<VerificationKey, AaaError> {
        Ok(VerificationKey::from_jwk(&self.to_jwk()?, self.algorithm)?)
    }

    /// Sign `message`, returning the base64url (unpadded) JWS signature.
    ///
    /// # Errors
    ///
    /// Returns `AaaError::Crypto` if the signing operation fails.
    pub fn sign(&self, message: &[u8]) -> Result<String, AaaError> {
        match &self.signer {
            Signer::Jwt(key) => {
                let alg = self.algorithm.jsonwebtoken_algorithm().ok_or_else(|| {
                    AaaError::Crypto(format!("{} is not handled by jsonwebtoken", self.algorithm))
                })?;
                jsonwebtoken::crypto::sign(message, key, alg)
                    .map_err(|e| AaaError::Crypto(format!("JWT signing operation failed: {e}")))
            }
            Signer::Es512(key) => {
                let signature: p521::ecdsa::Signature = key
                    .try_sign(message)
                    .map_err(|e| AaaError::Crypto(format!("JWT signing operation failed: {e}")))?;
                Ok(b64url_encode(signature.to_bytes()))
            }
        }
    }
}

fn pem<P>(encoded: Result<P, pkcs8::Error>) -> Result<SecretString, AaaError>
where
    P: std::ops::Deref<Target = String>,
{
    let pem = encoded.map_err(encode_err)?;
    Ok(SecretString::from(pem.as_str()))
}

fn encode_err<E: fmt::Display>(e: E) -> AaaError {
    AaaError::Crypto(format!("Private key encoding failed: {e}"))
}

enum Verifier {
    Jwt(DecodingKey),
    Es512(p521::ecdsa::VerifyingKey),
}

/// A public key bound to the single algorithm it may verify.
pub struct VerificationKey {
    algorithm: SigningAlgorithm,
    verifier: Verifier,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Build a verification key for `algorithm` from a JWK.
    ///
    /// The JWK's `kty`/`crv` must be the family `algorithm` requires, and a
    /// JWK that declares `alg` must declare exactly `algorithm`.
    ///
    /// # Errors
    ///
    /// - `DisallowedAlgorithm` when the key does not fit the algorithm
    /// - `UnknownKey` when the JWK is not a usable signing key
    pub fn from_jwk(jwk: &Jwk, algorithm: SigningAlgorithm) -> Result<Self, ValidationError> {
        if let Some(declared) = jwk.alg.as_deref() {
            if declared != algorithm.as_str() {
                tracing::debug!(
                    target: "aaa.crypto.keys",
                    kid = %jwk.kid,
                    declared = declared,
                    requested = %algorithm,
                    "JWK algorithm does not match token algorithm"
                );
                return Err(ValidationError::DisallowedAlgorithm);
            }
        }

        if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
            return Err(ValidationError::UnknownKey);
        }

        let family = algorithm.family();
        let verifier = match family {
            KeyFamily::Rsa => {
                if jwk.kty != "RSA" {
                    return Err(ValidationError::DisallowedAlgorithm);
                }
                let (n, e) = jwk
                    .n
                    .as_deref()
                    .zip(jwk.e.as_deref())
                    .ok_or(ValidationError::UnknownKey)?;
                let key = DecodingKey::from_rsa_components(n, e)
                    .map_err(|_| ValidationError::UnknownKey)?;
                Verifier::Jwt(key)
            }
            KeyFamily::P256 | KeyFamily::P384 | KeyFamily::P521 => {
                if jwk.kty != "EC" || jwk.crv.as_deref() != family.curve_name() {
                    return Err(ValidationError::DisallowedAlgorithm);
                }
                let (x, y) = jwk
                    .x
                    .as_deref()
                    .zip(jwk.y.as_deref())
                    .ok_or(ValidationError::UnknownKey)?;

                if family == KeyFamily::P521 {
                    let mut point = vec![0x04];
                    point.extend(b64url_decode(x).map_err(|_| ValidationError::UnknownKey)?);
                    point.extend(b64url_decode(y).map_err(|_| ValidationError::UnknownKey)?);
                    let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                        .map_err(|_| ValidationError::UnknownKey)?;
                    Verifier::Es512(key)
                } else {
                    let key = DecodingKey::from_ec_components(x, y)
                        .map_err(|_| ValidationError::UnknownKey)?;
                    Verifier::Jwt(key)
                }
            }
        };

        Ok(Self {
            algorithm,
            verifier,
        })
    }

    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Verify a base64url JWS `signature` over `message`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSignature` on any mismatch or undecodable signature.
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<(), ValidationError> {
        let valid = match &self.verifier {
            Verifier::Jwt(key) => {
                let alg = self
                    .algorithm
                    .jsonwebtoken_algorithm()
                    .ok_or(ValidationError::DisallowedAlgorithm)?;
                jsonwebtoken::crypto::verify(signature, message, key, alg).unwrap_or(false)
            }
            Verifier::Es512(key) => {
                let bytes = b64url_decode(signature).map_err(|_| ValidationError::InvalidSignature)?;
                p521::ecdsa::Signature::from_slice(&bytes)
                    .map(|sig| key.verify(message, &sig).is_ok())
                    .unwrap_or(false)
            }
        };

        if valid {
            Ok(())
        } else {
            tracing::debug!(
                target: "aaa.crypto.keys",
                algorithm = %self.algorithm,
                "Signature verification failed"
            );
            Err(ValidationError::InvalidSignature)
        }
    }
}
