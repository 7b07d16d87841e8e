//! RFC 7517 JSON Web Key encoding for RSA and NIST EC public keys.
//!
//! Input is a public key as X.509 `SubjectPublicKeyInfo` (DER, or PEM via
//! [`public_key_pem_to_jwk`]). Output never contains private components.

use crate::crypto::{KeyFamily, SigningAlgorithm};
use crate::errors::AaaError;
use common::jwt::b64url_encode;
use p256::elliptic_curve::{
    self,
    sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint},
    AffinePoint, CurveArithmetic, FieldBytesSize,
};
use pkcs8::der::asn1::ObjectIdentifier;
use pkcs8::spki::SubjectPublicKeyInfoRef;
use pkcs8::{AssociatedOid, Document};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

/// Curves the encoder accepts, by JWK name.
pub const SUPPORTED_CURVES: [&str; 3] = ["P-256", "P-384", "P-521"];

const PUBLIC_KEY_PEM_LABEL: &str = "PUBLIC KEY";

/// Public JSON Web Key.
///
/// RSA keys carry `n`/`e`; EC keys carry `crv`/`x`/`y`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default)]
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// JWKS document, `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Look up a key by `kid`.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// Encode a DER `SubjectPublicKeyInfo` as a signing JWK.
///
/// # Errors
///
/// - `UnsupportedKeyType` for anything other than RSA or EC public keys
/// - `UnsupportedCurve` for EC keys outside P-256/P-384/P-521
/// - `Crypto` if the key is malformed or does not fit `alg`
pub fn public_key_to_jwk(
    spki_der: &[u8],
    kid: &str,
    alg: SigningAlgorithm,
) -> Result<Jwk, AaaError> {
    let spki = SubjectPublicKeyInfoRef::try_from(spki_der)
        .map_err(|e| AaaError::Crypto(format!("Invalid SubjectPublicKeyInfo: {e}")))?;

    let key_oid = spki.algorithm.oid;

    if key_oid == rsa::pkcs1::ALGORITHM_OID {
        return rsa_jwk(spki_der, kid, alg);
    }

    if key_oid == elliptic_curve::ALGORITHM_OID {
        let curve_oid = spki
            .algorithm
            .parameters_oid()
            .map_err(|e| AaaError::Crypto(format!("EC key without named curve: {e}")))?;
        let point = spki
            .subject_public_key
            .as_bytes()
            .ok_or_else(|| AaaError::Crypto("EC public key is not byte aligned".to_string()))?;
        return ec_jwk(curve_oid, point, kid, alg);
    }

    Err(AaaError::UnsupportedKeyType(key_oid.to_string()))
}

/// Encode a PEM `PUBLIC KEY` block as a signing JWK.
///
/// # Errors
///
/// As [`public_key_to_jwk`], plus `Crypto` for undecodable PEM or a block
/// labelled anything other than `PUBLIC KEY`.
pub fn public_key_pem_to_jwk(
    pem: &str,
    kid: &str,
    alg: SigningAlgorithm,
) -> Result<Jwk, AaaError> {
    let (label, document) = Document::from_pem(pem)
        .map_err(|e| AaaError::Crypto(format!("Invalid PEM encoding: {e}")))?;
    if label != PUBLIC_KEY_PEM_LABEL {
        return Err(AaaError::Crypto(format!(
            "Expected a {PUBLIC_KEY_PEM_LABEL} PEM block, got {label}"
        )));
    }
    public_key_to_jwk(document.as_bytes(), kid, alg)
}

fn rsa_jwk(spki_der: &[u8], kid: &str, alg: SigningAlgorithm) -> Result<Jwk, AaaError> {
    if alg.family() != KeyFamily::Rsa {
        return Err(mismatch(alg, "RSA"));
    }

    let key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| AaaError::Crypto(format!("Invalid RSA public key: {e}")))?;

    let n = left_pad(&key.n().to_bytes_be(), key.size());
    let e_bytes = key.e().to_bytes_be();
    let e = minimal(&e_bytes);

    Ok(Jwk {
        kty: "RSA".to_string(),
        use_: Some("sig".to_string()),
        alg: Some(alg.as_str().to_string()),
        kid: kid.to_string(),
        n: Some(b64url_encode(n)),
        e: Some(b64url_encode(e)),
        crv: None,
        x: None,
        y: None,
    })
}

fn ec_jwk(
    curve_oid: ObjectIdentifier,
    point: &[u8],
    kid: &str,
    alg: SigningAlgorithm,
) -> Result<Jwk, AaaError> {
    let (family, (x, y)) = if curve_oid == p256::NistP256::OID {
        (KeyFamily::P256, coordinates::<p256::NistP256>(point, 32)?)
    } else if curve_oid == p384::NistP384::OID {
        (KeyFamily::P384, coordinates::<p384::NistP384>(point, 48)?)
    } else if curve_oid == p521::NistP521::OID {
        (KeyFamily::P521, coordinates::<p521::NistP521>(point, 66)?)
    } else {
        return Err(AaaError::UnsupportedCurve {
            curve: curve_oid.to_string(),
            supported: SUPPORTED_CURVES.to_vec(),
        });
    };

    if alg.family() != family {
        return Err(mismatch(alg, family.curve_name().unwrap_or("EC")));
    }

    Ok(Jwk {
        kty: "EC".to_string(),
        use_: Some("sig".to_string()),
        alg: Some(alg.as_str().to_string()),
        kid: kid.to_string(),
        n: None,
        e: None,
        crv: family.curve_name().map(ToString::to_string),
        x: Some(b64url_encode(x)),
        y: Some(b64url_encode(y)),
    })
}

/// Affine coordinates of a SEC1 point, each padded to `size` bytes.
fn coordinates<C>(sec1: &[u8], size: usize) -> Result<(Vec<u8>, Vec<u8>), AaaError>
where
    C: CurveArithmetic,
    AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
    FieldBytesSize<C>: ModulusSize,
{
    let public = elliptic_curve::PublicKey::<C>::from_sec1_bytes(sec1)
        .map_err(|_| AaaError::Crypto("Invalid EC public key point".to_string()))?;
    let encoded = public.to_encoded_point(false);

    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => Ok((left_pad(x, size), left_pad(y, size))),
        _ => Err(AaaError::Crypto("EC public key is the identity point".to_string())),
    }
}

fn mismatch(alg: SigningAlgorithm, key: &str) -> AaaError {
    AaaError::Crypto(format!("{key} key cannot be used with {alg}"))
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let trimmed = minimal(bytes);
    let mut out = vec![0u8; len.saturating_sub(trimmed.len())];
    out.extend_from_slice(trimmed);
    out
}

fn minimal(bytes: &[u8]) -> &[u8] {
    let leading = bytes.iter().take_while(|b| **b == 0).count();
    match bytes.get(leading..) {
        Some(rest) if !rest.is_empty() => rest,
        // Zero is encoded as a single zero byte
        _ => bytes.get(bytes.len().saturating_sub(1)..).unwrap_or_default(),
    }
}
