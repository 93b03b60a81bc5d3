//! Account key loading and JWS signing.
//!
//! Supports ECDSA P-256 / P-384 keys (PKCS#8 or SEC1 PEM) and RSA keys
//! (PKCS#8 or PKCS#1 PEM). ring only reads PKCS#8 for ECDSA, so SEC1 keys
//! are re-wrapped before loading.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, KeyPair, RsaKeyPair, RsaPublicKeyComponents,
    ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED_SIGNING, RSA_PKCS1_SHA256,
};
use rustls_pemfile::Item;
use serde_json::{json, Value};

use crate::error::ClientError;

/// DER of `id-ecPublicKey` (1.2.840.10045.2.1)
const OID_EC_PUBLIC_KEY: &[u8] = &[0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
/// DER of `prime256v1` (1.2.840.10045.3.1.7)
const OID_P256: &[u8] = &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
/// DER of `secp384r1` (1.3.132.0.34)
const OID_P384: &[u8] = &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x22];

#[derive(Debug, Clone, Copy)]
struct Curve {
    alg: &'static str,
    crv: &'static str,
    signing: &'static EcdsaSigningAlgorithm,
    oid: &'static [u8],
    coordinate_len: usize,
}

static CURVES: [Curve; 2] = [
    Curve {
        alg: "ES256",
        crv: "P-256",
        signing: &ECDSA_P256_SHA256_FIXED_SIGNING,
        oid: OID_P256,
        coordinate_len: 32,
    },
    Curve {
        alg: "ES384",
        crv: "P-384",
        signing: &ECDSA_P384_SHA384_FIXED_SIGNING,
        oid: OID_P384,
        coordinate_len: 48,
    },
];

enum SigningKey {
    Ecdsa { pair: EcdsaKeyPair, curve: Curve },
    Rsa(RsaKeyPair),
}

/// Account key able to sign JWS payloads
pub struct AccountSigner {
    key: SigningKey,
    rng: SystemRandom,
}

impl AccountSigner {
    /// Load a signer from PEM text
    pub fn from_pem(pem: &str) -> Result<Self, ClientError> {
        let rng = SystemRandom::new();
        let mut reader = pem.as_bytes();

        let item = rustls_pemfile::read_one(&mut reader)
            .map_err(|e| ClientError::Key(format!("unreadable PEM: {}", e)))?;

        let key = match item {
            Some(Item::Pkcs8Key(der)) => from_pkcs8(der.secret_pkcs8_der(), &rng)?,
            Some(Item::Sec1Key(der)) => from_sec1(der.secret_sec1_der(), &rng)?,
            Some(Item::Pkcs1Key(der)) => SigningKey::Rsa(
                RsaKeyPair::from_der(der.secret_pkcs1_der())
                    .map_err(|e| ClientError::Key(format!("invalid RSA key: {}", e)))?,
            ),
            Some(_) => {
                return Err(ClientError::Key(
                    "PEM does not start with a private key".to_string(),
                ))
            }
            None => return Err(ClientError::Key("no PEM block found".to_string())),
        };

        Ok(Self { key, rng })
    }

    /// JWS `alg` value
    pub fn algorithm(&self) -> &'static str {
        match &self.key {
            SigningKey::Ecdsa { curve, .. } => curve.alg,
            SigningKey::Rsa(_) => "RS256",
        }
    }

    /// Public key as a JWK
    pub fn jwk(&self) -> Value {
        match &self.key {
            SigningKey::Ecdsa { pair, curve } => {
                // uncompressed point: 0x04 || x || y
                let point = pair.public_key().as_ref();
                let (x, y) = point[1..].split_at(curve.coordinate_len);
                json!({
                    "crv": curve.crv,
                    "kty": "EC",
                    "x": URL_SAFE_NO_PAD.encode(x),
                    "y": URL_SAFE_NO_PAD.encode(y),
                })
            }
            SigningKey::Rsa(pair) => {
                let components = RsaPublicKeyComponents::<Vec<u8>>::from(pair.public());
                json!({
                    "e": URL_SAFE_NO_PAD.encode(strip_leading_zeros(&components.e)),
                    "kty": "RSA",
                    "n": URL_SAFE_NO_PAD.encode(strip_leading_zeros(&components.n)),
                })
            }
        }
    }

    /// Sign a JWS signing input
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, ClientError> {
        match &self.key {
            SigningKey::Ecdsa { pair, .. } => pair
                .sign(&self.rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| ClientError::Key("ECDSA signing failed".to_string())),
            SigningKey::Rsa(pair) => {
                let mut signature = vec![0; pair.public().modulus_len()];
                pair.sign(&RSA_PKCS1_SHA256, &self.rng, message, &mut signature)
                    .map_err(|_| ClientError::Key("RSA signing failed".to_string()))?;
                Ok(signature)
            }
        }
    }
}

fn from_pkcs8(der: &[u8], rng: &SystemRandom) -> Result<SigningKey, ClientError> {
    for curve in CURVES {
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(curve.signing, der, rng) {
            return Ok(SigningKey::Ecdsa { pair, curve });
        }
    }

    RsaKeyPair::from_pkcs8(der)
        .map(SigningKey::Rsa)
        .map_err(|e| ClientError::Key(format!("unsupported PKCS#8 key: {}", e)))
}

fn from_sec1(der: &[u8], rng: &SystemRandom) -> Result<SigningKey, ClientError> {
    for curve in CURVES {
        let pkcs8 = wrap_sec1_in_pkcs8(der, curve.oid);
        if let Ok(pair) = EcdsaKeyPair::from_pkcs8(curve.signing, &pkcs8, rng) {
            return Ok(SigningKey::Ecdsa { pair, curve });
        }
    }

    Err(ClientError::Key(
        "unsupported EC key: only P-256 and P-384 are accepted".to_string(),
    ))
}

/// Wrap a SEC1 `ECPrivateKey` in a version 0 PKCS#8 `PrivateKeyInfo`
fn wrap_sec1_in_pkcs8(sec1: &[u8], curve_oid: &[u8]) -> Vec<u8> {
    let mut algorithm = OID_EC_PUBLIC_KEY.to_vec();
    algorithm.extend_from_slice(curve_oid);

    let mut body = vec![0x02, 0x01, 0x00];
    body.extend(der_tlv(0x30, &algorithm));
    body.extend(der_tlv(0x04, sec1));

    der_tlv(0x30, &body)
}

fn der_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let len = value.len();
    let mut out = vec![tag];
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xff {
        out.extend([0x81, len as u8]);
    } else {
        out.extend([0x82, (len >> 8) as u8, len as u8]);
    }
    out.extend_from_slice(value);
    out
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
