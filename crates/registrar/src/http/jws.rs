//! Flattened JWS serialization for ACME requests (RFC 8555 §6.2).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::hmac;
use serde_json::{json, Value};

use super::key::AccountSigner;
use crate::error::ClientError;

pub(crate) fn b64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// How the request identifies its signing key
#[derive(Debug, Clone, Copy)]
pub(crate) enum KeyId<'a> {
    /// Embed the public key; used for `newAccount`
    Jwk,
    /// Reference an existing account URL
    Kid(&'a str),
}

/// Sign `payload` for `url`. `None` produces a POST-as-GET body.
pub(crate) fn sign(
    signer: &AccountSigner,
    key_id: KeyId<'_>,
    nonce: &str,
    url: &str,
    payload: Option<&Value>,
) -> Result<Value, ClientError> {
    let mut protected = json!({
        "alg": signer.algorithm(),
        "nonce": nonce,
        "url": url,
    });
    match key_id {
        KeyId::Jwk => protected["jwk"] = signer.jwk(),
        KeyId::Kid(kid) => protected["kid"] = Value::String(kid.to_string()),
    }

    let protected = b64(protected.to_string());
    let payload = payload.map(|p| b64(p.to_string())).unwrap_or_default();
    let signature = signer.sign(format!("{}.{}", protected, payload).as_bytes())?;

    Ok(json!({
        "protected": protected,
        "payload": payload,
        "signature": b64(signature),
    }))
}

/// External account binding object (RFC 8555 §7.3.4)
///
/// An HS256 JWS over the account's public JWK, keyed by the CA-issued MAC
/// key and addressed to the `newAccount` URL.
pub(crate) fn external_account_binding(
    signer: &AccountSigner,
    key_id: &str,
    hmac_key: &[u8],
    new_account_url: &str,
) -> Value {
    let protected = b64(json!({
        "alg": "HS256",
        "kid": key_id,
        "url": new_account_url,
    })
    .to_string());
    let payload = b64(signer.jwk().to_string());

    let key = hmac::Key::new(hmac::HMAC_SHA256, hmac_key);
    let tag = hmac::sign(&key, format!("{}.{}", protected, payload).as_bytes());

    json!({
        "protected": protected,
        "payload": payload,
        "signature": b64(tag.as_ref()),
    })
}
