//! Account record model.
//!
//! [`AccountSpec`] carries the write-once inputs of an account, and
//! [`AccountRecord`] pairs them with the URL the CA assigned at creation.
//! Neither type has setters: changing the key, the contact email or the
//! external account binding means deleting the account and creating a new
//! one.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::RegistrarError;

/// Account private key material in PEM form
pub struct AccountKey(SecretString);

impl AccountKey {
    pub fn from_pem(pem: impl Into<String>) -> Self {
        Self(SecretString::from(pem.into()))
    }

    pub fn pem(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccountKey([redacted])")
    }
}

/// External account binding credentials issued by the CA out of band
pub struct ExternalAccountBinding {
    key_id: SecretString,
    hmac_base64: SecretString,
}

impl ExternalAccountBinding {
    pub fn new(key_id: impl Into<String>, hmac_base64: impl Into<String>) -> Self {
        Self {
            key_id: SecretString::from(key_id.into()),
            hmac_base64: SecretString::from(hmac_base64.into()),
        }
    }

    pub fn key_id(&self) -> &str {
        self.key_id.expose_secret()
    }

    pub fn hmac_base64(&self) -> &str {
        self.hmac_base64.expose_secret()
    }

    /// Decode the HMAC key.
    ///
    /// CAs hand out the key as base64url without padding, but users often
    /// paste standard base64, so both alphabets are accepted with or without
    /// trailing `=`.
    pub fn decode_hmac(&self) -> Result<Vec<u8>, RegistrarError> {
        let normalized: String = self
            .hmac_base64()
            .trim()
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();

        let key = URL_SAFE_NO_PAD.decode(normalized.as_bytes()).map_err(|e| {
            RegistrarError::InvalidExternalAccountBinding(format!("HMAC is not valid base64: {}", e))
        })?;

        if key.is_empty() {
            return Err(RegistrarError::InvalidExternalAccountBinding(
                "HMAC key is empty".to_string(),
            ));
        }

        Ok(key)
    }
}

impl fmt::Debug for ExternalAccountBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalAccountBinding([redacted])")
    }
}

/// Write-once inputs of an ACME account
#[derive(Debug)]
pub struct AccountSpec {
    key: AccountKey,
    email: String,
    external_account_binding: Option<ExternalAccountBinding>,
}

impl AccountSpec {
    pub fn new(
        key: AccountKey,
        email: impl Into<String>,
        external_account_binding: Option<ExternalAccountBinding>,
    ) -> Self {
        Self {
            key,
            email: email.into(),
            external_account_binding,
        }
    }

    pub fn key(&self) -> &AccountKey {
        &self.key
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn external_account_binding(&self) -> Option<&ExternalAccountBinding> {
        self.external_account_binding.as_ref()
    }

    /// Contact URIs sent to the CA
    pub fn contact(&self) -> Vec<String> {
        vec![format!("mailto:{}", self.email)]
    }

    /// Whether `other` describes the same account.
    ///
    /// A difference in any write-once field means the existing account must
    /// be replaced, never updated.
    pub fn same_account_as(&self, other: &AccountSpec) -> bool {
        let eab_matches = match (&self.external_account_binding, &other.external_account_binding) {
            (None, None) => true,
            (Some(a), Some(b)) => a.key_id() == b.key_id() && a.hmac_base64() == b.hmac_base64(),
            _ => false,
        };

        self.key.pem() == other.key.pem() && self.email == other.email && eab_matches
    }
}

/// An account that exists at the CA
///
/// Only produced by a successful registration or by loading a stored
/// record, so `account_url` is always set.
#[derive(Debug)]
pub struct AccountRecord {
    spec: AccountSpec,
    account_url: String,
    created: DateTime<Utc>,
}

impl AccountRecord {
    pub(crate) fn new(spec: AccountSpec, account_url: String, created: DateTime<Utc>) -> Self {
        Self {
            spec,
            account_url,
            created,
        }
    }

    pub fn spec(&self) -> &AccountSpec {
        &self.spec
    }

    /// CA-assigned account URL, the record's external identity
    pub fn account_url(&self) -> &str {
        &self.account_url
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
}

/// Account status reported by the CA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,
    /// Missing or unrecognised status value
    #[default]
    #[serde(other)]
    Unknown,
}

impl AccountStatus {
    /// Statuses that prove the account still exists
    pub fn is_known(&self) -> bool {
        !matches!(self, AccountStatus::Unknown)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Valid => "valid",
            AccountStatus::Deactivated => "deactivated",
            AccountStatus::Revoked => "revoked",
            AccountStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// CA-visible account state, fetched fresh on every read and never stored
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Required on the wire; a document without it is malformed
    pub status: AccountStatus,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default)]
    pub terms_of_service_agreed: Option<bool>,
    #[serde(default)]
    pub orders: Option<String>,
}
