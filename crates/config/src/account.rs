//! ACME endpoint, storage and account configuration types.

use std::fmt;
use std::path::PathBuf;

use validator::Validate;

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION_DIRECTORY: &str =
    "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETSENCRYPT_STAGING_DIRECTORY: &str =
    "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Certificate authority endpoint settings
///
/// These are handed to the client factory; nothing in the account
/// lifecycle logic reads them directly.
#[derive(Debug, Clone, Validate)]
pub struct AcmeConfig {
    /// ACME directory URL
    #[validate(url)]
    pub directory_url: String,

    /// Per-request transport timeout in seconds
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,

    /// User-Agent header sent with every CA request
    #[validate(length(min = 1))]
    pub user_agent: String,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            directory_url: LETSENCRYPT_PRODUCTION_DIRECTORY.to_string(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

pub(crate) fn default_timeout_secs() -> u64 {
    30
}

pub(crate) fn default_user_agent() -> String {
    format!("acme-registrar/{}", env!("CARGO_PKG_VERSION"))
}

/// Where registration records are persisted
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base directory for account records
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

pub(crate) fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/acme-registrar")
}

/// A managed ACME account
#[derive(Debug, Clone, Validate)]
pub struct AccountConfig {
    /// Local name of the account, used as the storage key
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    /// PEM file holding the account private key
    pub key_file: PathBuf,

    /// Contact email registered with the CA
    #[validate(email)]
    pub email: String,

    /// External account binding credentials, if the CA requires them
    #[validate(nested)]
    pub external_account_binding: Option<EabConfig>,
}

/// External account binding credentials issued by the CA out of band
#[derive(Clone, Validate)]
pub struct EabConfig {
    /// Key identifier
    #[validate(length(min = 1))]
    pub key_id: String,

    /// Base64-encoded HMAC key
    #[validate(length(min = 1))]
    pub hmac_base64: String,
}

impl fmt::Debug for EabConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EabConfig")
            .field("key_id", &"[redacted]")
            .field("hmac_base64", &"[redacted]")
            .finish()
    }
}
