//! Registration record storage
//!
//! Persists the write-once account inputs together with the account URL the
//! CA assigned, so later invocations can refresh or deactivate the account.
//!
//! # Directory Structure
//!
//! ```text
//! storage/
//! └── accounts/
//!     ├── primary.json      # one record per managed account
//!     └── zerossl.json
//! ```
//!
//! Each record holds `account_key_pem`, `email_address`, the optional
//! `external_account_binding` (`key_id`, `hmac_base64`) and
//! `registration_url`. Records contain key material, so the directory is
//! created 0700 and files are written 0600 on Unix.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::error::StoreError;
use crate::model::{AccountKey, AccountRecord, AccountSpec, ExternalAccountBinding};

/// Persisted form of an [`AccountRecord`]
#[derive(Clone, Serialize, Deserialize)]
pub struct StoredAccount {
    pub account_key_pem: String,
    pub email_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_account_binding: Option<StoredExternalAccountBinding>,
    /// Empty means the account does not exist
    #[serde(default)]
    pub registration_url: String,
    pub created: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoredExternalAccountBinding {
    pub key_id: String,
    pub hmac_base64: String,
}

impl fmt::Debug for StoredAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredAccount")
            .field("email_address", &self.email_address)
            .field("external_account_binding", &self.external_account_binding.is_some())
            .field("registration_url", &self.registration_url)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl From<&AccountRecord> for StoredAccount {
    fn from(record: &AccountRecord) -> Self {
        let spec = record.spec();
        Self {
            account_key_pem: spec.key().pem().to_string(),
            email_address: spec.email().to_string(),
            external_account_binding: spec.external_account_binding().map(|eab| {
                StoredExternalAccountBinding {
                    key_id: eab.key_id().to_string(),
                    hmac_base64: eab.hmac_base64().to_string(),
                }
            }),
            registration_url: record.account_url().to_string(),
            created: record.created(),
        }
    }
}

impl StoredAccount {
    /// Rebuild the record; a record without a URL is "does not exist"
    pub fn into_record(self) -> Option<AccountRecord> {
        if self.registration_url.is_empty() {
            return None;
        }

        let spec = AccountSpec::new(
            AccountKey::from_pem(self.account_key_pem),
            self.email_address,
            self.external_account_binding
                .map(|eab| ExternalAccountBinding::new(eab.key_id, eab.hmac_base64)),
        );
        Some(AccountRecord::new(spec, self.registration_url, self.created))
    }
}

/// Persistence for account records, keyed by local account name
pub trait AccountStore: Send + Sync {
    /// Load a record; `None` when the account does not exist
    fn load(&self, name: &str) -> Result<Option<AccountRecord>, StoreError>;

    /// Save a record, replacing any previous one
    fn save(&self, name: &str, record: &AccountRecord) -> Result<(), StoreError>;

    /// Forget a record. Returns whether one existed.
    fn clear(&self, name: &str) -> Result<bool, StoreError>;
}

/// Reject names that would escape the storage directory
fn check_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

/// Filesystem account store
///
/// One JSON document per account under `<base>/accounts/`.
#[derive(Debug)]
pub struct FileAccountStore {
    /// Base storage directory
    base_path: PathBuf,
}

impl FileAccountStore {
    /// Create a store at the given path
    ///
    /// Creates the directory structure if it doesn't exist and sets
    /// restrictive permissions (0700 on Unix).
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        let accounts_path = base_path.join("accounts");
        fs::create_dir_all(&accounts_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_path, perms.clone())?;
            fs::set_permissions(&accounts_path, perms)?;
        }

        info!(
            storage_path = %base_path.display(),
            "Initialized ACME account storage"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    /// Get the storage base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        check_name(name)?;
        Ok(self.base_path.join("accounts").join(format!("{}.json", name)))
    }

    /// List the names of all stored accounts
    pub fn list_accounts(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.base_path.join("accounts"))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl AccountStore for FileAccountStore {
    fn load(&self, name: &str) -> Result<Option<AccountRecord>, StoreError> {
        let path = self.record_path(name)?;

        if !path.exists() {
            trace!(account = %name, "No stored ACME account found");
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let stored: StoredAccount =
            serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            account = %name,
            registration_url = %stored.registration_url,
            "Loaded ACME account record"
        );
        Ok(stored.into_record())
    }

    fn save(&self, name: &str, record: &AccountRecord) -> Result<(), StoreError> {
        let path = self.record_path(name)?;
        let content = serde_json::to_string_pretty(&StoredAccount::from(record))?;

        // write then rename so a crash never leaves a truncated record
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp_path, &path)?;

        info!(
            account = %name,
            registration_url = %record.account_url(),
            "Saved ACME account record"
        );
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.record_path(name)?;

        if path.exists() {
            fs::remove_file(&path)?;
            info!(account = %name, "Cleared ACME account record");
            Ok(true)
        } else {
            warn!(account = %name, "ACME account record to clear not found");
            Ok(false)
        }
    }
}

/// In-memory account store
///
/// Keeps the serialized form so records go through the same conversion as
/// the filesystem store.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    records: DashMap<String, StoredAccount>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AccountStore for MemoryAccountStore {
    fn load(&self, name: &str) -> Result<Option<AccountRecord>, StoreError> {
        Ok(self
            .records
            .get(name)
            .and_then(|stored| stored.value().clone().into_record()))
    }

    fn save(&self, name: &str, record: &AccountRecord) -> Result<(), StoreError> {
        check_name(name)?;
        self.records
            .insert(name.to_string(), StoredAccount::from(record));
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(name).is_some())
    }
}
