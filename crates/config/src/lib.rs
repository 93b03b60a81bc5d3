//! Configuration for the ACME account registrar.
//!
//! The configuration is a KDL document:
//!
//! ```kdl
//! acme {
//!     directory "https://acme-v02.api.letsencrypt.org/directory"
//!     timeout-secs 30
//! }
//! storage {
//!     path "/var/lib/acme-registrar"
//! }
//! account "primary" {
//!     key-file "/etc/acme/account.pem"
//!     email "admin@example.com"
//!     external-account-binding {
//!         key-id "K1"
//!         hmac-base64 "aGVsbG8="
//!     }
//! }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

mod account;
pub mod kdl;
pub mod validate;

pub use account::{
    AccountConfig, AcmeConfig, EabConfig, StorageConfig, LETSENCRYPT_PRODUCTION_DIRECTORY,
    LETSENCRYPT_STAGING_DIRECTORY,
};
pub use validate::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};

/// Top-level registrar configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Certificate authority endpoint
    pub acme: AcmeConfig,
    /// Record storage
    pub storage: StorageConfig,
    /// Managed accounts
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    /// Load configuration from a KDL file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let config = Self::from_kdl(&content)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;

        info!(
            path = %path.display(),
            account_count = config.accounts.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration from KDL source text
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content.parse().map_err(|e: ::kdl::KdlError| {
            let report = miette::Report::new(e).with_source_code(content.to_string());
            anyhow::anyhow!("{:?}", report)
        })?;

        kdl::parse_document(&doc)
    }

    /// Look up an account by name
    pub fn account(&self, name: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.name == name)
    }

    /// Validate the configuration, failing on the first batch of errors
    pub fn validate(&self) -> Result<ValidationResult> {
        let result = validate::validate_config(self);
        if !result.is_ok() {
            let messages: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            anyhow::bail!(
                "Configuration has {} error(s):\n  {}",
                messages.len(),
                messages.join("\n  ")
            );
        }
        Ok(result)
    }
}
