//! ACME Account Registrar
//!
//! Manages the lifecycle of ACME (RFC 8555) accounts: registration with or
//! without External Account Binding, refresh of the CA-visible state, and
//! deactivation.
//!
//! # Architecture
//!
//! - [`Registrar`] - Creates and deletes accounts through an [`AccountClient`]
//! - [`Reconciler`] - Re-reads account state and detects accounts the CA lost
//! - [`classify`] - Decides whether a CA error means "account gone"
//! - [`AccountManager`] - Ties the above to an [`AccountStore`]
//! - [`HttpClientFactory`] - reqwest-backed client for real CAs
//!
//! # Example
//!
//! ```ignore
//! use acme_registrar::{AccountKey, AccountManager, AccountSpec, FileAccountStore, HttpClientFactory};
//! use registrar_config::AcmeConfig;
//!
//! let factory = HttpClientFactory::new(&AcmeConfig::default())?;
//! let store = FileAccountStore::new(Path::new("/var/lib/acme-registrar"))?;
//! let manager = AccountManager::new(factory, store);
//!
//! let spec = AccountSpec::new(AccountKey::from_pem(pem), "admin@example.com", None);
//! let outcome = manager.apply("primary", spec).await?;
//! println!("account: {}", outcome.state().account_url);
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod client;
pub mod error;
pub mod http;
pub mod manager;
pub mod model;
pub mod problem;
pub mod reconciler;
pub mod registrar;
pub mod storage;

#[cfg(test)]
mod testing;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Client boundary
pub use client::{AccountClient, AccountResource, ClientFactory, EabCredentials, NewAccountRequest};
pub use http::{HttpAccountClient, HttpClientFactory};

// Errors and classification
pub use error::{ClientError, RegistrarError, StoreError};
pub use problem::{classify, classify_error, CaOutcome, Classification, Problem};

// Account model
pub use model::{
    AccountKey, AccountRecord, AccountSpec, AccountStatus, ExternalAccountBinding, Registration,
};

// Lifecycle
pub use manager::{AccountManager, AccountState, ApplyOutcome};
pub use reconciler::{Reconciler, Refreshed};
pub use registrar::{Deletion, Registrar};

// Persistence
pub use storage::{AccountStore, FileAccountStore, MemoryAccountStore, StoredAccount};
