//! Per-account orchestration over the registrar, reconciler and store.
//!
//! This is the caller side of the lifecycle: it persists the account URL
//! right after creation, clears records the CA reports as gone, and turns a
//! change to any write-once input into delete followed by create.
//! Operations for one account name must not run concurrently.

use tracing::{debug, info, warn};

use crate::client::ClientFactory;
use crate::error::RegistrarError;
use crate::model::{AccountRecord, AccountSpec, Registration};
use crate::reconciler::{Reconciler, Refreshed};
use crate::registrar::{Deletion, Registrar};
use crate::storage::AccountStore;

/// A live account and its current CA-visible state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub account_url: String,
    pub registration: Registration,
}

/// What [`AccountManager::apply`] had to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No record existed (or the CA had lost it); a new account was created
    Created(AccountState),
    /// The stored account is still live and matches the requested inputs
    Unchanged(AccountState),
    /// A write-once input changed; the old account was deleted first
    Replaced {
        previous_url: String,
        state: AccountState,
    },
}

impl ApplyOutcome {
    pub fn state(&self) -> &AccountState {
        match self {
            ApplyOutcome::Created(state) | ApplyOutcome::Unchanged(state) => state,
            ApplyOutcome::Replaced { state, .. } => state,
        }
    }
}

/// Drives account lifecycles against one CA and one store
pub struct AccountManager<F, S> {
    factory: F,
    store: S,
}

impl<F: ClientFactory, S: AccountStore> AccountManager<F, S> {
    pub fn new(factory: F, store: S) -> Self {
        Self { factory, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Make sure an account matching `spec` exists under `name`
    pub async fn apply(&self, name: &str, spec: AccountSpec) -> Result<ApplyOutcome, RegistrarError> {
        let Some(existing) = self.store.load(name)? else {
            return self.create(name, spec).await.map(ApplyOutcome::Created);
        };

        if !existing.spec().same_account_as(&spec) {
            info!(
                account = %name,
                account_url = %existing.account_url(),
                "Write-once account fields changed, replacing ACME account"
            );
            self.delete_record(name, &existing).await?;
            let state = self.create(name, spec).await?;
            return Ok(ApplyOutcome::Replaced {
                previous_url: existing.account_url().to_string(),
                state,
            });
        }

        match self.refresh_record(name, &existing).await? {
            Some(state) => Ok(ApplyOutcome::Unchanged(state)),
            None => {
                info!(account = %name, "Recreating ACME account that no longer exists");
                self.create(name, spec).await.map(ApplyOutcome::Created)
            }
        }
    }

    /// Refresh the stored account, forgetting it if the CA reports it gone
    pub async fn read(&self, name: &str) -> Result<Option<AccountState>, RegistrarError> {
        match self.store.load(name)? {
            Some(record) => self.refresh_record(name, &record).await,
            None => {
                debug!(account = %name, "No ACME account record to read");
                Ok(None)
            }
        }
    }

    /// Deactivate the stored account and forget it
    pub async fn destroy(&self, name: &str) -> Result<Option<Deletion>, RegistrarError> {
        match self.store.load(name)? {
            Some(record) => self.delete_record(name, &record).await.map(Some),
            None => {
                debug!(account = %name, "No ACME account record to destroy");
                Ok(None)
            }
        }
    }

    async fn create(&self, name: &str, spec: AccountSpec) -> Result<AccountState, RegistrarError> {
        let client = self
            .factory
            .build_client(spec.key(), None)
            .await
            .map_err(RegistrarError::Client)?;

        let record = Registrar::new(&client).create(spec).await?;
        self.store.save(name, &record)?;

        self.refresh_record(name, &record)
            .await?
            .ok_or_else(|| RegistrarError::VanishedAfterCreate(record.account_url().to_string()))
    }

    async fn refresh_record(
        &self,
        name: &str,
        record: &AccountRecord,
    ) -> Result<Option<AccountState>, RegistrarError> {
        let client = self
            .factory
            .build_client(record.spec().key(), Some(record.account_url()))
            .await
            .map_err(RegistrarError::Client)?;

        match Reconciler::new(&client).refresh(record.account_url()).await? {
            Refreshed::Present(registration) => Ok(Some(AccountState {
                account_url: record.account_url().to_string(),
                registration,
            })),
            Refreshed::Absent => {
                warn!(
                    account = %name,
                    account_url = %record.account_url(),
                    "ACME account is gone, clearing stored record"
                );
                self.store.clear(name)?;
                Ok(None)
            }
        }
    }

    async fn delete_record(&self, name: &str, record: &AccountRecord) -> Result<Deletion, RegistrarError> {
        let client = self
            .factory
            .build_client(record.spec().key(), Some(record.account_url()))
            .await
            .map_err(RegistrarError::Client)?;

        let deletion = Registrar::new(&client).delete(record.account_url()).await?;
        self.store.clear(name)?;
        Ok(deletion)
    }
}
