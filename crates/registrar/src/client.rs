//! Client boundary consumed by the registrar and reconciler.
//!
//! A [`ClientFactory`] turns account key material into an [`AccountClient`]
//! whose requests are all authenticated as that key. Endpoint settings
//! (directory URL, timeouts, TLS) belong to the factory; the lifecycle
//! logic never sees them.

use async_trait::async_trait;

use crate::error::ClientError;
use crate::model::{AccountKey, Registration};

/// `newAccount` request fields chosen by the registrar
#[derive(Debug, Clone)]
pub struct NewAccountRequest<'a> {
    pub contact: &'a [String],
    pub terms_of_service_agreed: bool,
}

/// Decoded external account binding credentials
pub struct EabCredentials<'a> {
    pub key_id: &'a str,
    pub hmac_key: &'a [u8],
}

/// Account created or located by the CA
#[derive(Debug, Clone)]
pub struct AccountResource {
    /// Account URL from the `Location` header
    pub url: String,
    pub registration: Registration,
}

/// ACME operations on the account bound to one key
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Plain `newAccount` registration
    async fn register(
        &self,
        request: &NewAccountRequest<'_>,
    ) -> Result<AccountResource, ClientError>;

    /// `newAccount` registration carrying an external account binding
    async fn register_with_eab(
        &self,
        request: &NewAccountRequest<'_>,
        eab: &EabCredentials<'_>,
    ) -> Result<AccountResource, ClientError>;

    /// Current registration of the bound account
    async fn fetch_registration(&self) -> Result<Registration, ClientError>;

    /// Deactivate the bound account
    async fn deactivate(&self) -> Result<(), ClientError>;
}

/// Builds clients bound to a specific account key
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: AccountClient;

    /// Build a client for `key`.
    ///
    /// `account_url` is the stored account URL when one exists; clients
    /// without one can still register or look the account up by key.
    async fn build_client(
        &self,
        key: &AccountKey,
        account_url: Option<&str>,
    ) -> Result<Self::Client, ClientError>;
}
