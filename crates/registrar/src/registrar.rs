//! Account creation and deactivation.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::client::{AccountClient, EabCredentials, NewAccountRequest};
use crate::error::{ClientError, RegistrarError};
use crate::model::{AccountRecord, AccountSpec};
use crate::problem::CaOutcome;

/// Outcome of a successful delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    /// The CA accepted the deactivation request
    Deactivated,
    /// The CA reported the account as already gone
    AlreadyGone,
}

/// Creates and deactivates ACME accounts through a bound client
pub struct Registrar<'a, C: AccountClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: AccountClient + ?Sized> Registrar<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Register a new account for `spec`.
    ///
    /// Takes the EAB path when the spec carries a binding and the plain path
    /// otherwise; terms of service are always agreed to. CA rejections are
    /// returned as-is with no retry. The caller must persist the returned
    /// record's URL before issuing any other operation for it.
    pub async fn create(&self, spec: AccountSpec) -> Result<AccountRecord, RegistrarError> {
        let contact = spec.contact();
        let request = NewAccountRequest {
            contact: &contact,
            terms_of_service_agreed: true,
        };

        let result = match spec.external_account_binding() {
            Some(eab) => {
                let hmac_key = eab.decode_hmac()?;
                debug!(email = %spec.email(), "Registering ACME account with external account binding");
                self.client
                    .register_with_eab(
                        &request,
                        &EabCredentials {
                            key_id: eab.key_id(),
                            hmac_key: &hmac_key,
                        },
                    )
                    .await
            }
            None => {
                debug!(email = %spec.email(), "Registering ACME account");
                self.client.register(&request).await
            }
        };

        let resource = result.map_err(RegistrarError::Registration)?;
        if resource.url.is_empty() {
            return Err(RegistrarError::Registration(ClientError::InvalidResponse(
                "CA did not return an account URL".to_string(),
            )));
        }

        info!(
            account_url = %resource.url,
            email = %spec.email(),
            eab = spec.external_account_binding().is_some(),
            status = %resource.registration.status,
            "Registered ACME account"
        );

        Ok(AccountRecord::new(spec, resource.url, Utc::now()))
    }

    /// Deactivate the account the client is bound to.
    ///
    /// An "account gone" answer counts as success, so repeating a delete is
    /// harmless.
    pub async fn delete(&self, account_url: &str) -> Result<Deletion, RegistrarError> {
        debug!(account_url = %account_url, "Deactivating ACME account");

        match CaOutcome::from_result(self.client.deactivate().await) {
            CaOutcome::Success(()) => {
                info!(account_url = %account_url, "Deactivated ACME account");
                Ok(Deletion::Deactivated)
            }
            CaOutcome::Absent(problem) => {
                warn!(
                    account_url = %account_url,
                    problem_type = %problem.problem_type,
                    "ACME account already gone, treating delete as complete"
                );
                Ok(Deletion::AlreadyGone)
            }
            CaOutcome::Fatal(err) => Err(RegistrarError::Deactivation(err)),
        }
    }
}
