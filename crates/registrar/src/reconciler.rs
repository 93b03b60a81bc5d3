//! Account status reconciliation.

use tracing::{debug, warn};

use crate::client::AccountClient;
use crate::error::RegistrarError;
use crate::model::Registration;
use crate::problem::CaOutcome;

/// Result of refreshing an account against the CA
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refreshed {
    /// The account exists; here is its current CA-visible state
    Present(Registration),
    /// The account is gone; the caller must forget its record
    Absent,
}

/// Re-derives account state from the CA
pub struct Reconciler<'a, C: AccountClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: AccountClient + ?Sized> Reconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Fetch the current registration of the account at `account_url`.
    ///
    /// "Account gone" answers and unrecognised status values become
    /// [`Refreshed::Absent`]. Every other failure, including a success
    /// response the client could not decode, is returned unchanged.
    pub async fn refresh(&self, account_url: &str) -> Result<Refreshed, RegistrarError> {
        debug!(account_url = %account_url, "Refreshing ACME account");

        match CaOutcome::from_result(self.client.fetch_registration().await) {
            CaOutcome::Success(registration) if registration.status.is_known() => {
                debug!(
                    account_url = %account_url,
                    status = %registration.status,
                    "ACME account is present"
                );
                Ok(Refreshed::Present(registration))
            }
            CaOutcome::Success(_) => {
                warn!(
                    account_url = %account_url,
                    "CA returned an unrecognised account status, treating the account as gone"
                );
                Ok(Refreshed::Absent)
            }
            CaOutcome::Absent(problem) => {
                warn!(
                    account_url = %account_url,
                    problem_type = %problem.problem_type,
                    detail = ?problem.detail,
                    "ACME account no longer exists"
                );
                Ok(Refreshed::Absent)
            }
            CaOutcome::Fatal(err) => Err(RegistrarError::Refresh(err)),
        }
    }
}
