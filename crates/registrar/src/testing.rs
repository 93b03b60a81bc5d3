//! In-process fake CA for lifecycle tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::client::{AccountClient, AccountResource, ClientFactory, EabCredentials, NewAccountRequest};
use crate::error::ClientError;
use crate::model::{AccountKey, AccountStatus, Registration};
use crate::problem::{Problem, ACCOUNT_DOES_NOT_EXIST, EXTERNAL_ACCOUNT_REQUIRED, MALFORMED, UNAUTHORIZED};

pub fn problem(status: u16, problem_type: &str) -> ClientError {
    ClientError::Problem {
        status,
        problem: Problem {
            problem_type: problem_type.to_string(),
            detail: Some(format!("fake CA: {}", problem_type)),
            status: Some(status),
        },
    }
}

#[derive(Debug, Clone)]
struct FakeAccount {
    url: String,
    key_pem: String,
    status: AccountStatus,
    contact: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    accounts: Vec<FakeAccount>,
    next_id: u32,
    /// key id -> HMAC key, when set every registration needs EAB
    eab_keys: Option<HashMap<String, Vec<u8>>>,
    /// Errors returned by the next fetch/deactivate calls, in order
    scripted: Vec<ClientError>,
    register_calls: usize,
    deactivate_calls: usize,
}

/// Shared fake CA state; clients built from it see the same accounts
#[derive(Clone, Default)]
pub struct FakeCa {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCa {
    pub fn new() -> Self {
        Self::default()
    }

    /// A CA that only accepts EAB registrations with these credentials
    pub fn requiring_eab(key_id: &str, hmac_key: &[u8]) -> Self {
        let ca = Self::new();
        ca.state.lock().eab_keys = Some(HashMap::from([(key_id.to_string(), hmac_key.to_vec())]));
        ca
    }

    pub fn client(&self, key_pem: &str, account_url: Option<&str>) -> FakeClient {
        FakeClient {
            ca: self.clone(),
            key_pem: key_pem.to_string(),
            account_url: account_url.map(str::to_string),
        }
    }

    /// Queue an error for the next fetch or deactivate call
    pub fn fail_next(&self, err: ClientError) {
        self.state.lock().scripted.push(err);
    }

    /// Remove the account out of band, as an operator deleting it at the CA
    pub fn forget(&self, url: &str) {
        self.state.lock().accounts.retain(|a| a.url != url);
    }

    pub fn status_of(&self, url: &str) -> Option<AccountStatus> {
        self.state
            .lock()
            .accounts
            .iter()
            .find(|a| a.url == url)
            .map(|a| a.status)
    }

    /// Overwrite the status the CA reports for an account
    pub fn set_status(&self, url: &str, status: AccountStatus) {
        if let Some(account) = self.state.lock().accounts.iter_mut().find(|a| a.url == url) {
            account.status = status;
        }
    }

    pub fn register_calls(&self) -> usize {
        self.state.lock().register_calls
    }

    pub fn deactivate_calls(&self) -> usize {
        self.state.lock().deactivate_calls
    }

    fn create(&self, key_pem: &str, contact: &[String]) -> AccountResource {
        let mut state = self.state.lock();
        if let Some(existing) = state.accounts.iter().find(|a| a.key_pem == key_pem) {
            return resource(existing);
        }
        state.next_id += 1;
        let account = FakeAccount {
            url: format!("https://ca.example/acct/{}", state.next_id),
            key_pem: key_pem.to_string(),
            status: AccountStatus::Valid,
            contact: contact.to_vec(),
        };
        state.accounts.push(account.clone());
        resource(&account)
    }

    fn take_scripted(&self) -> Option<ClientError> {
        let mut state = self.state.lock();
        if state.scripted.is_empty() {
            None
        } else {
            Some(state.scripted.remove(0))
        }
    }
}

fn resource(account: &FakeAccount) -> AccountResource {
    AccountResource {
        url: account.url.clone(),
        registration: Registration {
            status: account.status,
            contact: account.contact.clone(),
            terms_of_service_agreed: Some(true),
            orders: Some(format!("{}/orders", account.url)),
        },
    }
}

pub struct FakeClient {
    ca: FakeCa,
    key_pem: String,
    account_url: Option<String>,
}

impl FakeClient {
    fn bound_account(&self) -> Result<FakeAccount, ClientError> {
        let state = self.ca.state.lock();
        let found = match &self.account_url {
            Some(url) => state
                .accounts
                .iter()
                .find(|a| &a.url == url && a.key_pem == self.key_pem),
            None => state.accounts.iter().find(|a| a.key_pem == self.key_pem),
        };
        match found {
            Some(account) if account.status != AccountStatus::Deactivated => Ok(account.clone()),
            Some(_) => Err(problem(403, UNAUTHORIZED)),
            None => Err(problem(400, ACCOUNT_DOES_NOT_EXIST)),
        }
    }
}

#[async_trait]
impl AccountClient for FakeClient {
    async fn register(
        &self,
        request: &NewAccountRequest<'_>,
    ) -> Result<AccountResource, ClientError> {
        self.ca.state.lock().register_calls += 1;
        if self.ca.state.lock().eab_keys.is_some() {
            return Err(problem(400, EXTERNAL_ACCOUNT_REQUIRED));
        }
        assert!(request.terms_of_service_agreed);
        Ok(self.ca.create(&self.key_pem, request.contact))
    }

    async fn register_with_eab(
        &self,
        request: &NewAccountRequest<'_>,
        eab: &EabCredentials<'_>,
    ) -> Result<AccountResource, ClientError> {
        self.ca.state.lock().register_calls += 1;
        let accepted = match &self.ca.state.lock().eab_keys {
            Some(keys) => keys.get(eab.key_id).is_some_and(|k| k == eab.hmac_key),
            None => false,
        };
        if !accepted {
            return Err(problem(400, MALFORMED));
        }
        assert!(request.terms_of_service_agreed);
        Ok(self.ca.create(&self.key_pem, request.contact))
    }

    async fn fetch_registration(&self) -> Result<Registration, ClientError> {
        if let Some(err) = self.ca.take_scripted() {
            return Err(err);
        }
        self.bound_account().map(|a| resource(&a).registration)
    }

    async fn deactivate(&self) -> Result<(), ClientError> {
        self.ca.state.lock().deactivate_calls += 1;
        if let Some(err) = self.ca.take_scripted() {
            return Err(err);
        }
        let account = self.bound_account()?;
        let mut state = self.ca.state.lock();
        if let Some(a) = state.accounts.iter_mut().find(|a| a.url == account.url) {
            a.status = AccountStatus::Deactivated;
        }
        Ok(())
    }
}

#[async_trait]
impl ClientFactory for FakeCa {
    type Client = FakeClient;

    async fn build_client(
        &self,
        key: &AccountKey,
        account_url: Option<&str>,
    ) -> Result<FakeClient, ClientError> {
        Ok(self.client(key.pem(), account_url))
    }
}
