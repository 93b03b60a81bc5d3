//! reqwest-backed ACME client
//!
//! Implements [`ClientFactory`] and [`AccountClient`] against a live ACME
//! server. Requests are signed with the account key (ES256, ES384 or RS256)
//! and carry replay nonces collected from earlier responses.
//!
//! # Request flow
//!
//! 1. The directory is fetched once per factory and shared by every client
//! 2. Each signed POST consumes a nonce, fetching one from `newNonce` when
//!    the pool is empty
//! 3. A `badNonce` rejection is resent once with a fresh nonce
//! 4. Non-success responses are decoded into [`Problem`] documents

mod directory;
mod jws;
mod key;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use registrar_config::AcmeConfig;

pub use directory::{Directory, DirectoryMeta};
pub use key::AccountSigner;

use jws::KeyId;

use crate::client::{AccountClient, AccountResource, ClientFactory, EabCredentials, NewAccountRequest};
use crate::error::ClientError;
use crate::model::{AccountKey, Registration};
use crate::problem::Problem;

const REPLAY_NONCE: &str = "replay-nonce";
const JOSE_JSON: &str = "application/jose+json";

/// Builds [`HttpAccountClient`]s for one ACME directory
pub struct HttpClientFactory {
    http: reqwest::Client,
    directory_url: String,
    directory: OnceCell<Arc<Directory>>,
    nonces: Arc<NoncePool>,
}

impl HttpClientFactory {
    /// Create a factory from endpoint settings
    pub fn new(config: &AcmeConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(transport)?;

        Ok(Self::with_http_client(http, &config.directory_url))
    }

    /// Create a factory around an existing reqwest client
    pub fn with_http_client(http: reqwest::Client, directory_url: impl Into<String>) -> Self {
        Self {
            http,
            directory_url: directory_url.into(),
            directory: OnceCell::new(),
            nonces: Arc::new(NoncePool::default()),
        }
    }

    /// The CA directory, fetched on first use
    pub async fn directory(&self) -> Result<Arc<Directory>, ClientError> {
        self.directory
            .get_or_try_init(|| async {
                debug!(url = %self.directory_url, "Fetching ACME directory");

                let response = self
                    .http
                    .get(&self.directory_url)
                    .send()
                    .await
                    .map_err(transport)?;
                if !response.status().is_success() {
                    return Err(error_from_response(response).await);
                }

                let directory: Directory = response.json().await.map_err(|e| {
                    ClientError::InvalidResponse(format!("malformed directory: {}", e))
                })?;

                if directory.meta.external_account_required {
                    debug!("CA requires external account binding");
                }
                Ok(Arc::new(directory))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    type Client = HttpAccountClient;

    async fn build_client(
        &self,
        key: &AccountKey,
        account_url: Option<&str>,
    ) -> Result<HttpAccountClient, ClientError> {
        let signer = AccountSigner::from_pem(key.pem())?;
        let directory = self.directory().await?;

        Ok(HttpAccountClient {
            http: self.http.clone(),
            directory,
            signer,
            account_url: RwLock::new(account_url.map(str::to_string)),
            nonces: Arc::clone(&self.nonces),
        })
    }
}

/// Replay nonces handed out by the CA, newest first
#[derive(Default)]
struct NoncePool {
    nonces: Mutex<Vec<String>>,
}

impl NoncePool {
    fn take(&self) -> Option<String> {
        self.nonces.lock().pop()
    }

    fn stash(&self, response: &Response) {
        if let Some(nonce) = response
            .headers()
            .get(REPLAY_NONCE)
            .and_then(|v| v.to_str().ok())
        {
            self.nonces.lock().push(nonce.to_string());
        }
    }
}

/// ACME client authenticated as one account key
pub struct HttpAccountClient {
    http: reqwest::Client,
    directory: Arc<Directory>,
    signer: AccountSigner,
    /// Account URL once known; requests then use `kid` instead of `jwk`
    account_url: RwLock<Option<String>>,
    nonces: Arc<NoncePool>,
}

impl HttpAccountClient {
    /// Account URL this client is bound to, if any
    pub fn account_url(&self) -> Option<String> {
        self.account_url.read().clone()
    }

    async fn nonce(&self) -> Result<String, ClientError> {
        if let Some(nonce) = self.nonces.take() {
            return Ok(nonce);
        }

        trace!(url = %self.directory.new_nonce, "Requesting fresh nonce");
        let response = self
            .http
            .head(&self.directory.new_nonce)
            .send()
            .await
            .map_err(transport)?;

        response
            .headers()
            .get(REPLAY_NONCE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::InvalidResponse("newNonce response has no Replay-Nonce".to_string())
            })
    }

    /// Signed POST, resent once if the CA rejects the nonce
    async fn post(
        &self,
        url: &str,
        key_id: KeyId<'_>,
        payload: Option<&Value>,
    ) -> Result<Response, ClientError> {
        let mut resent = false;
        loop {
            let nonce = self.nonce().await?;
            let body = jws::sign(&self.signer, key_id, &nonce, url, payload)?;

            let response = self
                .http
                .post(url)
                .header(CONTENT_TYPE, JOSE_JSON)
                .body(body.to_string())
                .send()
                .await
                .map_err(transport)?;
            self.nonces.stash(&response);

            if response.status().is_success() {
                return Ok(response);
            }

            let err = error_from_response(response).await;
            if err.is_bad_nonce() && !resent {
                debug!(url = %url, "CA rejected nonce, retrying with a fresh one");
                resent = true;
                continue;
            }
            return Err(err);
        }
    }

    /// POST to `newAccount` authenticated by the embedded public key.
    ///
    /// A creating request may get an empty body back; a lookup may not,
    /// since its registration is the answer to a refresh.
    async fn post_new_account(
        &self,
        payload: Value,
        body: AccountBody,
    ) -> Result<AccountResource, ClientError> {
        let response = self
            .post(&self.directory.new_account, KeyId::Jwk, Some(&payload))
            .await?;

        let url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                ClientError::InvalidResponse("newAccount response has no Location".to_string())
            })?;
        let existing = response.status() == StatusCode::OK;
        let registration = match body {
            AccountBody::Optional => created_registration(response).await?,
            AccountBody::Required => registration_from_response(response).await?,
        };

        debug!(account_url = %url, existing, "CA returned account");
        *self.account_url.write() = Some(url.clone());

        Ok(AccountResource { url, registration })
    }

    fn new_account_payload(request: &NewAccountRequest<'_>) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert(
            "termsOfServiceAgreed".to_string(),
            Value::Bool(request.terms_of_service_agreed),
        );
        if !request.contact.is_empty() {
            payload.insert("contact".to_string(), json!(request.contact));
        }
        payload
    }

    /// Bound account URL, looking the account up by key if unbound
    async fn resolve_account_url(&self) -> Result<String, ClientError> {
        if let Some(url) = self.account_url() {
            return Ok(url);
        }

        let lookup = self
            .post_new_account(json!({ "onlyReturnExisting": true }), AccountBody::Required)
            .await?;
        Ok(lookup.url)
    }
}

#[async_trait]
impl AccountClient for HttpAccountClient {
    async fn register(
        &self,
        request: &NewAccountRequest<'_>,
    ) -> Result<AccountResource, ClientError> {
        if self.directory.meta.external_account_required {
            warn!(
                "CA directory requires external account binding; \
                 registering without one will likely be rejected"
            );
        }

        let payload = Self::new_account_payload(request);
        self.post_new_account(Value::Object(payload), AccountBody::Optional)
            .await
    }

    async fn register_with_eab(
        &self,
        request: &NewAccountRequest<'_>,
        eab: &EabCredentials<'_>,
    ) -> Result<AccountResource, ClientError> {
        let mut payload = Self::new_account_payload(request);
        payload.insert(
            "externalAccountBinding".to_string(),
            jws::external_account_binding(
                &self.signer,
                eab.key_id,
                eab.hmac_key,
                &self.directory.new_account,
            ),
        );
        self.post_new_account(Value::Object(payload), AccountBody::Optional)
            .await
    }

    async fn fetch_registration(&self) -> Result<Registration, ClientError> {
        let Some(url) = self.account_url() else {
            let lookup = self
                .post_new_account(json!({ "onlyReturnExisting": true }), AccountBody::Required)
                .await?;
            return Ok(lookup.registration);
        };

        let response = self.post(&url, KeyId::Kid(&url), None).await?;
        registration_from_response(response).await
    }

    async fn deactivate(&self) -> Result<(), ClientError> {
        let url = self.resolve_account_url().await?;
        self.post(&url, KeyId::Kid(&url), Some(&json!({ "status": "deactivated" })))
            .await?;
        Ok(())
    }
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport(err.to_string())
}

/// Whether a `newAccount` response must carry the account object
#[derive(Debug, Clone, Copy)]
enum AccountBody {
    Optional,
    Required,
}

/// Account object from a success response; empty or status-less bodies are errors
async fn registration_from_response(response: Response) -> Result<Registration, ClientError> {
    let body = response.bytes().await.map_err(transport)?;
    if body.is_empty() {
        return Err(ClientError::InvalidResponse(
            "empty account object".to_string(),
        ));
    }
    serde_json::from_slice(&body)
        .map_err(|e| ClientError::InvalidResponse(format!("malformed account object: {}", e)))
}

/// Account object from a creating `newAccount` response, which may be empty
async fn created_registration(response: Response) -> Result<Registration, ClientError> {
    let body = response.bytes().await.map_err(transport)?;
    if body.is_empty() {
        return Ok(Registration::default());
    }
    serde_json::from_slice(&body)
        .map_err(|e| ClientError::InvalidResponse(format!("malformed account object: {}", e)))
}

/// Decode a non-success response into a problem document when possible
async fn error_from_response(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return transport(e),
    };

    match serde_json::from_str::<Problem>(&body) {
        Ok(problem) if !problem.problem_type.is_empty() => {
            ClientError::Problem { status, problem }
        }
        _ => ClientError::UnexpectedStatus { status, body },
    }
}
