//! ACME problem documents and "account gone" classification.
//!
//! A CA error counts as "the account no longer exists" only when the HTTP
//! status and the problem type both match one of two exact pairs:
//!
//! | HTTP status | Problem type                                      |
//! |-------------|---------------------------------------------------|
//! | 400         | `urn:ietf:params:acme:error:accountDoesNotExist`  |
//! | 403         | `urn:ietf:params:acme:error:unauthorized`         |
//!
//! Everything else is a real error. A false "gone" silently drops the
//! managed account's identity, so the set stays narrow.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// No account exists for the key (RFC 8555 §7.3.1, `onlyReturnExisting`)
pub const ACCOUNT_DOES_NOT_EXIST: &str = "urn:ietf:params:acme:error:accountDoesNotExist";
/// Usually returned for a deactivated account
pub const UNAUTHORIZED: &str = "urn:ietf:params:acme:error:unauthorized";
pub const MALFORMED: &str = "urn:ietf:params:acme:error:malformed";
pub const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";
pub const EXTERNAL_ACCOUNT_REQUIRED: &str =
    "urn:ietf:params:acme:error:externalAccountRequired";
pub const USER_ACTION_REQUIRED: &str = "urn:ietf:params:acme:error:userActionRequired";
pub const RATE_LIMITED: &str = "urn:ietf:params:acme:error:rateLimited";

/// RFC 7807 problem document as returned by ACME servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Problem type URN
    #[serde(rename = "type", default)]
    pub problem_type: String,
    /// Human readable explanation from the CA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Status echoed in the body; classification uses the HTTP status instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.problem_type, detail),
            None => write!(f, "{}", self.problem_type),
        }
    }
}

/// How a CA error affects the managed account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The account no longer exists; forget the record
    AccountGone,
    /// A real error; surface it
    Fatal,
}

/// Classify an `(HTTP status, problem type)` pair
pub fn classify(http_status: u16, problem_type: &str) -> Classification {
    match (http_status, problem_type) {
        (400, ACCOUNT_DOES_NOT_EXIST) => Classification::AccountGone,
        (403, UNAUTHORIZED) => Classification::AccountGone,
        _ => Classification::Fatal,
    }
}

/// Classify a client error. Anything without a problem document is fatal.
pub fn classify_error(err: &ClientError) -> Classification {
    match err {
        ClientError::Problem { status, problem } => classify(*status, &problem.problem_type),
        _ => Classification::Fatal,
    }
}

/// Result of one CA round trip, after classification
#[derive(Debug)]
pub enum CaOutcome<T> {
    /// The CA answered successfully
    Success(T),
    /// The CA says the account is gone
    Absent(Problem),
    /// Any other failure, unchanged
    Fatal(ClientError),
}

impl<T> CaOutcome<T> {
    pub fn from_result(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(value) => CaOutcome::Success(value),
            Err(err) => match classify_error(&err) {
                Classification::AccountGone => match err {
                    ClientError::Problem { problem, .. } => CaOutcome::Absent(problem),
                    other => CaOutcome::Fatal(other),
                },
                Classification::Fatal => CaOutcome::Fatal(err),
            },
        }
    }
}
