//! Error types for the account registrar.

use thiserror::Error;

use crate::problem::{Problem, BAD_NONCE};

/// Errors produced at the ACME client boundary
///
/// Structured problem documents are decoded here, so everything above the
/// client works with a typed value instead of inspecting transport errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection, TLS or timeout failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The CA answered with an RFC 7807 problem document
    #[error("CA returned HTTP {status}: {problem}")]
    Problem { status: u16, problem: Problem },

    /// Non-success response without a usable problem document
    #[error("unexpected HTTP {status} response from CA: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Success response that could not be understood
    #[error("invalid response from CA: {0}")]
    InvalidResponse(String),

    /// The account key could not be loaded or used for signing
    #[error("account key error: {0}")]
    Key(String),
}

impl ClientError {
    /// The problem document carried by this error, if any
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            ClientError::Problem { problem, .. } => Some(problem),
            _ => None,
        }
    }

    /// Whether the CA rejected the request's replay nonce
    pub fn is_bad_nonce(&self) -> bool {
        self.problem()
            .is_some_and(|p| p.problem_type == BAD_NONCE)
    }
}

/// Errors from the registration store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid account name '{0}'")]
    InvalidName(String),

    #[error("corrupt account record '{name}': {reason}")]
    Corrupt { name: String, reason: String },
}

/// Errors surfaced by account lifecycle operations
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// Malformed external account binding input, caught before any CA call
    #[error("invalid external account binding: {0}")]
    InvalidExternalAccountBinding(String),

    /// The client factory could not produce a client
    #[error("failed to build ACME client: {0}")]
    Client(#[source] ClientError),

    #[error("account registration failed: {0}")]
    Registration(#[source] ClientError),

    #[error("account deactivation failed: {0}")]
    Deactivation(#[source] ClientError),

    #[error("account refresh failed: {0}")]
    Refresh(#[source] ClientError),

    /// The CA reported the account gone right after creating it
    #[error("account {0} was reported missing immediately after registration")]
    VanishedAfterCreate(String),

    #[error("account store error: {0}")]
    Store(#[from] StoreError),
}

impl RegistrarError {
    /// The CA problem document behind this error, if any
    pub fn problem(&self) -> Option<&Problem> {
        match self {
            RegistrarError::Client(e)
            | RegistrarError::Registration(e)
            | RegistrarError::Deactivation(e)
            | RegistrarError::Refresh(e) => e.problem(),
            _ => None,
        }
    }
}
