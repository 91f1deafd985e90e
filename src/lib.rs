pub mod client;
pub mod commands;
pub mod http;
pub mod http_client;
pub mod parameters;
pub mod renewal;
pub mod session;
pub mod store;
pub mod token;

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to callers of the session lifecycle and request pipeline.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Login was rejected by the server. User-correctable.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Registration fields were rejected by the server. User-correctable.
    #[error("registration rejected: {0}")]
    Validation(ValidationErrors),
    /// No valid session could be established, even after a renewal attempt.
    #[error("not authenticated")]
    Unauthenticated,
    /// Transport-level failure. Never retried beyond the single
    /// renewal-triggered replay.
    #[error("network failure: `{0}`")]
    Network(String),
    /// The bounded wait on a credential renewal was exceeded.
    #[error("credential renewal timed out")]
    RenewalTimeout,
    /// The server answered with a body the client could not interpret.
    #[error("invalid response from server: `{0}`")]
    InvalidResponse(String),
    /// The server answered with a status the operation does not know about.
    #[error("unexpected response status: `{0}`")]
    UnexpectedStatus(u16),
    /// An outbound request could not be built.
    #[error("building request: `{0}`")]
    Request(String),
    #[error("credential store failure: `{0}`")]
    Store(#[from] StoreError),
}

/// Per-field registration errors, as reported by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new(fields: BTreeMap<String, Vec<String>>) -> Self {
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}
