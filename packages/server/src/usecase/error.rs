//! UseCase 層のエラー定義

use std::time::Duration;

use thiserror::Error;

use crate::domain::{CredentialError, GatewayError, ValueObjectError};

/// Errors returned by `SessionRegistry::start`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartSessionError {
    /// The session id does not have the expected shape. Nothing was touched.
    #[error("invalid session id: {0}")]
    InvalidCredentialFormat(#[from] ValueObjectError),

    /// A non-terminal session exists; stop it first
    #[error("a session for '{0}' is already active")]
    AlreadyActive(String),

    /// The credential bundle could not be retrieved or stored
    #[error(transparent)]
    CredentialFetchFailed(#[from] CredentialError),
}

/// Failure while reacting or replying to an inbound event.
///
/// Only ever logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("send failed: {0}")]
    Send(#[from] GatewayError),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}
