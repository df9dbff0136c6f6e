//! Domain layer error definitions.

use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// UserId validation error
    #[error("UserId cannot be empty")]
    UserIdEmpty,

    /// UserId too long error
    #[error("UserId cannot exceed {max} characters (got {actual})")]
    UserIdTooLong { max: usize, actual: usize },

    /// UserId contains characters unusable in a directory name
    #[error("UserId may only contain ASCII letters, digits, '-', '_' and '.' (got: {0})")]
    UserIdInvalidFormat(String),

    #[error("session id cannot be empty")]
    SessionIdEmpty,

    #[error("session id must start with '{prefix}'")]
    SessionIdMissingPrefix { prefix: String },

    #[error("session id has nothing after the prefix")]
    SessionIdEmptyPayload,

    #[error("session id payload must not contain whitespace")]
    SessionIdInvalidPayload,

    #[error("session prefix must be a name followed by '~' (got: {0:?})")]
    SessionPrefixInvalid(String),

    #[error("invalid JID: {0}")]
    JidInvalidFormat(String),
}

/// Errors raised when building a reconnect policy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("reconnect delay must be greater than zero")]
    ZeroDelay,

    #[error("maximum reconnect delay must not be smaller than the base delay")]
    MaxDelayBelowBase,
}

/// Errors returned by the session repository
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Errors reported by a WhatsApp gateway implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send: {0}")]
    Send(String),

    #[error("connection is closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors raised while provisioning a credential bundle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential fetch failed: {0}")]
    Fetch(String),

    #[error("credential payload could not be decoded: {0}")]
    Decode(String),

    #[error("credential storage error: {0}")]
    Storage(String),
}
