//! Credential provisioning traits.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{
    error::CredentialError,
    value_object::{SessionId, UserId},
};

/// Resolves a session id to the bytes of a credential bundle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch(&self, session_id: &SessionId) -> Result<Vec<u8>, CredentialError>;
}

/// Owns the per-user credential directories.
///
/// Directory contents are opaque: the protocol library keeps them current.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    fn path_for(&self, user_id: &UserId) -> PathBuf;

    /// Make sure the user's directory exists and return it.
    async fn prepare(&self, user_id: &UserId) -> Result<PathBuf, CredentialError>;

    /// Seed the directory with a fetched bundle.
    async fn write_bundle(&self, user_id: &UserId, bundle: &[u8])
    -> Result<PathBuf, CredentialError>;

    /// Delete the user's directory. Missing directories are fine.
    async fn purge(&self, user_id: &UserId) -> Result<(), CredentialError>;
}
