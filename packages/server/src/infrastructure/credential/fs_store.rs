//! Filesystem-backed credential store.
//!
//! Layout: `<root>/<user_id>/creds.json` plus whatever key files the protocol
//! library adds next to it.

use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;

use crate::domain::{CredentialError, CredentialStore, UserId};

/// File the pre-provisioned bundle is written to.
pub const CREDS_FILE: &str = "creds.json";

pub struct FsCredentialStore {
    root: PathBuf,
}

impl FsCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CredentialStore for FsCredentialStore {
    fn path_for(&self, user_id: &UserId) -> PathBuf {
        self.root.join(user_id.as_str())
    }

    async fn prepare(&self, user_id: &UserId) -> Result<PathBuf, CredentialError> {
        let dir = self.path_for(user_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CredentialError::Storage(format!("{}: {e}", dir.display())))?;
        Ok(dir)
    }

    async fn write_bundle(
        &self,
        user_id: &UserId,
        bundle: &[u8],
    ) -> Result<PathBuf, CredentialError> {
        let dir = self.prepare(user_id).await?;
        let file = dir.join(CREDS_FILE);
        tokio::fs::write(&file, bundle)
            .await
            .map_err(|e| CredentialError::Storage(format!("{}: {e}", file.display())))?;
        tracing::debug!("Wrote credential bundle for '{}' to {}", user_id, file.display());
        Ok(dir)
    }

    async fn purge(&self, user_id: &UserId) -> Result<(), CredentialError> {
        let dir = self.path_for(user_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialError::Storage(format!("{}: {e}", dir.display()))),
        }
    }
}
