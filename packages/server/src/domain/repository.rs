//! Repository trait for sessions.
//!
//! 実装は infrastructure 層に置き、UseCase 層はこの trait にのみ依存します（依存性の逆転）。

use async_trait::async_trait;

use super::{entity::Session, error::RepositoryError, value_object::UserId};

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace the session of `session.user_id`.
    async fn insert(&self, session: Session);

    async fn get(&self, user_id: &UserId) -> Option<Session>;

    /// Apply `change` to an existing session and return the updated copy.
    ///
    /// # Errors
    ///
    /// `RepositoryError::SessionNotFound` when the entry was removed.
    async fn update(
        &self,
        user_id: &UserId,
        change: &(dyn for<'a> Fn(&'a mut Session) + Send + Sync),
    ) -> Result<Session, RepositoryError>;

    /// Remove and return the entry, `None` when absent.
    async fn remove(&self, user_id: &UserId) -> Option<Session>;

    /// All sessions sorted by user id.
    async fn list(&self) -> Vec<Session>;
}
