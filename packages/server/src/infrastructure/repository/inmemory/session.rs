//! InMemory Session Repository 実装
//!
//! ドメイン層が定義する SessionRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。
//!
//! セッションはプロセスの再起動で失われますが、認証情報はユーザーごとの
//! ディレクトリに残るため、同じ session id で再度 start すれば復帰できます。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{RepositoryError, Session, SessionRepository, UserId};

/// インメモリ Session Repository 実装
#[derive(Default)]
pub struct InMemorySessionRepository {
    /// user_id をキーとしたセッション
    sessions: Arc<Mutex<HashMap<UserId, Session>>>,
}

impl InMemorySessionRepository {
    /// 新しい InMemorySessionRepository を作成
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: Session) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(session.user_id.clone(), session);
    }

    async fn get(&self, user_id: &UserId) -> Option<Session> {
        let sessions = self.sessions.lock().await;
        sessions.get(user_id).cloned()
    }

    async fn update(
        &self,
        user_id: &UserId,
        change: &(dyn for<'a> Fn(&'a mut Session) + Send + Sync),
    ) -> Result<Session, RepositoryError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(user_id)
            .ok_or_else(|| RepositoryError::SessionNotFound(user_id.to_string()))?;
        change(session);
        Ok(session.clone())
    }

    async fn remove(&self, user_id: &UserId) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(user_id)
    }

    async fn list(&self) -> Vec<Session> {
        let sessions = self.sessions.lock().await;
        let mut list: Vec<Session> = sessions.values().cloned().collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }
}
