//! UseCase: セッションレジストリ
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SessionRegistry の start / get / remove / stop
//! - 再接続ポリシー（上限回数、ログアウト、stop によるタイマーのキャンセル）
//!
//! ### なぜこのテストが必要か
//! - 同じ認証情報で 2 つの接続が同時に存在してはならない（プロトコルが禁止している）
//! - 不正な session id はネットワークやファイルに触れる前に拒否する
//! - 再接続は無限に続いてはならない
//!
//! ### どのような状況を想定しているか
//! - 正常系：start → open → welcome、QR / ペアリングコードでのログイン
//! - 異常系：不正な session id、二重 start、認証情報の取得失敗
//! - エッジケース：存在しない user_id の stop、上限ちょうどの再接続、ロック表の後始末

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::domain::{
    CredentialFetcher, CredentialStore, Jid, LoginMode, ReconnectPolicy, Session, SessionId,
    SessionRepository, Timestamp, UserId, WhatsAppGateway, value_object::DEFAULT_SESSION_PREFIX,
};

use super::{
    dispatch::{BotSettings, EventDispatcher},
    error::StartSessionError,
    supervisor::SessionSupervisor,
};

/// Time `stop` waits for a supervisor to close its handle before aborting it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the credentials of a new session come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Raw, unvalidated session id string
    SessionId(String),
    /// Log in by scanning a QR code
    QrPairing,
    /// Log in by entering a code on the phone with this number
    PairingCode { phone: String },
}

/// A validated [`CredentialSource`].
enum Provision {
    Bundle(SessionId),
    Qr,
    /// Digits of the phone number
    Pairing(String),
}

/// Tunables of the registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub session_prefix: String,
    pub policy: ReconnectPolicy,
    pub bot: Arc<BotSettings>,
    pub stop_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            policy: ReconnectPolicy::default(),
            bot: Arc::new(BotSettings::default()),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Collaborators of the registry.
pub struct RegistryDeps {
    pub repository: Arc<dyn SessionRepository>,
    pub gateway: Arc<dyn WhatsAppGateway>,
    pub fetcher: Arc<dyn CredentialFetcher>,
    pub store: Arc<dyn CredentialStore>,
}

struct SupervisorHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

type KeyLocks = StdMutex<HashMap<UserId, Arc<Mutex<()>>>>;

/// Exclusive access to one user id. The lock table entry is dropped together
/// with its last holder, so the table only holds ids in use.
struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    user_id: UserId,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // the table and `self.lock` are the only references left
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}

/// Authoritative mapping of user ids to sessions and their supervisors.
///
/// `start`, `stop` and `remove` on the same user id are serialised; different
/// user ids never wait on each other except for short map updates.
pub struct SessionRegistry {
    repository: Arc<dyn SessionRepository>,
    gateway: Arc<dyn WhatsAppGateway>,
    fetcher: Arc<dyn CredentialFetcher>,
    store: Arc<dyn CredentialStore>,
    settings: RegistrySettings,
    supervisors: Mutex<HashMap<UserId, SupervisorHandle>>,
    key_locks: KeyLocks,
}

impl SessionRegistry {
    pub fn new(deps: RegistryDeps, settings: RegistrySettings) -> Self {
        Self {
            repository: deps.repository,
            gateway: deps.gateway,
            fetcher: deps.fetcher,
            store: deps.store,
            settings,
            supervisors: Mutex::new(HashMap::new()),
            key_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Start a session for `user_id`.
    ///
    /// # Errors
    ///
    /// * `InvalidCredentialFormat` - the session id or phone number is malformed;
    ///   checked before any I/O
    /// * `AlreadyActive` - a non-terminal session exists
    /// * `CredentialFetchFailed` - the bundle could not be fetched or stored
    pub async fn start(
        &self,
        user_id: UserId,
        source: CredentialSource,
    ) -> Result<Session, StartSessionError> {
        let provision = match source {
            CredentialSource::SessionId(raw) => {
                Provision::Bundle(SessionId::parse(&raw, &self.settings.session_prefix)?)
            }
            CredentialSource::QrPairing => Provision::Qr,
            CredentialSource::PairingCode { phone } => {
                Provision::Pairing(Jid::from_phone(&phone)?.user().to_string())
            }
        };

        let _guard = self.lock_key(&user_id).await;

        if let Some(existing) = self.repository.get(&user_id).await
            && !existing.is_terminal()
        {
            return Err(StartSessionError::AlreadyActive(user_id.into_string()));
        }
        // a terminal session's supervisor has released its handle; make sure it is gone
        self.reap(&user_id).await;

        let (credential_path, login_mode, pairing_phone) = match provision {
            Provision::Bundle(session_id) => {
                let bundle = self.fetcher.fetch(&session_id).await?;
                let path = self.store.write_bundle(&user_id, &bundle).await?;
                (path, LoginMode::SessionId, None)
            }
            Provision::Qr => (
                self.store.prepare(&user_id).await?,
                LoginMode::QrPairing,
                None,
            ),
            Provision::Pairing(phone) => (
                self.store.prepare(&user_id).await?,
                LoginMode::PairingCode,
                Some(phone),
            ),
        };

        let mut session = Session::new(
            user_id.clone(),
            credential_path.clone(),
            login_mode,
            Timestamp::now(),
        );
        session.mark_connecting(Timestamp::now());
        self.repository.insert(session.clone()).await;

        let cancel = CancellationToken::new();
        let supervisor = SessionSupervisor {
            user_id: user_id.clone(),
            login_mode,
            pairing_phone,
            auth_dir: credential_path,
            repository: self.repository.clone(),
            gateway: self.gateway.clone(),
            store: self.store.clone(),
            policy: self.settings.policy,
            dispatcher: EventDispatcher::new(user_id.clone(), self.settings.bot.clone()),
            cancel: cancel.clone(),
            welcomed: false,
        };
        let task = tokio::spawn(supervisor.run());
        self.supervisors
            .lock()
            .await
            .insert(user_id.clone(), SupervisorHandle { cancel, task });

        tracing::info!("Session '{}' registered ({:?})", user_id, login_mode);
        Ok(session)
    }

    pub async fn get(&self, user_id: &UserId) -> Option<Session> {
        self.repository.get(user_id).await
    }

    /// All sessions sorted by user id.
    pub async fn list(&self) -> Vec<Session> {
        self.repository.list().await
    }

    pub async fn user_ids(&self) -> Vec<UserId> {
        self.list().await.into_iter().map(|s| s.user_id).collect()
    }

    /// Discard the entry without waiting for the connection to close.
    ///
    /// The supervisor is signalled and closes its handle in the background;
    /// a later `start` for the same user waits for it. Idempotent.
    pub async fn remove(&self, user_id: &UserId) {
        let _guard = self.lock_key(user_id).await;
        if let Some(handle) = self.supervisors.lock().await.get(user_id) {
            handle.cancel.cancel();
        }
        if self.repository.remove(user_id).await.is_some() {
            tracing::info!("Session '{}' removed", user_id);
        }
    }

    /// Close the connection (cancelling any pending reconnect) and remove the
    /// entry. No-op for unknown user ids.
    pub async fn stop(&self, user_id: &UserId) {
        let _guard = self.lock_key(user_id).await;
        self.reap(user_id).await;
        if self.repository.remove(user_id).await.is_some() {
            tracing::info!("Session '{}' stopped", user_id);
        }
    }

    /// Stop every session.
    pub async fn shutdown(&self) {
        let mut user_ids: Vec<UserId> = self.supervisors.lock().await.keys().cloned().collect();
        for session in self.repository.list().await {
            if !user_ids.contains(&session.user_id) {
                user_ids.push(session.user_id);
            }
        }
        for user_id in &user_ids {
            self.stop(user_id).await;
        }
        tracing::info!("Stopped {} session(s)", user_ids.len());
    }

    /// Cancel the supervisor of `user_id` and wait for it to finish.
    async fn reap(&self, user_id: &UserId) {
        let handle = self.supervisors.lock().await.remove(user_id);
        let Some(SupervisorHandle { cancel, mut task }) = handle else {
            return;
        };
        cancel.cancel();
        match tokio::time::timeout(self.settings.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Supervisor of '{}' ended abnormally: {}", user_id, e),
            Err(_) => {
                tracing::warn!(
                    "Supervisor of '{}' did not stop within {:?}, aborting",
                    user_id,
                    self.settings.stop_timeout
                );
                task.abort();
            }
        }
    }

    async fn lock_key(&self, user_id: &UserId) -> KeyGuard<'_> {
        let lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(user_id.clone()).or_default().clone()
        };
        let mut key = KeyGuard {
            locks: &self.key_locks,
            user_id: user_id.clone(),
            lock,
            guard: None,
        };
        key.guard = Some(key.lock.clone().lock_owned().await);
        key
    }
}
