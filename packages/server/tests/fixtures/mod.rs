//! Test fixtures for integration tests.
//!
//! Provides an in-process server backed by the scripted gateway.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use wabot_server::{
    domain::{Jid, UserId},
    infrastructure::{
        credential::{FsCredentialStore, InlineCredentialFetcher},
        gateway::ScriptedGateway,
        repository::InMemorySessionRepository,
    },
    ui::{build_router, state::AppState},
    usecase::{RegistryDeps, RegistrySettings, SessionRegistry},
};

/// `CLOUD-AI~` + base64 of `{"me":{}}`
pub const VALID_SESSION_ID: &str = "CLOUD-AI~eyJtZSI6e319";

pub const DEFAULT_USER_ID: &str = "default";

/// Server fixture that shuts down when dropped
pub struct TestServer {
    base_url: String,
    pub registry: Arc<SessionRegistry>,
    pub gateway: Arc<ScriptedGateway>,
    task: JoinHandle<()>,
    _session_dir: tempfile::TempDir,
}

impl TestServer {
    /// Start a server on an ephemeral port
    pub async fn start() -> Self {
        let session_dir = tempfile::tempdir().expect("Failed to create session dir");
        let self_jid = Jid::new("254700000000:1@s.whatsapp.net".to_string()).unwrap();
        let gateway = Arc::new(ScriptedGateway::with_auto_open(self_jid));
        let registry = Arc::new(SessionRegistry::new(
            RegistryDeps {
                repository: Arc::new(InMemorySessionRepository::new()),
                gateway: gateway.clone(),
                fetcher: Arc::new(InlineCredentialFetcher),
                store: Arc::new(FsCredentialStore::new(session_dir.path())),
            },
            RegistrySettings::default(),
        ));
        let state = Arc::new(AppState::new(
            registry.clone(),
            UserId::new(DEFAULT_USER_ID.to_string()).unwrap(),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .await
                .expect("Test server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            registry,
            gateway,
            task,
            _session_dir: session_dir,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Poll `GET /sessions/{user_id}` until `state` matches
    pub async fn wait_for_state(&self, user_id: &str, state: &str) -> serde_json::Value {
        let client = reqwest::Client::new();
        for _ in 0..200 {
            let response = client
                .get(format!("{}/sessions/{user_id}", self.base_url))
                .send()
                .await
                .expect("Failed to send request");
            if response.status() == 200 {
                let body: serde_json::Value = response.json().await.unwrap();
                if body["state"] == state {
                    return body;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session '{user_id}' never reached '{state}'");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
