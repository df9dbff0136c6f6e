//! In-process gateway driven by the caller.
//!
//! Every `connect` produces a [`ScriptedConnection`] whose events are pushed by
//! hand (`open`, `close_with`, `emit`). Sent payloads are recorded. With
//! `auto_open` set, each connection reports itself open right away, which is
//! enough to exercise the HTTP surface without a bridge.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use super::EVENT_BUFFER;
use crate::domain::{
    ConnectConfig, Connection, ConnectionHandle, ConnectionId, ConnectionUpdate,
    DisconnectReason, GatewayError, GatewayEvent, Jid, OutboundPayload, UserId, WhatsAppGateway,
};

/// How a scripted connection answers `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendBehavior {
    #[default]
    Accept,
    Fail,
    /// Never completes
    Hang,
}

#[derive(Default)]
struct ScriptState {
    connections: Vec<Arc<ScriptedConnection>>,
    connect_attempts: usize,
    failing_connects: usize,
    send_behavior: SendBehavior,
}

#[derive(Default)]
pub struct ScriptedGateway {
    state: Mutex<ScriptState>,
    changed: Notify,
    auto_open: Option<Jid>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every new connection as open for `self_jid`.
    pub fn with_auto_open(self_jid: Jid) -> Self {
        Self {
            auto_open: Some(self_jid),
            ..Self::default()
        }
    }

    /// Make the next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().failing_connects = count;
    }

    /// Behaviour of sends on connections created from now on.
    pub fn set_send_behavior(&self, behavior: SendBehavior) {
        self.lock().send_behavior = behavior;
    }

    /// Connect calls so far, failed ones included.
    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn connections_for(&self, user_id: &UserId) -> Vec<Arc<ScriptedConnection>> {
        self.lock()
            .connections
            .iter()
            .filter(|c| &c.config.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Connections of `user_id` that have not been closed.
    pub fn live_connections(&self, user_id: &UserId) -> usize {
        self.connections_for(user_id)
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Wait until at least `count` connect calls happened.
    pub async fn wait_for_attempts(&self, count: usize) {
        loop {
            let changed = self.changed.notified();
            if self.connect_attempts() >= count {
                return;
            }
            changed.await;
        }
    }

    /// Wait for the `index`-th (0-based) successful connection of `user_id`.
    pub async fn wait_for_connection(
        &self,
        user_id: &UserId,
        index: usize,
    ) -> Arc<ScriptedConnection> {
        loop {
            let changed = self.changed.notified();
            if let Some(connection) = self.connections_for(user_id).get(index) {
                return connection.clone();
            }
            changed.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // a panicking test thread must not poison every other assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WhatsAppGateway for ScriptedGateway {
    async fn connect(&self, config: ConnectConfig) -> Result<ConnectionHandle, GatewayError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let result = {
            let mut state = self.lock();
            state.connect_attempts += 1;
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                Err(GatewayError::Connect("scripted failure".to_string()))
            } else {
                let connection = Arc::new(ScriptedConnection {
                    config,
                    events: Mutex::new(Some(tx)),
                    sent: Mutex::new(Vec::new()),
                    closed: AtomicBool::new(false),
                    send_behavior: state.send_behavior,
                });
                state.connections.push(connection.clone());
                Ok(connection)
            }
        };
        self.changed.notify_waiters();

        let connection = result?;
        if let Some(self_jid) = &self.auto_open {
            connection.open(Some(self_jid.clone())).await;
        }
        Ok(ConnectionHandle {
            connection,
            events: rx,
        })
    }
}

pub struct ScriptedConnection {
    config: ConnectConfig,
    events: Mutex<Option<mpsc::Sender<GatewayEvent>>>,
    sent: Mutex<Vec<(Jid, OutboundPayload)>>,
    closed: AtomicBool,
    send_behavior: SendBehavior,
}

impl ScriptedConnection {
    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    /// Push an event. Returns false when the connection is closed or nobody
    /// listens any more.
    pub async fn emit(&self, event: GatewayEvent) -> bool {
        let sender = self
            .events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub async fn open(&self, self_jid: Option<Jid>) -> bool {
        self.emit(GatewayEvent::Connection(ConnectionUpdate::Open { self_jid }))
            .await
    }

    pub async fn close_with(&self, reason: DisconnectReason) -> bool {
        self.emit(GatewayEvent::Connection(ConnectionUpdate::Close { reason }))
            .await
    }

    pub fn sent(&self) -> Vec<(Jid, OutboundPayload)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn id(&self) -> ConnectionId {
        self.config.connection_id
    }

    async fn send(&self, to: &Jid, payload: OutboundPayload) -> Result<(), GatewayError> {
        if self.is_closed() {
            return Err(GatewayError::Closed);
        }
        match self.send_behavior {
            SendBehavior::Accept => {
                self.sent
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((to.clone(), payload));
                Ok(())
            }
            SendBehavior::Fail => Err(GatewayError::Send("scripted failure".to_string())),
            SendBehavior::Hang => std::future::pending().await,
        }
    }

    async fn close(&self) -> Result<(), GatewayError> {
        self.closed.store(true, Ordering::Release);
        // dropping the sender ends the event stream
        self.events.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}
