//! Per-session supervisor task.
//!
//! Owns the session's only connection handle. Connects, feeds events to the
//! dispatcher in arrival order, records state transitions in the repository
//! and applies the reconnect policy when the connection closes.
//!
//! The task ends when
//! - the cancellation token fires (`stop`), after closing the handle
//! - the repository entry disappears (`remove`)
//! - the policy gives up (`ClosedTerminal`)

use std::{path::PathBuf, sync::Arc};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    ConnectConfig, Connection, ConnectionHandle, ConnectionIdFactory, ConnectionUpdate,
    CredentialStore, DisconnectReason, GatewayEvent, Jid, LoginMode, ReconnectDecision,
    ReconnectPolicy, Session, SessionRepository, TerminalReason, Timestamp, UserId,
    WhatsAppGateway,
};

use super::dispatch::EventDispatcher;

/// Why a single connection ended.
enum ConnectionOutcome {
    /// Stop here: cancelled or removed from the registry
    Exit,
    Closed {
        reason: DisconnectReason,
        /// Stayed open for at least the policy's stable window
        stable: bool,
    },
}

pub(crate) struct SessionSupervisor {
    pub(crate) user_id: UserId,
    pub(crate) login_mode: LoginMode,
    /// Digits of the number to pair, only for `LoginMode::PairingCode`
    pub(crate) pairing_phone: Option<String>,
    pub(crate) auth_dir: PathBuf,
    pub(crate) repository: Arc<dyn SessionRepository>,
    pub(crate) gateway: Arc<dyn WhatsAppGateway>,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) cancel: CancellationToken,
    /// The welcome message goes out on the first open only
    pub(crate) welcomed: bool,
}

impl SessionSupervisor {
    pub(crate) async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut retries = 0u32;

        loop {
            let config = ConnectConfig {
                connection_id: ConnectionIdFactory::generate(),
                user_id: self.user_id.clone(),
                auth_dir: self.auth_dir.clone(),
                print_qr: self.login_mode == LoginMode::QrPairing,
                pairing_phone: self.pairing_phone.clone(),
                browser: self.user_id.to_string(),
            };
            let connection_id = config.connection_id;

            if self
                .update(|s: &mut Session| s.mark_connecting(Timestamp::now()))
                .await
                .is_none()
            {
                return;
            }
            tracing::info!("'{}' connecting ({})", self.user_id, connection_id);

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = self.gateway.connect(config) => result,
            };

            let reason = match connected {
                Ok(handle) => match self.drive(handle).await {
                    ConnectionOutcome::Exit => return,
                    ConnectionOutcome::Closed { reason, stable } => {
                        if stable && retries > 0 {
                            retries = 0;
                            self.update(|s: &mut Session| s.reset_retries(Timestamp::now()))
                                .await;
                        }
                        reason
                    }
                },
                Err(e) => {
                    tracing::warn!("'{}' could not connect ({}): {}", self.user_id, connection_id, e);
                    DisconnectReason::ConnectionLost
                }
            };

            match self.policy.on_close(reason, retries) {
                ReconnectDecision::Retry { attempt, delay } => {
                    retries = attempt;
                    let updated = self
                        .update(|s: &mut Session| {
                            s.mark_closed_recoverable(reason, attempt, Timestamp::now())
                        })
                        .await;
                    if updated.is_none() {
                        return;
                    }
                    tracing::warn!(
                        "'{}' disconnected: {}, reconnecting in {:?} (attempt {}/{})",
                        self.user_id,
                        reason,
                        delay,
                        attempt,
                        self.policy.max_retries()
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                ReconnectDecision::GiveUp(terminal) => {
                    self.give_up(terminal, reason).await;
                    return;
                }
            }
        }
    }

    /// Process the events of one connection until it closes.
    async fn drive(&mut self, handle: ConnectionHandle) -> ConnectionOutcome {
        let ConnectionHandle {
            connection,
            mut events,
        } = handle;
        let cancel = self.cancel.clone();
        let mut opened_at: Option<Instant> = None;

        let reason = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.close(connection.as_ref()).await;
                    return ConnectionOutcome::Exit;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                // stream ended without a close update
                break DisconnectReason::ConnectionLost;
            };

            if let GatewayEvent::Connection(ConnectionUpdate::Close { reason }) = event {
                break reason;
            }
            if let GatewayEvent::Connection(ConnectionUpdate::Open { .. }) = event {
                opened_at = Some(Instant::now());
            }

            let keep_going = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                keep_going = self.handle_event(connection.as_ref(), event) => keep_going,
            };
            if !keep_going {
                self.close(connection.as_ref()).await;
                return ConnectionOutcome::Exit;
            }
        };

        self.close(connection.as_ref()).await;
        let stable = opened_at.is_some_and(|at| at.elapsed() >= self.policy.stable_window());
        ConnectionOutcome::Closed { reason, stable }
    }

    /// Returns false when the session is gone from the registry.
    async fn handle_event(&mut self, connection: &dyn Connection, event: GatewayEvent) -> bool {
        match event {
            GatewayEvent::Connection(ConnectionUpdate::Connecting) => self
                .update(|s: &mut Session| s.mark_connecting(Timestamp::now()))
                .await
                .is_some(),
            GatewayEvent::Connection(ConnectionUpdate::Open { self_jid }) => {
                let Some(session) = self
                    .update(|s: &mut Session| s.mark_open(self_jid.clone(), Timestamp::now()))
                    .await
                else {
                    return false;
                };
                tracing::info!("'{}' connected", self.user_id);
                if !self.welcomed {
                    self.welcomed = true;
                    self.send_welcome(connection, session.self_jid.as_ref()).await;
                }
                true
            }
            GatewayEvent::Connection(ConnectionUpdate::Close { .. }) => true,
            GatewayEvent::Qr(code) => {
                tracing::info!("'{}' QR code ready for pairing", self.user_id);
                self.update(|s: &mut Session| s.set_pairing_qr(code.clone(), Timestamp::now()))
                    .await
                    .is_some()
            }
            GatewayEvent::PairingCode(code) => {
                tracing::info!("'{}' pairing code ready", self.user_id);
                self.update(|s: &mut Session| s.set_pairing_code(code.clone(), Timestamp::now()))
                    .await
                    .is_some()
            }
            GatewayEvent::Messages { notify, messages } => {
                self.dispatcher
                    .on_messages(connection, notify, &messages)
                    .await;
                true
            }
            GatewayEvent::Call(call) => {
                self.dispatcher.on_call(connection, &call).await;
                true
            }
            GatewayEvent::CredentialsUpdated => {
                tracing::debug!("'{}' credentials updated", self.user_id);
                true
            }
        }
    }

    async fn send_welcome(&self, connection: &dyn Connection, self_jid: Option<&Jid>) {
        match self_jid {
            Some(jid) => self.dispatcher.welcome(connection, jid).await,
            None => tracing::warn!(
                "'{}' opened without a known JID, skipping welcome message",
                self.user_id
            ),
        }
    }

    async fn give_up(&self, terminal: TerminalReason, reason: DisconnectReason) {
        if terminal == TerminalReason::LoggedOut {
            // purge before the entry turns terminal so a fresh start cannot race it
            if let Err(e) = self.store.purge(&self.user_id).await {
                tracing::warn!("'{}' stale credentials not purged: {}", self.user_id, e);
            }
        }
        self.update(|s: &mut Session| s.mark_terminal(terminal, reason, Timestamp::now()))
            .await;
        match terminal {
            TerminalReason::LoggedOut => tracing::warn!(
                "'{}' logged out; provision a new session id to reconnect",
                self.user_id
            ),
            TerminalReason::RetriesExhausted => tracing::error!(
                "'{}' giving up after {} reconnect attempts (last: {})",
                self.user_id,
                self.policy.max_retries(),
                reason
            ),
        }
    }

    async fn close(&self, connection: &dyn Connection) {
        if let Err(e) = connection.close().await {
            tracing::debug!("'{}' close of {} failed: {}", self.user_id, connection.id(), e);
        }
    }

    async fn update<F>(&self, change: F) -> Option<Session>
    where
        F: Fn(&mut Session) + Send + Sync,
    {
        match self.repository.update(&self.user_id, &change).await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!("'{}' supervisor stopping: {}", self.user_id, e);
                None
            }
        }
    }
}
