//! Core domain models for the session host.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{
    policy::DisconnectReason,
    value_object::{Jid, Timestamp, UserId},
};

/// Connection lifecycle of a session.
///
/// `Disconnected -> Connecting -> Open -> (ClosedRecoverable | ClosedTerminal)`,
/// and `ClosedRecoverable -> Connecting` when the reconnect timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Closed, a reconnect is scheduled
    ClosedRecoverable,
    /// Closed for good, see [`Session::terminal_reason`]
    ClosedTerminal,
}

/// Why a session reached `ClosedTerminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalReason {
    /// The account logged out; the credential bundle must be re-provisioned
    LoggedOut,
    /// Reconnect attempts exceeded the configured maximum
    RetriesExhausted,
}

/// How the session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginMode {
    /// Pre-provisioned credential bundle from a session id
    SessionId,
    /// Fresh login by scanning a QR code
    QrPairing,
    /// Fresh login by entering a code on the phone
    PairingCode,
}

/// One connected (or connecting) account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Registry key
    pub user_id: UserId,
    pub state: ConnectionState,
    /// Per-user credential directory handed to the protocol library
    pub credential_path: PathBuf,
    /// Reconnect attempts spent since the connection was last stable
    pub retry_count: u32,
    pub login_mode: LoginMode,
    pub terminal_reason: Option<TerminalReason>,
    /// Reason of the most recent close
    pub last_disconnect: Option<DisconnectReason>,
    /// Latest QR payload while pairing
    pub pairing_qr: Option<String>,
    /// Latest pairing code while pairing by phone number
    pub pairing_code: Option<String>,
    /// The account's own JID once open
    pub self_jid: Option<Jid>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Session {
    /// Create a session in `Disconnected`.
    pub fn new(
        user_id: UserId,
        credential_path: PathBuf,
        login_mode: LoginMode,
        now: Timestamp,
    ) -> Self {
        Self {
            user_id,
            state: ConnectionState::Disconnected,
            credential_path,
            retry_count: 0,
            login_mode,
            terminal_reason: None,
            last_disconnect: None,
            pairing_qr: None,
            pairing_code: None,
            self_jid: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Any state other than `ClosedTerminal` owns (or is about to own) a
    /// connection handle.
    pub fn is_terminal(&self) -> bool {
        self.state == ConnectionState::ClosedTerminal
    }

    pub fn mark_connecting(&mut self, now: Timestamp) {
        self.state = ConnectionState::Connecting;
        self.updated_at = now;
    }

    pub fn mark_open(&mut self, self_jid: Option<Jid>, now: Timestamp) {
        self.state = ConnectionState::Open;
        self.pairing_qr = None;
        self.pairing_code = None;
        if self_jid.is_some() {
            self.self_jid = self_jid;
        }
        self.updated_at = now;
    }

    /// A reconnect has been scheduled as retry number `attempt`.
    pub fn mark_closed_recoverable(
        &mut self,
        reason: DisconnectReason,
        attempt: u32,
        now: Timestamp,
    ) {
        self.state = ConnectionState::ClosedRecoverable;
        self.last_disconnect = Some(reason);
        self.retry_count = attempt;
        self.updated_at = now;
    }

    pub fn mark_terminal(
        &mut self,
        terminal_reason: TerminalReason,
        last_disconnect: DisconnectReason,
        now: Timestamp,
    ) {
        self.state = ConnectionState::ClosedTerminal;
        self.terminal_reason = Some(terminal_reason);
        self.last_disconnect = Some(last_disconnect);
        self.pairing_qr = None;
        self.pairing_code = None;
        self.updated_at = now;
    }

    pub fn reset_retries(&mut self, now: Timestamp) {
        self.retry_count = 0;
        self.updated_at = now;
    }

    pub fn set_pairing_qr(&mut self, code: String, now: Timestamp) {
        self.pairing_qr = Some(code);
        self.updated_at = now;
    }

    pub fn set_pairing_code(&mut self, code: String, now: Timestamp) {
        self.pairing_code = Some(code);
        self.updated_at = now;
    }
}
