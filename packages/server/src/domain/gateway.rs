//! WhatsApp gateway abstraction.
//!
//! The protocol itself (wire format, encryption, multi-device sync) lives in an
//! external library. The core only sees this capability surface: connect,
//! receive an ordered stream of events, send, close.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    error::GatewayError,
    policy::DisconnectReason,
    value_object::{ConnectionId, Jid, UserId},
};

/// Parameters of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    /// Credential directory the library reads and keeps current
    pub auth_dir: PathBuf,
    /// Emit QR codes for a fresh login
    pub print_qr: bool,
    /// Request a pairing code for this phone number (digits only)
    pub pairing_phone: Option<String>,
    /// Browser name shown in the linked devices list
    pub browser: String,
}

/// Connection state change reported by the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Connecting,
    Open { self_jid: Option<Jid> },
    Close { reason: DisconnectReason },
}

/// Inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: String,
    /// Chat the message belongs to
    pub remote_jid: Jid,
    /// Author inside a group or status broadcast
    pub participant: Option<Jid>,
    pub from_me: bool,
    /// Plain or extended text, `None` for media and other types
    pub text: Option<String>,
}

impl InboundMessage {
    /// Author of the message: the participant when present, else the chat.
    pub fn sender(&self) -> &Jid {
        self.participant.as_ref().unwrap_or(&self.remote_jid)
    }
}

/// Incoming call notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub from: Jid,
    /// `offer`, `ringing`, `timeout`, `reject`, ...
    pub status: String,
}

impl IncomingCall {
    pub fn is_offer(&self) -> bool {
        self.status == "offer"
    }
}

/// Events of one connection, delivered in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Connection(ConnectionUpdate),
    /// QR payload to scan while pairing
    Qr(String),
    /// Code to enter on the phone when pairing by number
    PairingCode(String),
    /// `notify` is false for history sync batches
    Messages {
        notify: bool,
        messages: Vec<InboundMessage>,
    },
    Call(IncomingCall),
    /// The library persisted new credential material
    CredentialsUpdated,
}

/// Outbound content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text {
        text: String,
        quoted_id: Option<String>,
    },
    Reaction {
        key_id: String,
        /// Author of the reacted message, required for status updates
        participant: Option<Jid>,
        emoji: String,
    },
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            quoted_id: None,
        }
    }
}

/// A live connection handle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    async fn send(&self, to: &Jid, payload: OutboundPayload) -> Result<(), GatewayError>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), GatewayError>;
}

/// Result of a successful connect.
pub struct ConnectionHandle {
    pub connection: Arc<dyn Connection>,
    pub events: mpsc::Receiver<GatewayEvent>,
}

/// Factory of connections to the messaging service.
#[async_trait]
pub trait WhatsAppGateway: Send + Sync {
    async fn connect(&self, config: ConnectConfig) -> Result<ConnectionHandle, GatewayError>;
}
