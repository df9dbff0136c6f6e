//! Domain layer for the session host.
//!
//! This module contains business logic that is independent of
//! data transfer objects (DTOs) and infrastructure concerns.

pub mod credential;
pub mod entity;
pub mod error;
pub mod factory;
pub mod gateway;
pub mod policy;
pub mod repository;
pub mod value_object;

pub use credential::{CredentialFetcher, CredentialStore};
pub use entity::{ConnectionState, LoginMode, Session, TerminalReason};
pub use error::{CredentialError, GatewayError, PolicyError, RepositoryError, ValueObjectError};
pub use factory::ConnectionIdFactory;
pub use gateway::{
    ConnectConfig, Connection, ConnectionHandle, ConnectionUpdate, GatewayEvent, IncomingCall,
    InboundMessage, OutboundPayload, WhatsAppGateway,
};
pub use policy::{Backoff, DisconnectReason, ReconnectDecision, ReconnectPolicy};
pub use repository::SessionRepository;
pub use value_object::{ConnectionId, Jid, SessionId, Timestamp, UserId};
