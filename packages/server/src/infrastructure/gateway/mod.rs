//! WhatsAppGateway implementations.
//!
//! - [`BridgeGateway`]: talks to a protocol bridge process over WebSocket
//! - [`ScriptedGateway`]: in-process driver for tests and local runs

mod bridge;
mod scripted;

pub use bridge::BridgeGateway;
pub use scripted::{ScriptedConnection, ScriptedGateway, SendBehavior};

/// Capacity of the per-connection event channel.
pub(crate) const EVENT_BUFFER: usize = 64;
