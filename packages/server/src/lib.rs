//! Multi-user WhatsApp bot session host.
//!
//! Hosts one bot session per user id behind a small HTTP API. Each session is
//! supervised by its own task, which reconnects transient failures and stops
//! for good when the account logs out.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::Config;
pub use ui::run;
