//! Shared utilities for wabot.
//!
//! Logger setup and time helpers used by the server crate.

pub mod logger;
pub mod time;
