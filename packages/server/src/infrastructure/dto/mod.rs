//! Data transfer objects.

pub mod bridge;
pub mod http;
