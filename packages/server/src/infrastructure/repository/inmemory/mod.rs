//! インメモリ Repository 実装

mod session;

pub use session::InMemorySessionRepository;
