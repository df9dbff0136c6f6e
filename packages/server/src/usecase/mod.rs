//! UseCase 層
//!
//! ビジネスロジックを実装するレイヤー。
//! UI 層から呼び出され、Domain 層を操作します。

pub mod dispatch;
pub mod error;
pub mod session_registry;
mod supervisor;

pub use dispatch::{BotMode, BotSettings, EventDispatcher};
pub use error::{DispatchError, StartSessionError};
pub use session_registry::{
    CredentialSource, DEFAULT_STOP_TIMEOUT, RegistryDeps, RegistrySettings, SessionRegistry,
};
