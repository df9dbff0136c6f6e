//! HTTP API request and response DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::{ConnectionState, DisconnectReason, LoginMode, TerminalReason};

/// Body of `POST /set-session`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetSessionRequest {
    #[serde(rename = "SESSION_ID", default)]
    pub session_id: Option<String>,
}

/// Query of `GET /pair/{user_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairQuery {
    /// Phone number in international format, digits only or with separators
    #[serde(default)]
    pub number: Option<String>,
}

/// Returned when a session was started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedResponse {
    pub success: bool,
    pub user_id: String,
    pub state: ConnectionState,
}

/// Plain `{ "success": true }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error body for every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// `GET /users`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<String>,
}

/// Session summary for the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummaryDto {
    pub user_id: String,
    pub state: ConnectionState,
}

/// `GET /api/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: Vec<SessionSummaryDto>,
}

/// `GET /sessions/{user_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetailDto {
    pub user_id: String,
    pub state: ConnectionState,
    pub login_mode: LoginMode,
    pub retry_count: u32,
    pub terminal_reason: Option<TerminalReason>,
    pub last_disconnect: Option<DisconnectReason>,
    pub pairing_qr: Option<String>,
    pub pairing_code: Option<String>,
    pub self_jid: Option<String>,
    pub created_at: String, // ISO 8601
    pub updated_at: String, // ISO 8601
}
