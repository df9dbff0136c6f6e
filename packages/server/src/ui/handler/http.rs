//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use wabot_shared::time::timestamp_to_jst_rfc3339;

use crate::{
    domain::{Session, UserId},
    infrastructure::dto::http::{
        ErrorResponse, HealthResponse, PairQuery, SessionDetailDto, SessionStartedResponse,
        SessionSummaryDto, SetSessionRequest, SuccessResponse, UsersResponse,
    },
    ui::state::AppState,
    usecase::{CredentialSource, StartSessionError},
};

/// Error response rendered as `{ "success": false, "error": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StartSessionError> for ApiError {
    fn from(e: StartSessionError) -> Self {
        let status = match &e {
            StartSessionError::InvalidCredentialFormat(_) => StatusCode::BAD_REQUEST,
            StartSessionError::AlreadyActive(_) => StatusCode::CONFLICT,
            StartSessionError::CredentialFetchFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

fn parse_user_id(raw: String) -> Result<UserId, ApiError> {
    UserId::new(raw).map_err(|e| ApiError::bad_request(e.to_string()))
}

/// Extract `SESSION_ID` from a JSON body. An empty body counts as missing.
fn parse_session_id(body: &Bytes) -> Result<String, ApiError> {
    let request: SetSessionRequest = if body.is_empty() {
        SetSessionRequest::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))?
    };
    request
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("SESSION_ID is required"))
}

async fn start_session(
    state: &AppState,
    user_id: UserId,
    source: CredentialSource,
) -> Result<Json<SessionStartedResponse>, ApiError> {
    let session = state
        .registry
        .start(user_id.clone(), source)
        .await
        .inspect_err(|e| tracing::warn!("Failed to start session '{}': {}", user_id, e))?;
    Ok(Json(SessionStartedResponse {
        success: true,
        user_id: session.user_id.into_string(),
        state: session.state,
    }))
}

/// Start a session for `user_id` from a session id
pub async fn set_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<Json<SessionStartedResponse>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    let session_id = parse_session_id(&body)?;
    start_session(&state, user_id, CredentialSource::SessionId(session_id)).await
}

/// Start a session for the default user from a session id
pub async fn set_default_session(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SessionStartedResponse>, ApiError> {
    let session_id = parse_session_id(&body)?;
    let user_id = state.default_user_id.clone();
    start_session(&state, user_id, CredentialSource::SessionId(session_id)).await
}

/// Start a session that logs in by QR code
pub async fn qr_login(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionStartedResponse>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    start_session(&state, user_id, CredentialSource::QrPairing).await
}

/// Start a session that logs in with a pairing code sent to `number`
pub async fn pair_with_code(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<PairQuery>,
) -> Result<Json<SessionStartedResponse>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    let phone = query
        .number
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("number is required"))?;
    start_session(&state, user_id, CredentialSource::PairingCode { phone }).await
}

/// List user ids with a session
pub async fn get_users(State(state): State<Arc<AppState>>) -> Json<UsersResponse> {
    let users = state
        .registry
        .user_ids()
        .await
        .into_iter()
        .map(UserId::into_string)
        .collect();
    Json(UsersResponse { users })
}

/// Get session detail by user id
pub async fn get_session_detail(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SessionDetailDto>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    let session = state.registry.get(&user_id).await.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("session not found: {user_id}"),
        )
    })?;
    Ok(Json(session_detail(session)))
}

/// Stop and remove a session. Unknown user ids succeed too.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let user_id = parse_user_id(user_id)?;
    state.registry.stop(&user_id).await;
    Ok(Json(SuccessResponse { success: true }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state
        .registry
        .list()
        .await
        .into_iter()
        .map(|s| SessionSummaryDto {
            user_id: s.user_id.into_string(),
            state: s.state,
        })
        .collect();
    Json(HealthResponse {
        status: "ok".to_string(),
        sessions,
    })
}

fn session_detail(session: Session) -> SessionDetailDto {
    SessionDetailDto {
        user_id: session.user_id.into_string(),
        state: session.state,
        login_mode: session.login_mode,
        retry_count: session.retry_count,
        terminal_reason: session.terminal_reason,
        last_disconnect: session.last_disconnect,
        pairing_qr: session.pairing_qr,
        pairing_code: session.pairing_code,
        self_jid: session.self_jid.map(|j| j.as_str().to_string()),
        created_at: timestamp_to_jst_rfc3339(session.created_at.value()),
        updated_at: timestamp_to_jst_rfc3339(session.updated_at.value()),
    }
}
