//! Route table.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{handler, state::AppState};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/set-session", post(handler::set_default_session))
        .route("/set-session/{user_id}", post(handler::set_session))
        .route("/qr-login/{user_id}", get(handler::qr_login))
        .route("/pair/{user_id}", get(handler::pair_with_code))
        .route("/users", get(handler::get_users))
        .route(
            "/sessions/{user_id}",
            get(handler::get_session_detail).delete(handler::delete_session),
        )
        .route("/api/health", get(handler::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
