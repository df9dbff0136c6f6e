//! Shared application state.

use std::sync::Arc;

use crate::{domain::UserId, usecase::SessionRegistry};

pub struct AppState {
    /// Sessions keyed by user id
    pub registry: Arc<SessionRegistry>,
    /// Target of `POST /set-session` without a user id
    pub default_user_id: UserId,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, default_user_id: UserId) -> Self {
        Self {
            registry,
            default_user_id,
        }
    }
}
