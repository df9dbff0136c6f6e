//! Handler modules for HTTP endpoints.

pub mod http;

pub use http::{
    delete_session, get_session_detail, get_users, health_check, pair_with_code, qr_login, set_default_session,
    set_session,
};
