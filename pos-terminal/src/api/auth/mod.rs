//! Authentication Routes

mod handler;

use axum::{Router, routing::get, routing::post};

use crate::core::ServerState;

/// Build authentication router
/// - /auth/login: public, outside `/api/` so require_auth skips it
/// - /api/auth/me, /api/auth/logout: any valid token
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/auth/login", post(handler::login))
        .route("/api/auth/me", get(handler::me))
        .route("/api/auth/logout", post(handler::logout))
}
