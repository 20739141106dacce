//! Authentication Handlers
//!
//! Agent-mode login, identity lookup and logout

use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::json;
use shared::ApiResponse;
use shared::client::{CurrentUserResponse, LoginRequest, LoginResponse, UserInfo};

use crate::audit::{AuditAction, AuditLogRequest};
use crate::auth::permissions::permissions_for;
use crate::auth::session::{self, record_login, record_login_failure};
use crate::auth::{Claims, ClientIp, CurrentUser};
use crate::core::ServerState;
use crate::utils::AppResult;

const AGENT_MODE: &str = "agent";

/// POST /auth/login
///
/// Unknown users and wrong passwords share one error so usernames cannot be
/// enumerated; the response is delayed by a fixed amount either way.
pub async fn login(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(req) = req?;
    let result = state
        .credentials
        .authenticate(&req.username, &req.password)
        .await;

    // Fixed delay before looking at the result
    if state.config.login_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(state.config.login_delay_ms)).await;
    }

    let user = match result {
        Ok(user) => user,
        Err(failure) => {
            record_login_failure(&state.audit, &req.username, &failure, AGENT_MODE, ip).await;
            return Err(failure.into());
        }
    };

    state
        .credentials
        .update_last_login(user.id, state.clock.now_millis())
        .await?;
    let token = state
        .tokens
        .generate_token(user.id, &user.username, user.role)?;
    record_login(&state.audit, &user, AGENT_MODE, ip).await;

    let current = CurrentUser::from(&user);
    Ok(Json(LoginResponse {
        token,
        user: UserInfo::from(&current),
        expires_in: state.tokens.expires_in(),
    }))
}

/// GET /api/auth/me
pub async fn me(
    Extension(user): Extension<CurrentUser>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<CurrentUserResponse>> {
    Ok(Json(CurrentUserResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        permissions: permissions_for(user.role)
            .iter()
            .map(|p| p.to_string())
            .collect(),
        expires_at: claims.exp,
    }))
}

/// POST /api/auth/logout
///
/// Records the logout only; the token stays valid until it expires.
pub async fn logout(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<ApiResponse<()>> {
    state
        .audit
        .log(
            AuditLogRequest::new(&user.username, AuditAction::Logout, session::RESOURCE_TYPE)
                .resource_id(user.id)
                .description(format!("User {} logged out", user.username))
                .ip(ip)
                .info(json!({ "mode": AGENT_MODE })),
        )
        .await;
    tracing::info!(username = %user.username, "Agent logout");

    Ok(ApiResponse::ok())
}
