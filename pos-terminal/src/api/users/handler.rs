//! User Administration Handlers

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
};
use shared::models::{
    PasswordReset, UserAccountResponse, UserCreate, UserUpdate, UserWithPassword,
};

use crate::auth::{ClientIp, CurrentUser};
use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// GET /api/users
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<Vec<UserAccountResponse>>> {
    Ok(Json(state.users.list().await?))
}

/// POST /api/users
pub async fn create(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    payload: Result<Json<UserCreate>, JsonRejection>,
) -> AppResult<Json<UserWithPassword>> {
    let Json(payload) = payload?;
    Ok(Json(state.users.add(&actor, ip, payload).await?))
}

/// PUT /api/users/{username}
///
/// Role change first, then the active flag; at least one must be present.
pub async fn update(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path(username): Path<String>,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> AppResult<Json<UserAccountResponse>> {
    let Json(payload) = payload?;
    if payload.role.is_none() && payload.is_active.is_none() {
        return Err(AppError::validation("Nothing to update: set role or is_active"));
    }

    let mut updated = None;
    if let Some(role) = payload.role {
        updated = Some(
            state
                .users
                .update_role(&actor, ip.clone(), &username, role)
                .await?,
        );
    }
    if let Some(is_active) = payload.is_active {
        updated = Some(
            state
                .users
                .set_active(&actor, ip, &username, is_active)
                .await?,
        );
    }

    updated
        .map(Json)
        .ok_or_else(|| AppError::internal("No update applied"))
}

/// POST /api/users/{username}/password
pub async fn reset_password(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path(username): Path<String>,
    body: Bytes,
) -> AppResult<Json<UserWithPassword>> {
    // Empty body means "generate one"
    let password = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<PasswordReset>(&body)?.password
    };
    Ok(Json(
        state
            .users
            .reset_password(&actor, ip, &username, password)
            .await?,
    ))
}
