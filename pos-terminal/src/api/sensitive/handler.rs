//! Sensitive Data Handlers

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use shared::ApiResponse;

use crate::auth::{ClientIp, CurrentUser};
use crate::core::ServerState;
use crate::db::repository::SensitiveRecord;
use crate::services::{SensitiveKey, StoreOutcome};
use crate::utils::AppResult;

#[derive(Debug, Deserialize)]
pub struct ValueBody {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ValueResponse {
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct StoreResponse {
    pub outcome: StoreOutcome,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub matches: bool,
}

/// GET /api/sensitive/{resource_type}/{resource_id} - 字段列表，不含值
pub async fn list(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> AppResult<Json<Vec<SensitiveRecord>>> {
    let records = state
        .vault
        .list(&actor, ip, &resource_type, &resource_id)
        .await?;
    Ok(Json(records))
}

pub async fn get(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path((resource_type, resource_id, field)): Path<(String, String, String)>,
) -> AppResult<Json<ValueResponse>> {
    let key = SensitiveKey::new(resource_type, resource_id, field)?;
    let value = state.vault.get(&actor, ip, &key).await?;
    Ok(Json(ValueResponse { value }))
}

pub async fn store(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path((resource_type, resource_id, field)): Path<(String, String, String)>,
    body: Result<Json<ValueBody>, JsonRejection>,
) -> AppResult<Json<StoreResponse>> {
    let Json(body) = body?;
    let key = SensitiveKey::new(resource_type, resource_id, field)?;
    let outcome = state.vault.store(&actor, ip, &key, &body.value).await?;
    Ok(Json(StoreResponse { outcome }))
}

pub async fn delete(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path((resource_type, resource_id, field)): Path<(String, String, String)>,
) -> AppResult<ApiResponse<()>> {
    let key = SensitiveKey::new(resource_type, resource_id, field)?;
    state.vault.delete(&actor, ip, &key).await?;
    Ok(ApiResponse::ok())
}

/// POST .../check - 只返回是否一致
pub async fn check(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Path((resource_type, resource_id, field)): Path<(String, String, String)>,
    body: Result<Json<ValueBody>, JsonRejection>,
) -> AppResult<Json<CheckResponse>> {
    let Json(body) = body?;
    let key = SensitiveKey::new(resource_type, resource_id, field)?;
    let matches = state.vault.check(&actor, ip, &key, &body.value).await?;
    Ok(Json(CheckResponse { matches }))
}
