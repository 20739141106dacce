//! Audit Log API Handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::audit::{AuditEntry, AuditExport, AuditListResponse, AuditQuery, AuditStatistics, PurgeResult};
use crate::auth::{ClientIp, CurrentUser};
use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// GET /api/audit - 查询审计日志
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditListResponse>> {
    let ledger = state.audit.ledger();
    let items = ledger.query(&query).await?;
    let total = ledger.count(&query).await?;
    Ok(Json(AuditListResponse { items, total }))
}

/// GET /api/audit/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AuditEntry>> {
    Ok(Json(state.audit.ledger().get(id).await?))
}

/// GET /api/audit/stats
pub async fn stats(State(state): State<ServerState>) -> AppResult<Json<AuditStatistics>> {
    Ok(Json(state.audit.ledger().statistics().await?))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// GET /api/audit/export - 导出为 JSON 文档 (写入一条 export 审计)
pub async fn export(
    State(state): State<ServerState>,
    ClientIp(ip): ClientIp,
    Extension(actor): Extension<CurrentUser>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Json<AuditExport>> {
    let export = state
        .audit
        .export_inline(
            &actor.username,
            ip,
            query.start_date.as_deref(),
            query.end_date.as_deref(),
        )
        .await?;
    Ok(Json(export))
}

#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub older_than_days: u32,
    #[serde(default)]
    pub confirm: bool,
}

/// DELETE /api/audit?older_than_days=N&confirm=true - 不可逆，需显式确认
pub async fn purge(
    State(state): State<ServerState>,
    Extension(actor): Extension<CurrentUser>,
    Query(query): Query<PurgeQuery>,
) -> AppResult<Json<PurgeResult>> {
    if !query.confirm {
        return Err(AppError::validation("Purge requires confirm=true")
            .with_detail("older_than_days", query.older_than_days));
    }
    Ok(Json(
        state
            .audit
            .purge(&actor.username, query.older_than_days)
            .await?,
    ))
}
