//! 审计日志服务
//!
//! 业务操作完成后调用 [`AuditService::log`]。写入失败只记录警告，不回滚、
//! 也不影响主操作的结果。每条成功写入的记录同时以 `audit` target 输出到
//! tracing，由日志层落到 `logs/audit/`。

use std::path::Path;

use serde_json::json;
use shared::error::AppResult;

use super::storage::AuditLedger;
use super::types::{AuditAction, AuditEntry, AuditExport, AuditLogRequest, PurgeResult};

#[derive(Clone, Debug)]
pub struct AuditService {
    ledger: AuditLedger,
}

impl AuditService {
    pub fn new(ledger: AuditLedger) -> Self {
        Self { ledger }
    }

    /// 底层账本（查询、统计等只读操作）
    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    /// 尽力写入；失败返回 `None`
    pub async fn log(&self, req: AuditLogRequest) -> Option<AuditEntry> {
        let action = req.action;
        let resource_type = req.resource_type.clone();

        match self.ledger.append(req).await {
            Ok(entry) => {
                tracing::info!(
                    target: "audit",
                    id = entry.id,
                    username = %entry.username,
                    action = %entry.action,
                    resource_type = %entry.resource_type,
                    resource_id = entry.resource_id.as_deref().unwrap_or(""),
                    "{}",
                    entry.description
                );
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(
                    action = %action,
                    resource_type = %resource_type,
                    error = %e,
                    "Failed to append audit entry"
                );
                None
            }
        }
    }

    /// 清理并记录一条 `purge` 条目（写在删除之后，因此不会被本次清理删掉）
    pub async fn purge(&self, actor: &str, older_than_days: u32) -> AppResult<PurgeResult> {
        let result = self.ledger.purge(older_than_days).await?;
        tracing::info!(
            actor = %actor,
            deleted = result.deleted,
            older_than_days,
            "Audit log purged"
        );

        self.log(
            AuditLogRequest::new(actor, AuditAction::Purge, "audit_log")
                .description(format!(
                    "Purged {} audit entries older than {} days",
                    result.deleted, older_than_days
                ))
                .info(json!({
                    "deleted": result.deleted,
                    "older_than_days": older_than_days,
                    "cutoff": result.cutoff,
                })),
        )
        .await;

        Ok(result)
    }

    /// 导出到文件并记录一条 `export` 条目
    pub async fn export(
        &self,
        actor: &str,
        path: &Path,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> AppResult<usize> {
        let total = self.ledger.export(path, start_date, end_date).await?;

        self.log(
            AuditLogRequest::new(actor, AuditAction::Export, "audit_log")
                .description(format!("Exported {total} audit entries"))
                .info(json!({
                    "path": path.display().to_string(),
                    "start_date": start_date,
                    "end_date": end_date,
                    "total": total,
                })),
        )
        .await;

        Ok(total)
    }

    /// HTTP 导出：返回内容而非写文件，同样记录 `export`
    pub async fn export_inline(
        &self,
        actor: &str,
        ip: Option<String>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> AppResult<AuditExport> {
        let export = self.ledger.export_entries(start_date, end_date).await?;

        self.log(
            AuditLogRequest::new(actor, AuditAction::Export, "audit_log")
                .description(format!("Exported {} audit entries", export.total))
                .ip(ip)
                .info(json!({
                    "start_date": start_date,
                    "end_date": end_date,
                    "total": export.total,
                })),
        )
        .await;

        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditQuery;
    use crate::db::DbService;
    use crate::utils::ManualClock;
    use crate::utils::time::MILLIS_PER_DAY;
    use std::sync::Arc;

    async fn service() -> (AuditService, Arc<ManualClock>) {
        let db = DbService::in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::at_date("2024-06-01").unwrap());
        (
            AuditService::new(AuditLedger::new(db.pool, clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn test_purge_entry_survives_purge() {
        let (service, clock) = service().await;
        service
            .log(AuditLogRequest::new("alice", AuditAction::Create, "product"))
            .await
            .unwrap();
        clock.advance_millis(MILLIS_PER_DAY * 10);

        let result = service.purge("alice", 5).await.unwrap();
        assert_eq!(result.deleted, 1);

        let remaining = service.ledger().query(&AuditQuery::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].action, AuditAction::Purge);
        assert_eq!(remaining[0].additional_info.as_ref().unwrap()["deleted"], 1);
    }

    #[tokio::test]
    async fn test_export_writes_file_and_logs() {
        let (service, _) = service().await;
        service
            .log(AuditLogRequest::new("alice", AuditAction::Login, "session"))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("audit.json");
        let total = service.export("alice", &path, None, None).await.unwrap();
        assert_eq!(total, 1);

        let content: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(content["total"], 1);
        assert_eq!(content["entries"][0]["action"], "login");

        let all = service.ledger().query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.last().unwrap().action, AuditAction::Export);
    }
}
