//! 审计日志 SQLite 存储层
//!
//! Append-only：没有更新接口，删除只有按保留期的批量清理 [`AuditLedger::purge`]。
//! ID 来自 `INTEGER PRIMARY KEY AUTOINCREMENT`，时间戳由账本时钟分配，
//! 查询统一按 `id ASC` 排序，分页稳定。

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use shared::error::{AppError, AppResult};
use shared::util::millis_to_rfc3339;
use sqlx::SqlitePool;

use super::types::{
    AuditEntry, AuditExport, AuditLogRequest, AuditQuery, AuditStatistics, PurgeResult,
};
use crate::db::query_builder::QueryBuilder;
use crate::db::repository::RepoError;
use crate::utils::SharedClock;
use crate::utils::time::{MILLIS_PER_DAY, date_range_millis};

const AUDIT_COLUMNS: &str = "id, timestamp, username, action, resource_type, resource_id, \
     description, previous_value, new_value, ip_address, additional_info";

/// 审计账本
#[derive(Clone, Debug)]
pub struct AuditLedger {
    pool: SqlitePool,
    clock: SharedClock,
}

impl AuditLedger {
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// 追加一条审计日志
    pub async fn append(&self, req: AuditLogRequest) -> AppResult<AuditEntry> {
        let timestamp = self.clock.now_millis();

        let result = sqlx::query(
            r#"INSERT INTO audit_log
                (timestamp, username, action, resource_type, resource_id, description,
                 previous_value, new_value, ip_address, additional_info)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(timestamp)
        .bind(&req.username)
        .bind(req.action.as_str())
        .bind(&req.resource_type)
        .bind(&req.resource_id)
        .bind(&req.description)
        .bind(to_json_text(&req.previous_value))
        .bind(to_json_text(&req.new_value))
        .bind(&req.ip_address)
        .bind(to_json_text(&req.additional_info))
        .execute(&self.pool)
        .await
        .map_err(RepoError::from)?;

        Ok(AuditEntry {
            id: result.last_insert_rowid(),
            timestamp,
            username: req.username,
            action: req.action,
            resource_type: req.resource_type,
            resource_id: req.resource_id,
            description: req.description,
            previous_value: req.previous_value,
            new_value: req.new_value,
            ip_address: req.ip_address,
            additional_info: req.additional_info,
        })
    }

    /// 按 ID 读取
    pub async fn get(&self, id: i64) -> AppResult<AuditEntry> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE id = ?");
        sqlx::query_as::<_, AuditEntry>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepoError::from)?
            .ok_or_else(|| AppError::not_found(format!("Audit entry {id}")))
    }

    /// 过滤查询；所有提供的（非空）条件同时满足
    pub async fn query(&self, q: &AuditQuery) -> AppResult<Vec<AuditEntry>> {
        let (limit, offset) = q.page()?;
        let qb = filter(q)?;

        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log{} ORDER BY id ASC LIMIT ? OFFSET ?",
            qb.build_where_clause()
        );
        let entries = qb
            .apply_bindings(sqlx::query_as::<_, AuditEntry>(&sql))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from)?;
        Ok(entries)
    }

    /// 满足过滤条件的总数（忽略分页）
    pub async fn count(&self, q: &AuditQuery) -> AppResult<i64> {
        let qb = filter(q)?;
        let sql = format!("SELECT COUNT(*) FROM audit_log{}", qb.build_where_clause());
        let total = qb
            .apply_bindings_scalar(sqlx::query_scalar::<_, i64>(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(RepoError::from)?;
        Ok(total)
    }

    /// 日期范围内的全部条目，不分页
    pub async fn export_entries(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> AppResult<AuditExport> {
        let (from, to) = date_range_millis(start_date, end_date)?;
        let mut qb = QueryBuilder::new();
        qb.min_i64("timestamp", from).before_i64("timestamp", to);

        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log{} ORDER BY id ASC",
            qb.build_where_clause()
        );
        let entries = qb
            .apply_bindings(sqlx::query_as::<_, AuditEntry>(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from)?;

        Ok(AuditExport {
            exported_at: millis_to_rfc3339(self.clock.now_millis()),
            start_date: non_blank(start_date),
            end_date: non_blank(end_date),
            total: entries.len(),
            entries,
        })
    }

    /// 导出为 JSON 文件，返回写入的条目数
    pub async fn export(
        &self,
        path: &Path,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> AppResult<usize> {
        let export = self.export_entries(start_date, end_date).await?;
        let json = serde_json::to_vec_pretty(&export)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        Ok(export.total)
    }

    /// 删除时间戳严格早于 `now - days` 的条目，返回删除数量
    pub async fn purge(&self, older_than_days: u32) -> AppResult<PurgeResult> {
        let cutoff = self.clock.now_millis() - i64::from(older_than_days) * MILLIS_PER_DAY;
        let deleted = sqlx::query("DELETE FROM audit_log WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(RepoError::from)?
            .rows_affected();

        Ok(PurgeResult {
            deleted,
            older_than_days,
            cutoff: millis_to_rfc3339(cutoff),
        })
    }

    /// 聚合统计（只读）
    pub async fn statistics(&self) -> AppResult<AuditStatistics> {
        let (total, oldest, newest): (i64, Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM audit_log")
                .fetch_one(&self.pool)
                .await
                .map_err(RepoError::from)?;

        Ok(AuditStatistics {
            total,
            oldest: oldest.map(millis_to_rfc3339),
            newest: newest.map(millis_to_rfc3339),
            by_action: self.group_count("action").await?,
            by_resource_type: self.group_count("resource_type").await?,
        })
    }

    async fn group_count(&self, column: &'static str) -> AppResult<BTreeMap<String, i64>> {
        let sql = format!("SELECT {column}, COUNT(*) FROM audit_log GROUP BY {column}");
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::from)?;
        Ok(rows.into_iter().collect())
    }
}

fn filter(q: &AuditQuery) -> AppResult<QueryBuilder> {
    let action = q.action_filter()?;
    let (from, to) = date_range_millis(q.start_date.as_deref(), q.end_date.as_deref())?;

    let mut qb = QueryBuilder::new();
    qb.eq_text("username", q.username.as_deref())
        .eq_text("action", action.map(|a| a.as_str()))
        .eq_text("resource_type", q.resource_type.as_deref())
        .min_i64("timestamp", from)
        .before_i64("timestamp", to);
    Ok(qb)
}

fn to_json_text(value: &Option<Value>) -> Option<String> {
    value.as_ref().map(Value::to_string)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
