//! 审计日志类型定义
//!
//! 条目一经写入不可修改；唯一的破坏性操作是按保留期批量清理。

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::error::{AppError, AppResult, ErrorCode};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// 默认分页大小
pub const DEFAULT_QUERY_LIMIT: i64 = 50;
/// 最大分页大小
pub const MAX_QUERY_LIMIT: i64 = 1000;

/// 审计操作类型（枚举，非自由文本）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    /// 读取敏感数据
    Access,
    Login,
    LoginFailed,
    Logout,
    Backup,
    Restore,
    SettingsMod,
    PermissionMod,
    Export,
    Purge,
}

impl AuditAction {
    pub const ALL: [AuditAction; 13] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::Access,
        AuditAction::Login,
        AuditAction::LoginFailed,
        AuditAction::Logout,
        AuditAction::Backup,
        AuditAction::Restore,
        AuditAction::SettingsMod,
        AuditAction::PermissionMod,
        AuditAction::Export,
        AuditAction::Purge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Access => "access",
            AuditAction::Login => "login",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::Logout => "logout",
            AuditAction::Backup => "backup",
            AuditAction::Restore => "restore",
            AuditAction::SettingsMod => "settings_mod",
            AuditAction::PermissionMod => "permission_mod",
            AuditAction::Export => "export",
            AuditAction::Purge => "purge",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| {
                AppError::validation(format!("Unknown audit action: {s}")).with_detail("action", s)
            })
    }
}

/// 审计日志条目（不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 由账本分配的递增 ID
    pub id: i64,
    /// 时间戳（Unix 毫秒，序列化为 RFC 3339）
    #[serde(with = "rfc3339_millis")]
    pub timestamp: i64,
    /// 操作人
    pub username: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub description: String,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub ip_address: Option<String>,
    pub additional_info: Option<Value>,
}

impl<'r> FromRow<'r, SqliteRow> for AuditEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let action: String = row.try_get("action")?;
        let action = action
            .parse::<AuditAction>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            username: row.try_get("username")?,
            action,
            resource_type: row.try_get("resource_type")?,
            resource_id: row.try_get("resource_id")?,
            description: row.try_get("description")?,
            previous_value: json_column(row, "previous_value")?,
            new_value: json_column(row, "new_value")?,
            ip_address: row.try_get("ip_address")?,
            additional_info: json_column(row, "additional_info")?,
        })
    }
}

/// TEXT 列 → JSON；无法解析的历史值按字符串保留
fn json_column(row: &SqliteRow, column: &str) -> Result<Option<Value>, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    Ok(raw.map(|s| serde_json::from_str(&s).unwrap_or(Value::String(s))))
}

mod rfc3339_millis {
    use chrono::DateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(millis: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&shared::util::millis_to_rfc3339(*millis))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.timestamp_millis())
            .map_err(serde::de::Error::custom)
    }
}

/// 写入请求（ID 与时间戳由账本分配）
#[derive(Debug, Clone)]
pub struct AuditLogRequest {
    pub username: String,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub description: String,
    pub previous_value: Option<Value>,
    pub new_value: Option<Value>,
    pub ip_address: Option<String>,
    pub additional_info: Option<Value>,
}

impl AuditLogRequest {
    pub fn new(
        username: impl Into<String>,
        action: AuditAction,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            description: String::new(),
            previous_value: None,
            new_value: None,
            ip_address: None,
            additional_info: None,
        }
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn previous(mut self, value: Value) -> Self {
        self.previous_value = Some(value);
        self
    }

    pub fn new_value(mut self, value: Value) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn ip(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn info(mut self, info: Value) -> Self {
        self.additional_info = Some(info);
        self
    }
}

/// 审计日志查询参数
///
/// 空字符串等同于未提供。日期为 `YYYY-MM-DD` (UTC)，两端都包含整天。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub username: Option<String>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditQuery {
    /// 实际生效的 (limit, offset)
    pub fn page(&self) -> AppResult<(i64, i64)> {
        let limit = match self.limit {
            None => DEFAULT_QUERY_LIMIT,
            Some(l) if l < 0 => {
                return Err(AppError::with_message(
                    ErrorCode::ValueOutOfRange,
                    "limit must not be negative",
                )
                .with_detail("limit", l));
            }
            Some(l) => l.min(MAX_QUERY_LIMIT),
        };
        let offset = match self.offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(AppError::with_message(
                    ErrorCode::ValueOutOfRange,
                    "offset must not be negative",
                )
                .with_detail("offset", o));
            }
            Some(o) => o,
        };
        Ok((limit, offset))
    }

    /// 校验后的操作类型过滤
    pub fn action_filter(&self) -> AppResult<Option<AuditAction>> {
        self.action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::parse)
            .transpose()
    }
}

/// 审计日志分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditListResponse {
    pub items: Vec<AuditEntry>,
    /// 满足过滤条件的总数 (不受分页影响)
    pub total: i64,
}

/// 导出文件格式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExport {
    pub exported_at: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total: usize,
    pub entries: Vec<AuditEntry>,
}

/// 审计统计
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total: i64,
    pub oldest: Option<String>,
    pub newest: Option<String>,
    pub by_action: BTreeMap<String, i64>,
    pub by_resource_type: BTreeMap<String, i64>,
}

/// 清理结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeResult {
    pub deleted: u64,
    pub older_than_days: u32,
    /// 截止时间 (RFC 3339)，早于此时间的条目被删除
    pub cutoff: String,
}
