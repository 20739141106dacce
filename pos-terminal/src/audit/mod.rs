//! 审计日志模块
//!
//! # 架构
//!
//! ```text
//! 受保护操作完成
//!   └─ AuditService::log() → AuditLedger::append() → SQLite (audit_log 表)
//!                         └→ tracing target "audit" → logs/audit/
//! ```
//!
//! - **Append-only**: 没有更新接口，唯一的删除是 [`AuditLedger::purge`]
//! - **尽力写入**: 写入失败记录 warn，不回滚主操作
//! - **稳定排序**: 查询按 `id ASC`，分页稳定

pub mod diff;
pub mod service;
pub mod storage;
pub mod types;

pub use service::AuditService;
pub use storage::AuditLedger;
pub use types::{
    AuditAction, AuditEntry, AuditExport, AuditListResponse, AuditLogRequest, AuditQuery,
    AuditStatistics, PurgeResult,
};
