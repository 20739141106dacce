//! API 路由模块
//!
//! # 结构
//!
//! - [`health`] - 健康检查
//! - [`auth`] - 登录、当前用户、登出
//! - [`users`] - 用户管理 (`user:manage`)
//! - [`audit_log`] - 审计日志查询、导出、清理
//! - [`sensitive`] - 敏感数据读写
//!
//! 除 `/health` 与 `/auth/login` 外的所有路由都在 `/api/` 下，
//! 由全局 [`require_auth`](crate::auth::require_auth) 校验令牌，
//! 再由各自的 `require_permission` route layer 校验权限。

pub mod audit_log;
pub mod auth;
pub mod health;
pub mod sensitive;
pub mod users;

// Re-export common types for handlers
pub use crate::utils::{AppError, AppResult};
