//! 服务层
//!
//! - [`UserAdminService`] - 用户管理 (创建、角色、启停、重置密码)
//! - [`SensitiveVault`] - 加密存储的敏感字段

pub mod users;
pub mod vault;

pub use users::UserAdminService;
pub use vault::{SensitiveKey, SensitiveVault, StoreOutcome};
