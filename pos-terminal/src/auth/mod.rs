//! 认证授权模块
//!
//! - [`CredentialStore`] - 用户记录与 Argon2id 密码哈希
//! - [`SessionManager`] - 本地 CLI 会话 (单一身份槽位)
//! - [`JwtService`] - agent 模式的无状态令牌
//! - [`AccessGuard`] - 所有受保护操作的唯一入口
//! - [`require_auth`] / [`require_permission`] - Axum 中间件

pub mod credential;
pub mod extractor;
pub mod guard;
pub mod jwt;
pub mod middleware;
pub mod permissions;
pub mod session;

pub use credential::{CredentialStore, HashCost, LoginFailure, NewUser};
pub use extractor::ClientIp;
pub use guard::{AccessGuard, CurrentUser, IdentitySource};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService};
pub use middleware::{require_auth, require_permission};
pub use session::SessionManager;
