//! POS Terminal - 终端收银的身份认证与访问控制层
//!
//! # 架构概述
//!
//! - **凭据** (`auth::credential`): 用户记录 + Argon2id 密码哈希
//! - **本地会话** (`auth::session`): CLI 进程内单一身份槽位
//! - **令牌** (`auth::jwt`): agent 模式的无状态 bearer token
//! - **权限** (`auth::permissions`, `auth::guard`): 静态角色权限表 + 唯一检查入口
//! - **审计** (`audit`): 仅追加的审计账本
//! - **敏感数据** (`services::vault`): AES-256-GCM 加密字段
//!
//! # 模块结构
//!
//! ```text
//! pos-terminal/src/
//! ├── core/          # 配置、状态、agent 服务器
//! ├── auth/          # 凭据、会话、令牌、权限
//! ├── audit/         # 审计账本
//! ├── services/      # 用户管理、敏感数据
//! ├── api/           # HTTP 路由和处理器
//! ├── cli/           # clap 命令、分发器、shell
//! ├── utils/         # 日志、时钟
//! └── db/            # SQLite 存储
//! ```

pub mod api;
pub mod audit;
pub mod auth;
pub mod cli;
pub mod core;
pub mod crypto;
pub mod db;
pub mod services;
pub mod utils;

// Re-export 公共类型
pub use audit::{AuditLedger, AuditService};
pub use auth::{AccessGuard, CredentialStore, CurrentUser, JwtService, SessionManager};
pub use core::{Config, Server, ServerState};
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
