//! 核心模块 - 配置、状态与 agent 服务器
//!
//! - [`Config`] - 环境变量配置
//! - [`ServerState`] - 共享服务句柄
//! - [`Server`] - agent 模式 HTTP 服务器

pub mod config;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::{Server, build_app};
pub use state::ServerState;
