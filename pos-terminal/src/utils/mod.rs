//! 工具模块
//!
//! - [`AppError`] / [`AppResult`] - 统一错误类型 (from shared::error)
//! - [`logger`] - tracing 初始化与 `security_log!`
//! - [`time`] - 时钟抽象与日期范围

pub mod logger;
pub mod time;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
