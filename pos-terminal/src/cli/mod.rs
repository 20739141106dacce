//! 命令行界面
//!
//! - [`commands`] - clap 定义，每条命令声明所需权限
//! - [`dispatch`] - 持有本地会话，检查权限后执行
//! - [`shell`] - 交互式 shell

pub mod commands;
pub mod dispatch;
pub mod shell;

pub use commands::{Cli, Command, Operation, ShellLine};
pub use dispatch::Dispatcher;
pub use shell::Shell;
