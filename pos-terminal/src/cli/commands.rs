//! Command line surface
//!
//! Every [`Operation`] declares the permission it needs in one place,
//! [`Operation::required_permission`]; the dispatcher checks it once before
//! running anything.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use shared::Role;

#[derive(Parser, Debug)]
#[command(name = "pos", version, about = "Terminal POS access control")]
pub struct Cli {
    /// Log in as this user before running the command (`pos --user alice user list`)
    #[arg(long, short = 'u', env = "POS_USER")]
    pub user: Option<String>,

    /// Password for --user
    #[arg(long, short = 'p', env = "POS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Data directory (also: POS_WORK_DIR)
    #[arg(long, global = true, env = "POS_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Log level (also: LOG_LEVEL)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP agent
    Serve {
        /// Listen port (also: HTTP_PORT)
        #[arg(long, env = "HTTP_PORT")]
        port: Option<u16>,
    },
    /// Interactive shell with a persistent local session
    Shell,
    #[command(flatten)]
    Op(Operation),
}

/// Commands that run against a local session, one-shot or in the shell
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Operation {
    /// Open the local session
    Login { username: String, password: String },
    /// Close the local session
    Logout,
    /// Show the current identity and its permissions
    Whoami,
    /// User administration
    User {
        #[command(subcommand)]
        cmd: UserCommand,
    },
    /// Audit log
    Audit {
        #[command(subcommand)]
        cmd: AuditCommand,
    },
    /// Encrypted per-record fields
    Sensitive {
        #[command(subcommand)]
        cmd: SensitiveCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum UserCommand {
    List,
    Add {
        username: String,
        role: Role,
        /// Generated when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Change a user's role
    Update { username: String, role: Role },
    Activate { username: String },
    Deactivate { username: String },
    ResetPassword {
        username: String,
        /// Generated when omitted
        #[arg(long)]
        password: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum AuditCommand {
    List {
        /// YYYY-MM-DD, inclusive
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD, inclusive
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    View { id: i64 },
    Export {
        path: PathBuf,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Delete entries older than DAYS
    Purge {
        days: u32,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    Stats,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum SensitiveCommand {
    Store {
        resource_type: String,
        resource_id: String,
        field: String,
        value: String,
    },
    Get {
        resource_type: String,
        resource_id: String,
        field: String,
    },
    Delete {
        resource_type: String,
        resource_id: String,
        field: String,
    },
    List {
        resource_type: String,
        resource_id: String,
    },
    /// Compare a value with the stored one without revealing it
    Check {
        resource_type: String,
        resource_id: String,
        field: String,
        value: String,
    },
}

impl Operation {
    /// `None` for session commands that need no permission
    pub fn required_permission(&self) -> Option<&'static str> {
        match self {
            Operation::Login { .. } | Operation::Logout | Operation::Whoami => None,
            Operation::User { .. } => Some("user:manage"),
            Operation::Audit { cmd } => Some(match cmd {
                AuditCommand::List { .. } | AuditCommand::View { .. } | AuditCommand::Stats => {
                    "audit:read"
                }
                AuditCommand::Export { .. } => "audit:export",
                AuditCommand::Purge { .. } => "audit:purge",
            }),
            Operation::Sensitive { cmd } => Some(match cmd {
                SensitiveCommand::Store { .. } | SensitiveCommand::Delete { .. } => {
                    "sensitive:write"
                }
                SensitiveCommand::Get { .. }
                | SensitiveCommand::List { .. }
                | SensitiveCommand::Check { .. } => "sensitive:read",
            }),
        }
    }
}

/// One line typed into the shell
#[derive(Parser, Debug)]
#[command(name = "pos", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub op: Operation,
}
