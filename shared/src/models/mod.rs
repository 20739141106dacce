//! Data models
//!
//! Shared between the terminal CLI, the agent server and remote clients.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY).

pub mod role;
pub mod user;

// Re-exports
pub use role::*;
pub use user::*;
