//! Shared types for the POS terminal
//!
//! Error system, wire models and small utilities used by the terminal
//! crate and by remote agent clients.

pub mod client;
pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
pub use models::Role;
pub use serde::{Deserialize, Serialize};
