//! Client-related types shared between server and client
//!
//! Request/response types for the agent-mode auth API.

use serde::{Deserialize, Serialize};

use crate::models::Role;

// =============================================================================
// Auth API DTOs
// =============================================================================

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserInfo,
    /// Token lifetime in seconds
    pub expires_in: i64,
}

/// Identity carried by a session or token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// Current user response (`/api/auth/me`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub permissions: Vec<String>,
    /// Token expiry (Unix seconds)
    pub expires_at: i64,
}
