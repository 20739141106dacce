//! User Model

use serde::{Deserialize, Serialize};

use super::Role;

/// User account as returned by the API (without password hash)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccountResponse {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub is_active: bool,
    /// Unix millis of the last successful login
    pub last_login: Option<i64>,
    pub created_at: i64,
}

/// Create user payload
///
/// When `password` is absent a random one is generated and returned once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub password: Option<String>,
}

/// Update user payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Reset password payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordReset {
    #[serde(default)]
    pub password: Option<String>,
}

/// Result of an operation that may have generated a password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWithPassword {
    pub user: UserAccountResponse,
    /// Present only when the password was generated server-side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}
