//! Error codes for the POS identity and access-control layer
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 8xxx: User account errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Serialized as a bare `u16` so the CLI, the agent server and remote
/// clients agree on the numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// No identity is attached to the caller
    NotAuthenticated = 1001,
    /// Invalid credentials (username/password)
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid (bad signature, malformed, wrong issuer)
    TokenInvalid = 1004,
    /// Account is deactivated
    AccountDisabled = 1007,

    // ==================== 2xxx: Permission ====================
    /// Role lacks the required permission
    PermissionDenied = 2001,

    // ==================== 8xxx: User ====================
    /// User not found
    UserNotFound = 8001,
    /// Username already taken
    UserAlreadyExists = 8002,
    /// A user cannot deactivate their own account
    CannotDeactivateSelf = 8003,
    /// The last active admin cannot be deactivated or demoted
    LastActiveAdmin = 8004,
    /// Role name is not one of admin/manager/cashier
    InvalidRole = 8101,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// File system error (export, key file)
    StorageIo = 9003,
    /// Configuration error
    ConfigError = 9005,
    /// Password hashing failed
    HashingFailed = 9006,
    /// Encryption or decryption failed
    EncryptionFailed = 9007,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "Not logged in",
            ErrorCode::InvalidCredentials => "Invalid username or password",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",
            ErrorCode::AccountDisabled => "Account is disabled",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",

            // User
            ErrorCode::UserNotFound => "User not found",
            ErrorCode::UserAlreadyExists => "Username already exists",
            ErrorCode::CannotDeactivateSelf => "Cannot deactivate own account",
            ErrorCode::LastActiveAdmin => "At least one active admin is required",
            ErrorCode::InvalidRole => "Invalid role",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::StorageIo => "Storage I/O error",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::HashingFailed => "Password hashing failed",
            ErrorCode::EncryptionFailed => "Encryption failed",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),
            1007 => Ok(ErrorCode::AccountDisabled),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),

            // User
            8001 => Ok(ErrorCode::UserNotFound),
            8002 => Ok(ErrorCode::UserAlreadyExists),
            8003 => Ok(ErrorCode::CannotDeactivateSelf),
            8004 => Ok(ErrorCode::LastActiveAdmin),
            8101 => Ok(ErrorCode::InvalidRole),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::StorageIo),
            9005 => Ok(ErrorCode::ConfigError),
            9006 => Ok(ErrorCode::HashingFailed),
            9007 => Ok(ErrorCode::EncryptionFailed),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
