//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// - 0xxx: General errors
/// - 1xxx: Authentication errors
/// - 2xxx: Permission errors
/// - 8xxx: User account errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Authentication errors (1xxx)
    Auth,
    /// Permission errors (2xxx)
    Permission,
    /// User account errors (8xxx)
    User,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Auth,
            2000..3000 => Self::Permission,
            8000..9000 => Self::User,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::User => "user",
            Self::System => "system",
        }
    }

    /// Whether errors of this category stem from who the caller is
    /// (authentication or authorization) rather than what they asked for.
    pub fn is_access_denial(&self) -> bool {
        matches!(self, Self::Auth | Self::Permission)
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Auth);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Permission);
        assert_eq!(ErrorCategory::from_code(8001), ErrorCategory::User);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::Success.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::TokenExpired.category(), ErrorCategory::Auth);
        assert_eq!(
            ErrorCode::PermissionDenied.category(),
            ErrorCategory::Permission
        );
        assert_eq!(ErrorCode::UserNotFound.category(), ErrorCategory::User);
        assert_eq!(ErrorCode::HashingFailed.category(), ErrorCategory::System);
    }

    #[test]
    fn test_access_denial() {
        assert!(ErrorCategory::Auth.is_access_denial());
        assert!(ErrorCategory::Permission.is_access_denial());
        assert!(!ErrorCategory::User.is_access_denial());
        assert!(!ErrorCategory::System.is_access_denial());
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&ErrorCategory::Permission).unwrap();
        assert_eq!(json, "\"permission\"");

        let category: ErrorCategory = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(category, ErrorCategory::User);
    }
}
