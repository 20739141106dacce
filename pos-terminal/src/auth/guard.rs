//! Access Guard
//!
//! The one call surface every CLI command and HTTP handler goes through
//! before a privileged action. Identity comes from an [`IdentitySource`]: the
//! local [`SessionManager`](super::SessionManager), a validated token's
//! [`CurrentUser`], or nothing at all.

use serde::Serialize;
use shared::Role;
use shared::client::UserInfo;
use shared::error::{AppError, AppResult};

use super::jwt::Claims;
use super::permissions::role_has_permission;
use crate::db::repository::UserAccount;
use crate::security_log;

/// Resolved identity of the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn has_permission(&self, permission: &str) -> bool {
        role_has_permission(self.role, permission)
    }
}

impl From<&UserAccount> for CurrentUser {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

impl From<&CurrentUser> for UserInfo {
    fn from(user: &CurrentUser) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

impl TryFrom<Claims> for CurrentUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::invalid_token(format!("Malformed subject: {}", claims.sub)))?;
        Ok(Self {
            id,
            username: claims.username,
            role: claims.role,
        })
    }
}

/// Anything that may hold the caller's identity
pub trait IdentitySource {
    fn identity(&self) -> Option<&CurrentUser>;
}

impl IdentitySource for CurrentUser {
    fn identity(&self) -> Option<&CurrentUser> {
        Some(self)
    }
}

impl IdentitySource for Option<CurrentUser> {
    fn identity(&self) -> Option<&CurrentUser> {
        self.as_ref()
    }
}

impl<T: IdentitySource + ?Sized> IdentitySource for &T {
    fn identity(&self) -> Option<&CurrentUser> {
        (**self).identity()
    }
}

pub struct AccessGuard;

impl AccessGuard {
    /// Pure lookup against the identity's role; never fails
    pub fn has_permission(user: &CurrentUser, permission: &str) -> bool {
        user.has_permission(permission)
    }

    /// Resolve the identity and require `permission`
    ///
    /// No identity is `NotAuthenticated`; a role without the permission is
    /// `PermissionDenied`. Both are checked before the caller touches state.
    pub fn require_permission<'a, S>(source: &'a S, permission: &str) -> AppResult<&'a CurrentUser>
    where
        S: IdentitySource + ?Sized,
    {
        let Some(user) = source.identity() else {
            security_log!(WARN, "auth_missing", required_permission = permission);
            return Err(AppError::not_authenticated());
        };

        if !user.has_permission(permission) {
            security_log!(
                WARN,
                "permission_denied",
                user_id = user.id,
                username = user.username.as_str(),
                role = user.role.as_str(),
                required_permission = permission
            );
            return Err(
                AppError::permission_denied(format!("Permission denied: {permission}"))
                    .with_detail("required_permission", permission),
            );
        }

        Ok(user)
    }
}
