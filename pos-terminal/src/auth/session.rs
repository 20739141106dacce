//! 本地 CLI 会话
//!
//! 进程内唯一的身份槽位：`Unauthenticated` ⇄ `Authenticated(CurrentUser)`。
//! 没有过期计时，只有 [`SessionManager::logout`] 或进程退出会结束会话。
//! 由命令分发器持有，不是全局状态。

use serde_json::json;
use shared::error::AppResult;

use super::credential::{CredentialStore, LoginFailure};
use super::guard::{CurrentUser, IdentitySource};
use crate::audit::{AuditAction, AuditLogRequest, AuditService};
use crate::db::repository::UserAccount;
use crate::security_log;

pub(crate) const RESOURCE_TYPE: &str = "session";
const LOCAL_MODE: &str = "local";

#[derive(Debug)]
pub struct SessionManager {
    credentials: CredentialStore,
    audit: AuditService,
    current: Option<CurrentUser>,
}

impl SessionManager {
    pub fn new(credentials: CredentialStore, audit: AuditService) -> Self {
        Self {
            credentials,
            audit,
            current: None,
        }
    }

    /// 登录
    ///
    /// 成功：记录 last_login、切换到已认证状态、写入 `login` 审计。
    /// 失败：写入 `login_failed` 审计（含原因，不含密码），当前状态不变。
    pub async fn login(&mut self, username: &str, password: &str) -> AppResult<&CurrentUser> {
        let user = match self.credentials.authenticate(username, password).await {
            Ok(user) => user,
            Err(failure) => {
                record_login_failure(&self.audit, username, &failure, LOCAL_MODE, None).await;
                return Err(failure.into());
            }
        };

        let now = self.credentials.clock().now_millis();
        self.credentials.update_last_login(user.id, now).await?;
        record_login(&self.audit, &user, LOCAL_MODE, None).await;

        Ok(self.current.insert(CurrentUser::from(&user)))
    }

    /// 登出，无条件回到未认证状态
    pub async fn logout(&mut self) -> Option<CurrentUser> {
        let previous = self.current.take();

        if let Some(user) = &previous {
            self.audit
                .log(
                    AuditLogRequest::new(&user.username, AuditAction::Logout, RESOURCE_TYPE)
                        .resource_id(user.id)
                        .description(format!("User {} logged out", user.username))
                        .info(json!({ "mode": "local" })),
                )
                .await;
            tracing::info!(username = %user.username, "Local session closed");
        }

        previous
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.current.as_ref()
    }
}

/// 成功登录：`login` 审计 + info 日志
pub(crate) async fn record_login(
    audit: &AuditService,
    user: &UserAccount,
    mode: &str,
    ip: Option<String>,
) {
    audit
        .log(
            AuditLogRequest::new(&user.username, AuditAction::Login, RESOURCE_TYPE)
                .resource_id(user.id)
                .description(format!("User {} logged in", user.username))
                .ip(ip)
                .info(json!({ "mode": mode, "role": user.role })),
        )
        .await;
    tracing::info!(username = %user.username, role = %user.role, mode, "Login succeeded");
}

/// 失败登录：安全日志 + `login_failed` 审计 (记录原因，不记录密码)
pub(crate) async fn record_login_failure(
    audit: &AuditService,
    username: &str,
    failure: &LoginFailure,
    mode: &str,
    ip: Option<String>,
) {
    security_log!(
        WARN,
        "login_failed",
        username = username,
        reason = failure.reason(),
        mode = mode
    );

    let resource_id = match failure {
        LoginFailure::WrongPassword(user) | LoginFailure::Disabled(user) => {
            Some(user.id.to_string())
        }
        _ => None,
    };

    let mut req = AuditLogRequest::new(username.trim(), AuditAction::LoginFailed, RESOURCE_TYPE)
        .description(format!("Failed login attempt for {}", username.trim()))
        .ip(ip)
        .info(json!({ "mode": mode, "reason": failure.reason() }));
    req.resource_id = resource_id;
    audit.log(req).await;
}

impl IdentitySource for SessionManager {
    fn identity(&self) -> Option<&CurrentUser> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLedger, AuditQuery};
    use crate::auth::credential::{HashCost, NewUser};
    use crate::auth::guard::AccessGuard;
    use crate::db::DbService;
    use crate::db::repository::UserRepository;
    use crate::utils::time::system_clock;
    use shared::{ErrorCode, Role};

    async fn session() -> SessionManager {
        let db = DbService::in_memory().await.unwrap();
        let clock = system_clock();
        let credentials = CredentialStore::new(
            UserRepository::new(db.pool.clone()),
            HashCost::minimal(),
            clock.clone(),
        );
        credentials
            .create_user(NewUser {
                username: "alice".to_string(),
                password: "Secret1!".to_string(),
                role: Role::Admin,
            })
            .await
            .unwrap();
        let audit = AuditService::new(AuditLedger::new(db.pool, clock));
        SessionManager::new(credentials, audit)
    }

    #[tokio::test]
    async fn test_login_logout_cycle() {
        let mut session = session().await;
        assert!(!session.is_authenticated());

        let user = session.login("alice", "Secret1!").await.unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(session.is_authenticated());
        assert!(AccessGuard::require_permission(&session, "user:manage").is_ok());

        let previous = session.logout().await;
        assert_eq!(previous.unwrap().username, "alice");
        assert!(session.current_user().is_none());

        let err = AccessGuard::require_permission(&session, "user:manage").unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_state_and_is_audited() {
        let mut session = session().await;
        session.login("alice", "Secret1!").await.unwrap();

        let err = session.login("alice", "wrong").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCredentials);
        assert_eq!(session.current_user().unwrap().username, "alice");

        let q = AuditQuery {
            action: Some("login_failed".to_string()),
            ..Default::default()
        };
        let entries = session.audit.ledger().query(&q).await.unwrap();
        assert_eq!(entries.len(), 1);
        let info = entries[0].additional_info.as_ref().unwrap();
        assert_eq!(info["reason"], "invalid_password");
        assert!(!info.to_string().contains("wrong"));
    }

    #[tokio::test]
    async fn test_logout_when_unauthenticated_is_noop() {
        let mut session = session().await;
        assert!(session.logout().await.is_none());
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_records_last_login() {
        let mut session = session().await;
        session.login("alice", "Secret1!").await.unwrap();
        let user = session.credentials.require_user("alice").await.unwrap();
        assert!(user.last_login.is_some());
    }
}
