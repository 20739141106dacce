//! User Administration
//!
//! Mutations on user accounts behind `user:manage`. Accounts are never
//! deleted, only deactivated. Every change is audited with a filtered
//! snapshot (no password hash) and a field diff.

use serde_json::json;
use shared::Role;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{UserAccountResponse, UserCreate, UserWithPassword};
use shared::util::random_alphanumeric;

use crate::audit::diff::{create_diff, create_snapshot};
use crate::audit::{AuditAction, AuditLogRequest, AuditService};
use crate::auth::{CredentialStore, CurrentUser, NewUser};
use crate::db::repository::UserAccount;

const RESOURCE_TYPE: &str = "user";
const GENERATED_PASSWORD_LEN: usize = 16;

/// Actor name recorded for changes made at startup
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Clone, Debug)]
pub struct UserAdminService {
    credentials: CredentialStore,
    audit: AuditService,
}

impl UserAdminService {
    pub fn new(credentials: CredentialStore, audit: AuditService) -> Self {
        Self { credentials, audit }
    }

    pub async fn list(&self) -> AppResult<Vec<UserAccountResponse>> {
        let users = self.credentials.users().find_all().await?;
        Ok(users.iter().map(UserAccountResponse::from).collect())
    }

    /// Create a user; generates a password when none is supplied
    pub async fn add(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        payload: UserCreate,
    ) -> AppResult<UserWithPassword> {
        let (password, generated) = match payload.password.filter(|p| !p.is_empty()) {
            Some(p) => (p, None),
            None => {
                let p = random_alphanumeric(GENERATED_PASSWORD_LEN);
                (p.clone(), Some(p))
            }
        };

        let user = self
            .credentials
            .create_user(NewUser {
                username: payload.username,
                password,
                role: payload.role,
            })
            .await?;

        tracing::info!(actor = %actor.username, username = %user.username, role = %user.role, "User created");
        self.audit_create(&actor.username, ip, &user).await;

        Ok(UserWithPassword {
            user: UserAccountResponse::from(&user),
            generated_password: generated,
        })
    }

    pub async fn update_role(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        username: &str,
        role: Role,
    ) -> AppResult<UserAccountResponse> {
        let before = self.credentials.require_user(username).await?;
        if before.role == role {
            return Ok(UserAccountResponse::from(&before));
        }
        if before.role == Role::Admin && before.is_active {
            self.ensure_other_active_admin(&before).await?;
        }

        self.credentials.users().update_role(before.id, role).await?;
        let after = self.reload(&before).await?;

        tracing::info!(actor = %actor.username, username = %after.username, from = %before.role, to = %after.role, "User role changed");
        self.audit_update(
            &actor.username,
            ip,
            AuditAction::PermissionMod,
            &before,
            &after,
            format!("Changed role of {} from {} to {}", after.username, before.role, after.role),
        )
        .await;

        Ok(UserAccountResponse::from(&after))
    }

    pub async fn set_active(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        username: &str,
        is_active: bool,
    ) -> AppResult<UserAccountResponse> {
        let before = self.credentials.require_user(username).await?;
        if before.is_active == is_active {
            return Ok(UserAccountResponse::from(&before));
        }
        if !is_active {
            if before.id == actor.id {
                return Err(AppError::with_message(
                    ErrorCode::CannotDeactivateSelf,
                    "You cannot deactivate your own account",
                ));
            }
            if before.role == Role::Admin {
                self.ensure_other_active_admin(&before).await?;
            }
        }

        self.credentials
            .users()
            .set_active(before.id, is_active)
            .await?;
        let after = self.reload(&before).await?;

        let verb = if is_active { "Activated" } else { "Deactivated" };
        tracing::info!(actor = %actor.username, username = %after.username, is_active, "User status changed");
        self.audit_update(
            &actor.username,
            ip,
            AuditAction::Update,
            &before,
            &after,
            format!("{verb} user {}", after.username),
        )
        .await;

        Ok(UserAccountResponse::from(&after))
    }

    /// Replace the password; returns the generated one when none is supplied
    pub async fn reset_password(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        username: &str,
        password: Option<String>,
    ) -> AppResult<UserWithPassword> {
        let user = self.credentials.require_user(username).await?;
        let (password, generated) = match password.filter(|p| !p.is_empty()) {
            Some(p) => (p, None),
            None => {
                let p = random_alphanumeric(GENERATED_PASSWORD_LEN);
                (p.clone(), Some(p))
            }
        };

        let hash = self.credentials.hash_password(&password)?;
        self.credentials
            .users()
            .update_password_hash(user.id, &hash)
            .await?;

        tracing::info!(actor = %actor.username, username = %user.username, "Password reset");
        self.audit
            .log(
                AuditLogRequest::new(&actor.username, AuditAction::Update, RESOURCE_TYPE)
                    .resource_id(user.id)
                    .description(format!("Reset password of {}", user.username))
                    .ip(ip)
                    .info(json!({
                        "operation": "reset_password",
                        "generated": generated.is_some(),
                    })),
            )
            .await;

        Ok(UserWithPassword {
            user: UserAccountResponse::from(&user),
            generated_password: generated,
        })
    }

    /// Create the first admin when the user table is empty
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        password: &str,
    ) -> AppResult<Option<UserAccount>> {
        if self.credentials.users().count().await? > 0 {
            return Ok(None);
        }

        let user = self
            .credentials
            .create_user(NewUser {
                username: username.to_string(),
                password: password.to_string(),
                role: Role::Admin,
            })
            .await?;

        tracing::info!(username = %user.username, "Bootstrap admin created");
        self.audit_create(SYSTEM_ACTOR, None, &user).await;
        Ok(Some(user))
    }

    async fn ensure_other_active_admin(&self, user: &UserAccount) -> AppResult<()> {
        if self.credentials.users().count_active_admins().await? <= 1 {
            return Err(AppError::with_message(
                ErrorCode::LastActiveAdmin,
                "The last active admin cannot be deactivated or demoted",
            )
            .with_detail("username", user.username.as_str()));
        }
        Ok(())
    }

    async fn reload(&self, user: &UserAccount) -> AppResult<UserAccount> {
        self.credentials
            .users()
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::with_message(ErrorCode::UserNotFound, "User vanished"))
    }

    async fn audit_create(&self, actor: &str, ip: Option<String>, user: &UserAccount) {
        self.audit
            .log(
                AuditLogRequest::new(actor, AuditAction::Create, RESOURCE_TYPE)
                    .resource_id(user.id)
                    .description(format!("Created user {} ({})", user.username, user.role))
                    .new_value(create_snapshot(user, RESOURCE_TYPE))
                    .ip(ip),
            )
            .await;
    }

    async fn audit_update(
        &self,
        actor: &str,
        ip: Option<String>,
        action: AuditAction,
        before: &UserAccount,
        after: &UserAccount,
        description: String,
    ) {
        self.audit
            .log(
                AuditLogRequest::new(actor, action, RESOURCE_TYPE)
                    .resource_id(after.id)
                    .description(description)
                    .previous(create_snapshot(before, RESOURCE_TYPE))
                    .new_value(create_snapshot(after, RESOURCE_TYPE))
                    .ip(ip)
                    .info(create_diff(before, after, RESOURCE_TYPE)),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLedger, AuditQuery};
    use crate::auth::HashCost;
    use crate::db::DbService;
    use crate::db::repository::UserRepository;
    use crate::utils::time::system_clock;

    async fn service() -> (UserAdminService, CurrentUser) {
        let db = DbService::in_memory().await.unwrap();
        let clock = system_clock();
        let credentials = CredentialStore::new(
            UserRepository::new(db.pool.clone()),
            HashCost::minimal(),
            clock.clone(),
        );
        let audit = AuditService::new(AuditLedger::new(db.pool, clock));
        let service = UserAdminService::new(credentials, audit);

        let admin = service
            .bootstrap_admin("root", "Secret1!")
            .await
            .unwrap()
            .unwrap();
        (service, CurrentUser::from(&admin))
    }

    fn create(username: &str, role: Role, password: Option<&str>) -> UserCreate {
        UserCreate {
            username: username.to_string(),
            role,
            password: password.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_only_once() {
        let (service, _) = service().await;
        assert!(
            service
                .bootstrap_admin("other", "pw")
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_generates_password() {
        let (service, admin) = service().await;
        let created = service
            .add(&admin, None, create("bob", Role::Cashier, None))
            .await
            .unwrap();
        let password = created.generated_password.unwrap();
        assert_eq!(password.len(), 16);
        assert!(service.credentials.authenticate("bob", &password).await.is_ok());

        let supplied = service
            .add(&admin, None, create("carol", Role::Manager, Some("pw")))
            .await
            .unwrap();
        assert!(supplied.generated_password.is_none());
    }

    #[tokio::test]
    async fn test_last_admin_protection() {
        let (service, admin) = service().await;

        let err = service
            .update_role(&admin, None, "root", Role::Manager)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LastActiveAdmin);

        service
            .add(&admin, None, create("second", Role::Admin, Some("pw")))
            .await
            .unwrap();
        let err = service
            .set_active(&admin, None, "root", false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CannotDeactivateSelf);

        let second = CurrentUser::from(
            &service
                .credentials
                .require_user("second")
                .await
                .unwrap(),
        );
        let root = service
            .set_active(&second, None, "root", false)
            .await
            .unwrap();
        assert!(!root.is_active);

        let err = service
            .update_role(&second, None, "second", Role::Cashier)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::LastActiveAdmin);
    }

    #[tokio::test]
    async fn test_mutations_are_audited_without_hash() {
        let (service, admin) = service().await;
        service
            .add(&admin, None, create("bob", Role::Cashier, Some("pw")))
            .await
            .unwrap();
        service
            .update_role(&admin, Some("10.0.0.1".into()), "bob", Role::Manager)
            .await
            .unwrap();
        service
            .reset_password(&admin, None, "bob", None)
            .await
            .unwrap();

        let entries = service
            .audit
            .ledger()
            .query(&AuditQuery::default())
            .await
            .unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Create,
                AuditAction::Create,
                AuditAction::PermissionMod,
                AuditAction::Update
            ]
        );
        assert_eq!(entries[0].username, SYSTEM_ACTOR);

        let role_change = &entries[2];
        assert_eq!(role_change.ip_address.as_deref(), Some("10.0.0.1"));
        let diff = role_change.additional_info.as_ref().unwrap();
        assert_eq!(diff["changes"][0]["field"], "role");
        assert_eq!(diff["changes"][0]["to"], "manager");

        let dump = serde_json::to_string(&entries).unwrap();
        assert!(!dump.contains("$argon2"));
        assert!(!dump.contains("password_hash"));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (service, admin) = service().await;
        let err = service
            .set_active(&admin, None, "ghost", false)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UserNotFound);
    }
}
