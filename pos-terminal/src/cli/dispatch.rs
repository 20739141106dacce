//! 命令分发器
//!
//! 持有本地会话 ([`SessionManager`])，这是 CLI 唯一的身份来源。
//! 每条命令先经 [`AccessGuard::require_permission`] 检查一次，再执行。

use std::io::{BufRead, Write};

use shared::error::{AppError, AppResult};
use shared::models::{UserCreate, UserWithPassword};
use shared::util::millis_to_rfc3339;

use super::commands::{AuditCommand, Operation, SensitiveCommand, UserCommand};
use crate::audit::{AuditEntry, AuditQuery};
use crate::auth::permissions::permissions_for;
use crate::auth::{AccessGuard, CurrentUser, SessionManager};
use crate::core::ServerState;
use crate::services::SensitiveKey;

/// 清理前的人工确认
pub type ConfirmFn = Box<dyn FnMut(&str) -> bool + Send>;

pub struct Dispatcher {
    state: ServerState,
    session: SessionManager,
    confirm: ConfirmFn,
}

impl Dispatcher {
    /// 未认证会话；确认提示读 stdin
    pub fn new(state: ServerState) -> Self {
        let session = state.session();
        Self {
            state,
            session,
            confirm: Box::new(stdin_confirm),
        }
    }

    pub fn with_confirm(mut self, confirm: ConfirmFn) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub async fn login(&mut self, username: &str, password: &str) -> AppResult<&CurrentUser> {
        self.session.login(username, password).await
    }

    /// 执行一条命令，结果写入 `out`；确认提示交给 [`Dispatcher::with_confirm`] 设置的函数
    pub async fn dispatch(&mut self, op: Operation, out: &mut dyn Write) -> AppResult<()> {
        let mut confirm = std::mem::replace(&mut self.confirm, Box::new(decline));
        let result = self.dispatch_confirming(op, out, confirm.as_mut()).await;
        self.confirm = confirm;
        result
    }

    /// 同 [`Dispatcher::dispatch`]，但确认由调用方回答
    ///
    /// shell 持有输入流，确认必须从同一个流读取。
    pub async fn dispatch_confirming(
        &mut self,
        op: Operation,
        out: &mut dyn Write,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> AppResult<()> {
        let actor = match op.required_permission() {
            Some(permission) => {
                Some(AccessGuard::require_permission(&self.session, permission)?.clone())
            }
            None => None,
        };

        match (op, actor) {
            (Operation::Login { username, password }, _) => {
                let user = self.session.login(&username, &password).await?;
                writeln!(out, "Logged in as {} ({})", user.username, user.role)?;
            }
            (Operation::Logout, _) => match self.session.logout().await {
                Some(user) => writeln!(out, "Logged out {}", user.username)?,
                None => writeln!(out, "Not logged in")?,
            },
            (Operation::Whoami, _) => match self.session.current_user() {
                Some(user) => {
                    writeln!(out, "{} (id {}, role {})", user.username, user.id, user.role)?;
                    writeln!(out, "permissions: {}", permissions_for(user.role).join(", "))?;
                }
                None => writeln!(out, "Not logged in")?,
            },
            (Operation::User { cmd }, Some(actor)) => self.user(&actor, cmd, out).await?,
            (Operation::Audit { cmd }, Some(actor)) => {
                self.audit(&actor, cmd, out, confirm).await?
            }
            (Operation::Sensitive { cmd }, Some(actor)) => {
                self.sensitive(&actor, cmd, out).await?
            }
            (_, None) => return Err(AppError::not_authenticated()),
        }

        Ok(())
    }

    async fn user(
        &self,
        actor: &CurrentUser,
        cmd: UserCommand,
        out: &mut dyn Write,
    ) -> AppResult<()> {
        let users = &self.state.users;
        match cmd {
            UserCommand::List => {
                for u in users.list().await? {
                    let last_login = u
                        .last_login
                        .map(millis_to_rfc3339)
                        .unwrap_or_else(|| "never".to_string());
                    writeln!(
                        out,
                        "{:>4}  {:<20} {:<8} {:<8} last login: {}",
                        u.id,
                        u.username,
                        u.role.as_str(),
                        if u.is_active { "active" } else { "inactive" },
                        last_login
                    )?;
                }
            }
            UserCommand::Add {
                username,
                role,
                password,
            } => {
                let created = users
                    .add(
                        actor,
                        None,
                        UserCreate {
                            username,
                            role,
                            password,
                        },
                    )
                    .await?;
                writeln!(
                    out,
                    "Created user {} ({})",
                    created.user.username, created.user.role
                )?;
                print_generated(&created, out)?;
            }
            UserCommand::Update { username, role } => {
                let u = users.update_role(actor, None, &username, role).await?;
                writeln!(out, "User {} is now {}", u.username, u.role)?;
            }
            UserCommand::Activate { username } => {
                let u = users.set_active(actor, None, &username, true).await?;
                writeln!(out, "Activated {}", u.username)?;
            }
            UserCommand::Deactivate { username } => {
                let u = users.set_active(actor, None, &username, false).await?;
                writeln!(out, "Deactivated {}", u.username)?;
            }
            UserCommand::ResetPassword { username, password } => {
                let reset = users
                    .reset_password(actor, None, &username, password)
                    .await?;
                writeln!(out, "Password reset for {}", reset.user.username)?;
                print_generated(&reset, out)?;
            }
        }
        Ok(())
    }

    async fn audit(
        &self,
        actor: &CurrentUser,
        cmd: AuditCommand,
        out: &mut dyn Write,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> AppResult<()> {
        let audit = &self.state.audit;
        match cmd {
            AuditCommand::List {
                start,
                end,
                user,
                action,
                resource,
                limit,
                offset,
            } => {
                let query = AuditQuery {
                    username: user,
                    action,
                    resource_type: resource,
                    start_date: start,
                    end_date: end,
                    limit,
                    offset,
                };
                let entries = audit.ledger().query(&query).await?;
                let total = audit.ledger().count(&query).await?;
                for entry in &entries {
                    print_entry_line(entry, out)?;
                }
                writeln!(out, "{} of {} entries", entries.len(), total)?;
            }
            AuditCommand::View { id } => {
                let entry = audit.ledger().get(id).await?;
                writeln!(out, "{}", serde_json::to_string_pretty(&entry)?)?;
            }
            AuditCommand::Export { path, start, end } => {
                let count = audit
                    .export(&actor.username, &path, start.as_deref(), end.as_deref())
                    .await?;
                writeln!(out, "Exported {} entries to {}", count, path.display())?;
            }
            AuditCommand::Purge { days, yes } => {
                let prompt = format!(
                    "Permanently delete audit entries older than {days} days? [y/N] "
                );
                if !yes && !confirm(&prompt) {
                    writeln!(out, "Purge cancelled")?;
                    return Ok(());
                }
                let result = audit.purge(&actor.username, days).await?;
                writeln!(
                    out,
                    "Purged {} entries older than {}",
                    result.deleted, result.cutoff
                )?;
            }
            AuditCommand::Stats => {
                let stats = audit.ledger().statistics().await?;
                writeln!(out, "total: {}", stats.total)?;
                writeln!(out, "oldest: {}", stats.oldest.as_deref().unwrap_or("-"))?;
                writeln!(out, "newest: {}", stats.newest.as_deref().unwrap_or("-"))?;
                writeln!(out, "by action:")?;
                for (action, count) in &stats.by_action {
                    writeln!(out, "  {action:<16} {count}")?;
                }
                writeln!(out, "by resource type:")?;
                for (resource_type, count) in &stats.by_resource_type {
                    writeln!(out, "  {resource_type:<16} {count}")?;
                }
            }
        }
        Ok(())
    }

    async fn sensitive(
        &self,
        actor: &CurrentUser,
        cmd: SensitiveCommand,
        out: &mut dyn Write,
    ) -> AppResult<()> {
        let vault = &self.state.vault;
        match cmd {
            SensitiveCommand::Store {
                resource_type,
                resource_id,
                field,
                value,
            } => {
                let key = SensitiveKey::new(resource_type, resource_id, field)?;
                let outcome = vault.store(actor, None, &key, &value).await?;
                writeln!(out, "{outcome:?}")?;
            }
            SensitiveCommand::Get {
                resource_type,
                resource_id,
                field,
            } => {
                let key = SensitiveKey::new(resource_type, resource_id, field)?;
                writeln!(out, "{}", vault.get(actor, None, &key).await?)?;
            }
            SensitiveCommand::Delete {
                resource_type,
                resource_id,
                field,
            } => {
                let key = SensitiveKey::new(resource_type, resource_id, field)?;
                vault.delete(actor, None, &key).await?;
                writeln!(out, "Deleted")?;
            }
            SensitiveCommand::List {
                resource_type,
                resource_id,
            } => {
                let records = vault
                    .list(actor, None, &resource_type, &resource_id)
                    .await?;
                for r in &records {
                    writeln!(
                        out,
                        "{}  (by {}, updated {})",
                        r.field,
                        r.created_by,
                        millis_to_rfc3339(r.updated_at)
                    )?;
                }
                writeln!(out, "{} fields", records.len())?;
            }
            SensitiveCommand::Check {
                resource_type,
                resource_id,
                field,
                value,
            } => {
                let key = SensitiveKey::new(resource_type, resource_id, field)?;
                let matches = vault.check(actor, None, &key, &value).await?;
                writeln!(out, "{}", if matches { "match" } else { "no match" })?;
            }
        }
        Ok(())
    }
}

fn print_generated(result: &UserWithPassword, out: &mut dyn Write) -> AppResult<()> {
    if let Some(password) = &result.generated_password {
        writeln!(out, "Generated password (shown once): {password}")?;
    }
    Ok(())
}

fn print_entry_line(entry: &AuditEntry, out: &mut dyn Write) -> AppResult<()> {
    writeln!(
        out,
        "{:>6}  {}  {:<12} {:<14} {}{}  {}",
        entry.id,
        millis_to_rfc3339(entry.timestamp),
        entry.username,
        entry.action.as_str(),
        entry.resource_type,
        entry
            .resource_id
            .as_deref()
            .map(|id| format!("/{id}"))
            .unwrap_or_default(),
        entry.description
    )?;
    Ok(())
}

/// 提示写到 stderr，从 `input` 读一行；EOF 或读失败视为否
pub(crate) fn read_confirmation<R: BufRead + ?Sized>(input: &mut R, prompt: &str) -> bool {
    eprint!("{prompt}");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(n) if n > 0 => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        _ => false,
    }
}

fn stdin_confirm(prompt: &str) -> bool {
    read_confirmation(&mut std::io::stdin().lock(), prompt)
}

fn decline(_: &str) -> bool {
    false
}
