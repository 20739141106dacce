//! User Repository

use serde::Serialize;
use shared::Role;
use shared::models::UserAccountResponse;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqlitePool};

use super::{RepoError, RepoResult};

/// Stored user account, including the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<i64>,
    pub created_at: i64,
}

impl<'r> FromRow<'r, SqliteRow> for UserAccount {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role
            .parse::<Role>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            role,
            is_active: row.try_get("is_active")?,
            last_login: row.try_get("last_login")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl From<&UserAccount> for UserAccountResponse {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, password_hash, role, is_active, last_login, created_at";

#[derive(Clone, Debug)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All users, ordered by username
    pub async fn find_all(&self) -> RepoResult<Vec<UserAccount>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY username");
        let users = sqlx::query_as::<_, UserAccount>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn find_by_id(&self, id: i64) -> RepoResult<Option<UserAccount>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> RepoResult<Option<UserAccount>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ? LIMIT 1");
        let user = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Insert a new user; a taken username surfaces as [`RepoError::Duplicate`]
    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        created_at: i64,
    ) -> RepoResult<UserAccount> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepoError::Database(format!("User {id} vanished after insert")))
    }

    pub async fn update_role(&self, id: i64, role: Role) -> RepoResult<()> {
        let rows = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        ensure_found(rows, id)
    }

    pub async fn set_active(&self, id: i64, is_active: bool) -> RepoResult<()> {
        let rows = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        ensure_found(rows, id)
    }

    pub async fn update_password_hash(&self, id: i64, password_hash: &str) -> RepoResult<()> {
        let rows = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        ensure_found(rows, id)
    }

    pub async fn update_last_login(&self, id: i64, timestamp: i64) -> RepoResult<()> {
        let rows = sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(timestamp)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        ensure_found(rows, id)
    }

    pub async fn count(&self) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_active_admins(&self) -> RepoResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn ensure_found(rows_affected: u64, id: i64) -> RepoResult<()> {
    if rows_affected == 0 {
        return Err(RepoError::NotFound(format!("User {id} not found")));
    }
    Ok(())
}
