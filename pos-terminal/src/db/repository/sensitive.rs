//! Sensitive Data Repository
//!
//! Stores only ciphertext; encryption happens in the vault service.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::RepoResult;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SensitiveRecord {
    pub id: i64,
    pub resource_type: String,
    pub resource_id: String,
    pub field: String,
    #[serde(skip_serializing)]
    pub encrypted_value: String,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

const SENSITIVE_COLUMNS: &str =
    "id, resource_type, resource_id, field, encrypted_value, created_by, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct SensitiveRepository {
    pool: SqlitePool,
}

impl SensitiveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(
        &self,
        resource_type: &str,
        resource_id: &str,
        field: &str,
    ) -> RepoResult<Option<SensitiveRecord>> {
        let sql = format!(
            "SELECT {SENSITIVE_COLUMNS} FROM sensitive_data WHERE resource_type = ? AND resource_id = ? AND field = ?"
        );
        let record = sqlx::query_as::<_, SensitiveRecord>(&sql)
            .bind(resource_type)
            .bind(resource_id)
            .bind(field)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Fields stored for one resource, ordered by field name
    pub async fn list(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> RepoResult<Vec<SensitiveRecord>> {
        let sql = format!(
            "SELECT {SENSITIVE_COLUMNS} FROM sensitive_data WHERE resource_type = ? AND resource_id = ? ORDER BY field"
        );
        let records = sqlx::query_as::<_, SensitiveRecord>(&sql)
            .bind(resource_type)
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    /// Insert or replace the ciphertext; returns `true` when a new row was created
    pub async fn upsert(
        &self,
        resource_type: &str,
        resource_id: &str,
        field: &str,
        encrypted_value: &str,
        actor: &str,
        now: i64,
    ) -> RepoResult<bool> {
        let existed = self.find(resource_type, resource_id, field).await?.is_some();

        sqlx::query(
            r#"INSERT INTO sensitive_data
                (resource_type, resource_id, field, encrypted_value, created_by, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (resource_type, resource_id, field)
               DO UPDATE SET encrypted_value = excluded.encrypted_value, updated_at = excluded.updated_at"#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(field)
        .bind(encrypted_value)
        .bind(actor)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(!existed)
    }

    /// Returns `true` if a row was removed
    pub async fn delete(
        &self,
        resource_type: &str,
        resource_id: &str,
        field: &str,
    ) -> RepoResult<bool> {
        let rows = sqlx::query(
            "DELETE FROM sensitive_data WHERE resource_type = ? AND resource_id = ? AND field = ?",
        )
        .bind(resource_type)
        .bind(resource_id)
        .bind(field)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }
}
