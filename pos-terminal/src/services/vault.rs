//! Sensitive Data Vault
//!
//! Per `(resource_type, resource_id, field)` secrets encrypted with the
//! [`MasterKey`]. Every operation, reads included, is audited; audit values
//! carry only a mask and the length, never plaintext.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Value, json};
use sha2::Sha256;
use shared::error::{AppError, AppResult, ErrorCode};

use crate::audit::{AuditAction, AuditLogRequest, AuditService};
use crate::auth::CurrentUser;
use crate::crypto::MasterKey;
use crate::db::repository::{SensitiveRecord, SensitiveRepository};
use crate::utils::SharedClock;

const RESOURCE_TYPE: &str = "sensitive_data";

/// Address of one secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensitiveKey {
    pub resource_type: String,
    pub resource_id: String,
    pub field: String,
}

impl SensitiveKey {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        field: impl Into<String>,
    ) -> AppResult<Self> {
        let key = Self {
            resource_type: resource_type.into().trim().to_string(),
            resource_id: resource_id.into().trim().to_string(),
            field: field.into().trim().to_string(),
        };
        for (name, value) in [
            ("resource_type", &key.resource_type),
            ("resource_id", &key.resource_id),
            ("field", &key.field),
        ] {
            if value.is_empty() {
                return Err(AppError::with_message(
                    ErrorCode::RequiredField,
                    format!("{name} must not be empty"),
                )
                .with_detail("field", name));
            }
        }
        Ok(key)
    }

    fn audit_id(&self) -> String {
        format!("{}/{}/{}", self.resource_type, self.resource_id, self.field)
    }
}

/// Outcome of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    Created,
    Updated,
}

#[derive(Clone, Debug)]
pub struct SensitiveVault {
    repo: SensitiveRepository,
    key: MasterKey,
    audit: AuditService,
    clock: SharedClock,
}

impl SensitiveVault {
    pub fn new(
        repo: SensitiveRepository,
        key: MasterKey,
        audit: AuditService,
        clock: SharedClock,
    ) -> Self {
        Self {
            repo,
            key,
            audit,
            clock,
        }
    }

    pub async fn store(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        key: &SensitiveKey,
        value: &str,
    ) -> AppResult<StoreOutcome> {
        if value.is_empty() {
            return Err(AppError::with_message(
                ErrorCode::RequiredField,
                "Value must not be empty",
            ));
        }

        // 旧值的掩码在写入之前算好，写入之后不再有可失败的步骤
        let previous = self
            .find(key)
            .await?
            .map(|record| self.previous_mask(key, &record));
        let encrypted = self.key.encrypt_string(value)?;
        let created = self
            .repo
            .upsert(
                &key.resource_type,
                &key.resource_id,
                &key.field,
                &encrypted,
                &actor.username,
                self.clock.now_millis(),
            )
            .await?;

        let (outcome, action) = if created {
            (StoreOutcome::Created, AuditAction::Create)
        } else {
            (StoreOutcome::Updated, AuditAction::Update)
        };

        let mut req = AuditLogRequest::new(&actor.username, action, RESOURCE_TYPE)
            .resource_id(key.audit_id())
            .description(format!("Stored sensitive field {}", key.audit_id()))
            .new_value(masked(value))
            .ip(ip);
        if let Some(previous) = previous {
            req = req.previous(previous);
        }
        self.audit.log(req).await;

        Ok(outcome)
    }

    /// Decrypted value; audited as `access`
    pub async fn get(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        key: &SensitiveKey,
    ) -> AppResult<String> {
        let record = self.require(key).await?;
        let value = self.key.decrypt_string(&record.encrypted_value)?;

        self.audit
            .log(
                AuditLogRequest::new(&actor.username, AuditAction::Access, RESOURCE_TYPE)
                    .resource_id(key.audit_id())
                    .description(format!("Read sensitive field {}", key.audit_id()))
                    .ip(ip)
                    .info(json!({ "operation": "get" })),
            )
            .await;

        Ok(value)
    }

    pub async fn delete(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        key: &SensitiveKey,
    ) -> AppResult<()> {
        let record = self.require(key).await?;
        let previous = self.previous_mask(key, &record);
        self.repo
            .delete(&key.resource_type, &key.resource_id, &key.field)
            .await?;

        self.audit
            .log(
                AuditLogRequest::new(&actor.username, AuditAction::Delete, RESOURCE_TYPE)
                    .resource_id(key.audit_id())
                    .description(format!("Deleted sensitive field {}", key.audit_id()))
                    .previous(previous)
                    .ip(ip),
            )
            .await;

        Ok(())
    }

    /// Field metadata for one resource; no values
    pub async fn list(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        resource_type: &str,
        resource_id: &str,
    ) -> AppResult<Vec<SensitiveRecord>> {
        let records = self
            .repo
            .list(resource_type.trim(), resource_id.trim())
            .await?;

        self.audit
            .log(
                AuditLogRequest::new(&actor.username, AuditAction::Access, RESOURCE_TYPE)
                    .resource_id(format!("{}/{}", resource_type.trim(), resource_id.trim()))
                    .description("Listed sensitive fields")
                    .ip(ip)
                    .info(json!({ "operation": "list", "count": records.len() })),
            )
            .await;

        Ok(records)
    }

    /// Constant-time comparison of `candidate` with the stored value
    pub async fn check(
        &self,
        actor: &CurrentUser,
        ip: Option<String>,
        key: &SensitiveKey,
        candidate: &str,
    ) -> AppResult<bool> {
        let record = self.require(key).await?;
        let stored = self.key.decrypt_string(&record.encrypted_value)?;
        let matches = constant_time_eq(stored.as_bytes(), candidate.as_bytes())?;

        self.audit
            .log(
                AuditLogRequest::new(&actor.username, AuditAction::Access, RESOURCE_TYPE)
                    .resource_id(key.audit_id())
                    .description(format!("Checked sensitive field {}", key.audit_id()))
                    .ip(ip)
                    .info(json!({ "operation": "check", "matches": matches })),
            )
            .await;

        Ok(matches)
    }

    /// 被覆盖或删除的旧值掩码；旧密文解不开 (主密钥已更换) 时只记为不可读
    fn previous_mask(&self, key: &SensitiveKey, record: &SensitiveRecord) -> Value {
        match self.key.decrypt_string(&record.encrypted_value) {
            Ok(old) => masked(&old),
            Err(e) => {
                tracing::warn!(
                    field = %key.audit_id(),
                    error = %e.message,
                    "Previous sensitive value unreadable"
                );
                json!({ "value": "****", "unreadable": true })
            }
        }
    }

    async fn find(&self, key: &SensitiveKey) -> AppResult<Option<SensitiveRecord>> {
        Ok(self
            .repo
            .find(&key.resource_type, &key.resource_id, &key.field)
            .await?)
    }

    async fn require(&self, key: &SensitiveKey) -> AppResult<SensitiveRecord> {
        self.find(key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Sensitive field {}", key.audit_id())))
    }
}

/// Both sides are MAC'd under a throwaway key, so the comparison does not
/// depend on where the inputs first differ or on their lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> AppResult<bool> {
    let mut mac_key = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut mac_key);

    let tag = |data: &[u8]| -> AppResult<Hmac<Sha256>> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&mac_key)
            .map_err(|e| AppError::encryption(format!("HMAC init failed: {e}")))?;
        mac.update(data);
        Ok(mac)
    };

    let expected = tag(a)?.finalize().into_bytes();
    Ok(tag(b)?.verify_slice(&expected).is_ok())
}

fn masked(value: &str) -> Value {
    json!({ "value": "****", "length": value.chars().count() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLedger, AuditQuery};
    use crate::db::DbService;
    use crate::utils::time::system_clock;
    use shared::Role;

    async fn vault() -> SensitiveVault {
        let db = DbService::in_memory().await.unwrap();
        vault_with_key(&db, MasterKey::generate())
    }

    fn vault_with_key(db: &DbService, key: MasterKey) -> SensitiveVault {
        let clock = system_clock();
        SensitiveVault::new(
            SensitiveRepository::new(db.pool.clone()),
            key,
            AuditService::new(AuditLedger::new(db.pool.clone(), clock.clone())),
            clock,
        )
    }

    fn admin() -> CurrentUser {
        CurrentUser {
            id: 1,
            username: "alice".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret").unwrap());
        assert!(!constant_time_eq(b"secret", b"secreT").unwrap());
        assert!(!constant_time_eq(b"secret", b"secret-longer").unwrap());
    }

    #[test]
    fn test_key_requires_all_parts() {
        let err = SensitiveKey::new("customer", " ", "card").unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredField);
    }

    #[tokio::test]
    async fn test_store_get_check_delete() {
        let vault = vault().await;
        let user = admin();
        let key = SensitiveKey::new("customer", "42", "card").unwrap();

        let outcome = vault.store(&user, None, &key, "4111").await.unwrap();
        assert_eq!(outcome, StoreOutcome::Created);
        let outcome = vault.store(&user, None, &key, "5500").await.unwrap();
        assert_eq!(outcome, StoreOutcome::Updated);

        assert_eq!(vault.get(&user, None, &key).await.unwrap(), "5500");
        assert!(vault.check(&user, None, &key, "5500").await.unwrap());
        assert!(!vault.check(&user, None, &key, "4111").await.unwrap());

        let listed = vault.list(&user, None, "customer", "42").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].field, "card");

        vault.delete(&user, None, &key).await.unwrap();
        let err = vault.get(&user, None, &key).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_audit_never_contains_plaintext() {
        let vault = vault().await;
        let user = admin();
        let key = SensitiveKey::new("customer", "7", "ssn").unwrap();
        vault
            .store(&user, None, &key, "123-45-6789")
            .await
            .unwrap();
        vault.store(&user, None, &key, "987-65-4321").await.unwrap();
        vault.get(&user, None, &key).await.unwrap();
        vault.delete(&user, None, &key).await.unwrap();

        let entries = vault
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
                AuditAction::Update,
                AuditAction::Access,
                AuditAction::Delete
            ]
        );

        let dump = serde_json::to_string(&entries).unwrap();
        assert!(!dump.contains("123-45-6789"));
        assert!(!dump.contains("987-65-4321"));
    }

    #[tokio::test]
    async fn test_overwrite_after_key_change_is_audited() {
        let db = DbService::in_memory().await.unwrap();
        let user = admin();
        let key = SensitiveKey::new("customer", "9", "iban").unwrap();

        let old_vault = vault_with_key(&db, MasterKey::generate());
        old_vault.store(&user, None, &key, "first").await.unwrap();

        let vault = vault_with_key(&db, MasterKey::generate());
        let outcome = vault.store(&user, None, &key, "second").await.unwrap();
        assert_eq!(outcome, StoreOutcome::Updated);
        assert_eq!(vault.get(&user, None, &key).await.unwrap(), "second");

        let entries = vault
            .audit
            .ledger()
            .query(&AuditQuery::default())
            .await
            .unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Create, AuditAction::Update, AuditAction::Access]
        );
        let update = &entries[1];
        assert_eq!(update.previous_value.as_ref().unwrap()["unreadable"], true);
        assert_eq!(update.new_value.as_ref().unwrap()["length"], 6);
    }

    #[tokio::test]
    async fn test_delete_after_key_change() {
        let db = DbService::in_memory().await.unwrap();
        let user = admin();
        let key = SensitiveKey::new("customer", "9", "iban").unwrap();
        vault_with_key(&db, MasterKey::generate())
            .store(&user, None, &key, "first")
            .await
            .unwrap();

        let vault = vault_with_key(&db, MasterKey::generate());
        vault.delete(&user, None, &key).await.unwrap();
        let err = vault.get(&user, None, &key).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
