use std::sync::Arc;

use shared::error::AppResult;

use crate::audit::{AuditLedger, AuditService};
use crate::auth::jwt::generate_secret;
use crate::auth::{CredentialStore, HashCost, JwtConfig, JwtService, SessionManager};
use crate::core::Config;
use crate::crypto::MasterKey;
use crate::db::DbService;
use crate::db::repository::{SensitiveRepository, UserRepository};
use crate::services::{SensitiveVault, UserAdminService};
use crate::utils::SharedClock;
use crate::utils::time::system_clock;

/// 终端状态 - 持有所有服务的共享引用
///
/// CLI 与 agent 模式共用同一份状态；Clone 只复制句柄。
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置 (不可变) |
/// | db | SQLite 连接池 |
/// | clock | 令牌过期与审计时间戳的时间来源 |
/// | credentials | 用户与密码哈希 |
/// | tokens | agent 模式令牌服务 |
/// | audit | 审计服务 |
/// | users | 用户管理 |
/// | vault | 敏感数据 |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub db: DbService,
    pub clock: SharedClock,
    pub credentials: CredentialStore,
    pub tokens: Arc<JwtService>,
    pub audit: AuditService,
    pub users: UserAdminService,
    pub vault: SensitiveVault,
}

impl ServerState {
    /// 按配置打开数据库、加载主密钥并组装服务
    ///
    /// 配置了引导管理员且用户表为空时创建首个管理员。
    pub async fn initialize(config: Config) -> AppResult<Self> {
        std::fs::create_dir_all(&config.work_dir)?;
        let db = DbService::new(&config.database_url).await?;
        let key = MasterKey::load_or_create(&config.work_dir)?;
        let state = Self::build(config, db, key, system_clock());

        if let Some((username, password)) = &state.config.bootstrap_admin {
            state.users.bootstrap_admin(username, password).await?;
        }

        Ok(state)
    }

    /// 由现成组件组装
    pub fn build(config: Config, db: DbService, key: MasterKey, clock: SharedClock) -> Self {
        let credentials = CredentialStore::new(
            UserRepository::new(db.pool.clone()),
            config.hash_cost,
            clock.clone(),
        );
        let tokens = Arc::new(JwtService::with_config(config.jwt.clone(), clock.clone()));
        let audit = AuditService::new(AuditLedger::new(db.pool.clone(), clock.clone()));
        let users = UserAdminService::new(credentials.clone(), audit.clone());
        let vault = SensitiveVault::new(
            SensitiveRepository::new(db.pool.clone()),
            key,
            audit.clone(),
            clock.clone(),
        );

        Self {
            config: Arc::new(config),
            db,
            clock,
            credentials,
            tokens,
            audit,
            users,
            vault,
        }
    }

    /// 内存数据库 + 最低哈希开销 + 随机密钥，供测试与演示
    pub async fn ephemeral(clock: SharedClock) -> AppResult<Self> {
        let db = DbService::in_memory().await?;
        let config = Config {
            work_dir: std::env::temp_dir(),
            database_url: "sqlite::memory:".to_string(),
            http_port: 0,
            jwt: JwtConfig::new(generate_secret()?, 24 * 60 * 60),
            hash_cost: HashCost::minimal(),
            log_level: "info".to_string(),
            log_json: false,
            log_dir: None,
            request_timeout_ms: 30_000,
            login_delay_ms: 0,
            bootstrap_admin: None,
        };
        Ok(Self::build(config, db, MasterKey::generate(), clock))
    }

    /// 新的本地会话 (未认证)
    pub fn session(&self) -> SessionManager {
        SessionManager::new(self.credentials.clone(), self.audit.clone())
    }
}
