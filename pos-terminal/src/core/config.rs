use std::path::{Path, PathBuf};

use shared::error::AppResult;

use crate::auth::{HashCost, JwtConfig};

/// 终端配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | POS_WORK_DIR | ./pos-data | 工作目录 (数据库、日志、密钥文件) |
/// | DATABASE_URL | sqlite://<work_dir>/pos.db?mode=rwc | 数据库地址 |
/// | HTTP_PORT | 8787 | agent 模式端口 |
/// | JWT_SECRET | 启动时随机生成 | 令牌签名密钥 (≥32 字符) |
/// | JWT_EXPIRATION_MINUTES | 1440 | 令牌有效期 |
/// | PASSWORD_HASH_COST | 19456 | Argon2 内存开销 (KiB) |
/// | PASSWORD_HASH_ITERATIONS | 2 | Argon2 迭代次数 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 格式控制台日志 |
/// | LOG_DIR | 无 | 日志文件目录 |
/// | REQUEST_TIMEOUT_MS | 30000 | 请求超时 (毫秒) |
/// | LOGIN_DELAY_MS | 500 | 登录接口固定延迟 (毫秒) |
/// | BOOTSTRAP_ADMIN_USERNAME / BOOTSTRAP_ADMIN_PASSWORD | 无 | 用户表为空时创建首个管理员 |
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: PathBuf,
    pub database_url: String,
    pub http_port: u16,
    pub jwt: JwtConfig,
    pub hash_cost: HashCost,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<PathBuf>,
    pub request_timeout_ms: u64,
    /// 登录接口的固定响应延迟，抹平用户存在与否的时间差
    pub login_delay_ms: u64,
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 只有 `JWT_SECRET` 设置了但过短时会失败
    pub fn from_env() -> AppResult<Self> {
        let work_dir = PathBuf::from(env_or("POS_WORK_DIR", "./pos-data"));
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url(&work_dir));

        let mut jwt = JwtConfig::from_env()?;
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            jwt.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("JWT_AUDIENCE") {
            jwt.audience = audience;
        }

        let bootstrap_admin = match (
            std::env::var("BOOTSTRAP_ADMIN_USERNAME"),
            std::env::var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Ok(u), Ok(p)) if !u.trim().is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        };

        Ok(Self {
            database_url,
            http_port: env_parse("HTTP_PORT", 8787),
            jwt,
            hash_cost: HashCost::from_env(),
            log_level: env_or("LOG_LEVEL", "info"),
            log_json: env_parse("LOG_JSON", false),
            log_dir: std::env::var("LOG_DIR").ok().map(PathBuf::from),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30_000),
            login_delay_ms: env_parse("LOGIN_DELAY_MS", 500),
            bootstrap_admin,
            work_dir,
        })
    }

    /// 覆盖工作目录；数据库地址若是旧目录的默认值则一并跟随
    pub fn set_work_dir(&mut self, work_dir: PathBuf) {
        if self.database_url == default_database_url(&self.work_dir) {
            self.database_url = default_database_url(&work_dir);
        }
        self.work_dir = work_dir;
    }

    /// `LOG_DIR` 或 `<work_dir>/logs`
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.join("logs"))
    }
}

fn default_database_url(work_dir: &Path) -> String {
    format!("sqlite://{}/pos.db?mode=rwc", work_dir.display())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_fallback() {
        assert_eq!(env_parse("POS_TEST_UNSET_VARIABLE", 42u16), 42);
        assert!(!env_parse("POS_TEST_UNSET_VARIABLE", false));
    }

    #[test]
    fn test_set_work_dir_moves_default_database() {
        let mut config = Config {
            work_dir: PathBuf::from("./pos-data"),
            database_url: default_database_url(Path::new("./pos-data")),
            http_port: 8787,
            jwt: JwtConfig::new("x".repeat(32), 60),
            hash_cost: HashCost::minimal(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            request_timeout_ms: 30_000,
            login_delay_ms: 500,
            bootstrap_admin: None,
        };
        config.set_work_dir(PathBuf::from("/tmp/pos"));
        assert_eq!(config.database_url, "sqlite:///tmp/pos/pos.db?mode=rwc");
        assert_eq!(config.resolved_log_dir(), PathBuf::from("/tmp/pos/logs"));

        config.database_url = "sqlite::memory:".into();
        config.set_work_dir(PathBuf::from("/srv/pos"));
        assert_eq!(config.database_url, "sqlite::memory:");
    }
}
