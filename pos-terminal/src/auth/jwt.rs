//! JWT 令牌服务
//!
//! Agent 模式下的无状态 bearer token：HS256 签名，包含用户 ID、用户名、角色。
//! 过期时间由注入的 [`Clock`](crate::utils::Clock) 判定，便于测试推进时间。

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use shared::Role;
use shared::error::AppError;
use thiserror::Error;

use crate::utils::SharedClock;

/// 默认签发者
pub const DEFAULT_ISSUER: &str = "pos-terminal";
/// 默认受众
pub const DEFAULT_AUDIENCE: &str = "pos-clients";
/// 默认有效期 (分钟)
pub const DEFAULT_EXPIRATION_MINUTES: i64 = 1440;

/// JWT 配置
#[derive(Clone)]
pub struct JwtConfig {
    /// 签名密钥 (至少 32 字节)
    pub secret: String,
    /// 令牌有效期 (秒)
    pub ttl_seconds: i64,
    /// 令牌签发者
    pub issuer: String,
    /// 令牌受众
    pub audience: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>, ttl_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_seconds,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
        }
    }

    /// 从环境变量加载
    ///
    /// - `JWT_SECRET`: 至少 32 个字符，否则报配置错误；未设置时生成随机密钥
    /// - `JWT_EXPIRATION_MINUTES`: 默认 1440 (24 小时)
    pub fn from_env() -> Result<Self, JwtError> {
        let secret = match std::env::var("JWT_SECRET") {
            Ok(secret) => {
                if secret.len() < 32 {
                    return Err(JwtError::Config(
                        "JWT_SECRET must be at least 32 characters long".to_string(),
                    ));
                }
                secret
            }
            Err(_) => {
                tracing::warn!(
                    "JWT_SECRET not set, generating an ephemeral key; tokens will not survive a restart"
                );
                generate_secret()?
            }
        };

        let minutes = std::env::var("JWT_EXPIRATION_MINUTES")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(DEFAULT_EXPIRATION_MINUTES);

        Ok(Self::new(secret, minutes * 60))
    }
}

/// 生成 256-bit 随机密钥 (base64 编码)
pub fn generate_secret() -> Result<String, JwtError> {
    let rng = SystemRandom::new();
    let mut key = [0u8; 32];
    rng.fill(&mut key)
        .map_err(|_| JwtError::Config("Failed to generate secure random key".to_string()))?;
    Ok(BASE64.encode(key))
}

/// 令牌中的 Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 ID
    pub sub: String,
    /// 用户名
    pub username: String,
    /// 角色
    pub role: Role,
    /// 签发时间戳 (秒)
    pub iat: i64,
    /// 过期时间戳 (秒)
    pub exp: i64,
    /// 签发者
    pub iss: String,
    /// 受众
    pub aud: String,
}

/// JWT 错误
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("无效令牌: {0}")]
    InvalidToken(String),

    #[error("令牌已过期")]
    ExpiredToken,

    #[error("无效签名")]
    InvalidSignature,

    #[error("令牌生成失败: {0}")]
    GenerationFailed(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::ExpiredToken => AppError::token_expired(),
            JwtError::InvalidSignature => AppError::invalid_token("Invalid token signature"),
            JwtError::InvalidToken(msg) => AppError::invalid_token(msg),
            JwtError::GenerationFailed(msg) => AppError::internal(msg),
            JwtError::Config(msg) => AppError::config(msg),
        }
    }
}

/// JWT 令牌服务
#[derive(Clone)]
pub struct JwtService {
    pub config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: SharedClock,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("ttl_seconds", &self.config.ttl_seconds)
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn with_config(config: JwtConfig, clock: SharedClock) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
            clock,
        }
    }

    /// 为用户签发令牌
    pub fn generate_token(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
    ) -> Result<String, JwtError> {
        let now = self.clock.now_secs();

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role,
            iat: now,
            exp: now + self.config.ttl_seconds,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::GenerationFailed(e.to_string()))
    }

    /// 验证并解码令牌
    ///
    /// 签名、签发者、受众交给 jsonwebtoken 校验；过期由本服务的时钟判定，
    /// 没有宽限期。
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                _ => JwtError::InvalidToken(format!("Token validation failed: {e}")),
            }
        })?;

        if self.clock.now_secs() > token_data.claims.exp {
            return Err(JwtError::ExpiredToken);
        }

        Ok(token_data.claims)
    }

    /// 从 Authorization 头提取令牌
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// 令牌有效期 (秒)
    pub fn expires_in(&self) -> i64 {
        self.config.ttl_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use std::sync::Arc;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn service(ttl: i64) -> (JwtService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let service = JwtService::with_config(JwtConfig::new(SECRET, ttl), clock.clone());
        (service, clock)
    }

    #[test]
    fn test_generate_and_validate() {
        let (service, _) = service(3600);
        let token = service.generate_token(7, "alice", Role::Manager).unwrap();
        let claims = service.validate_token(&token).unwrap();

        assert_eq!(claims.sub, "7");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);
    }

    #[test]
    fn test_expired_token() {
        let (service, clock) = service(1);
        let token = service.generate_token(1, "bob", Role::Cashier).unwrap();

        clock.advance_secs(1);
        assert!(service.validate_token(&token).is_ok());

        clock.advance_secs(1);
        assert!(matches!(
            service.validate_token(&token),
            Err(JwtError::ExpiredToken)
        ));
    }

    #[test]
    fn test_tampered_token() {
        let (service, _) = service(3600);
        let token = service.generate_token(1, "bob", Role::Cashier).unwrap();

        let mut chars: Vec<char> = token.chars().collect();
        let last = chars.len() - 2;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert!(service.validate_token(&tampered).is_err());
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let (service, clock) = service(3600);
        let token = service.generate_token(1, "bob", Role::Admin).unwrap();

        let other = JwtService::with_config(
            JwtConfig::new("ffffffffffffffffffffffffffffffff", 3600),
            clock,
        );
        assert!(matches!(
            other.validate_token(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_garbage_token() {
        let (service, _) = service(3600);
        assert!(matches!(
            service.validate_token("not.a.jwt"),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_extract_from_header() {
        assert_eq!(JwtService::extract_from_header("Bearer abc"), Some("abc"));
        assert_eq!(JwtService::extract_from_header("Basic abc"), None);
        assert_eq!(JwtService::extract_from_header("Bearer "), None);
    }

    #[test]
    fn test_error_mapping() {
        use shared::ErrorCode;
        assert_eq!(
            AppError::from(JwtError::ExpiredToken).code,
            ErrorCode::TokenExpired
        );
        assert_eq!(
            AppError::from(JwtError::InvalidSignature).code,
            ErrorCode::TokenInvalid
        );
    }

    #[test]
    fn test_generated_secret_is_long_enough() {
        let secret = generate_secret().unwrap();
        assert!(secret.len() >= 32);
        assert_ne!(secret, generate_secret().unwrap());
    }
}
