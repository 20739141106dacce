//! 认证中间件
//!
//! 为 agent 模式提供 Axum 中间件

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::{AccessGuard, Claims, CurrentUser, JwtError, JwtService};
use crate::core::ServerState;
use crate::security_log;
use shared::error::AppError;

/// 认证中间件 - 要求有效的 bearer token
///
/// 从 `Authorization: Bearer <token>` 头提取并验证令牌，
/// 成功后将 [`CurrentUser`] 与 [`Claims`] 注入请求扩展。
///
/// # 跳过认证的路径
///
/// - `OPTIONS *` (CORS 预检)
/// - 非 `/api/` 路径 (`/auth/login`, `/health`)
///
/// # 错误处理
///
/// | 错误 | HTTP 状态码 |
/// |------|------------|
/// | 无 Authorization 头 | 401 NotAuthenticated |
/// | 头格式错误 / 无效令牌 | 401 TokenInvalid |
/// | 令牌过期 | 401 TokenExpired |
pub async fn require_auth(
    State(state): State<ServerState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if req.method() == http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    if !req.uri().path().starts_with("/api/") {
        return Ok(next.run(req).await);
    }

    let claims = authenticate_headers(&state, req.headers(), req.uri())?;
    let user = CurrentUser::try_from(claims.clone())?;
    req.extensions_mut().insert(user);
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// 校验请求头中的令牌，返回令牌声明
pub(crate) fn authenticate_headers(
    state: &ServerState,
    headers: &http::HeaderMap,
    uri: &http::Uri,
) -> Result<Claims, AppError> {
    let auth_header = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) => JwtService::extract_from_header(header).ok_or_else(|| {
            security_log!(WARN, "auth_malformed", uri = uri.path());
            AppError::invalid_token("Invalid authorization header")
        })?,
        None => {
            security_log!(WARN, "auth_missing", uri = uri.path());
            return Err(AppError::not_authenticated());
        }
    };

    match state.tokens.validate_token(token) {
        Ok(claims) => Ok(claims),
        Err(e) => {
            security_log!(
                WARN,
                "auth_failed",
                error = e.to_string(),
                uri = uri.path()
            );

            match e {
                JwtError::ExpiredToken => Err(AppError::token_expired()),
                _ => Err(AppError::invalid_token("Invalid token")),
            }
        }
    }
}

/// 权限检查中间件 - 要求特定权限
///
/// ```ignore
/// Router::new()
///     .route("/api/users", get(handler::list))
///     .route_layer(middleware::from_fn(require_permission("user:manage")));
/// ```
///
/// 无身份返回 401，无权限返回 403
pub fn require_permission(
    permission: &'static str,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AppError>> + Send>>
+ Clone {
    move |req: Request, next: Next| {
        Box::pin(async move {
            let user = req.extensions().get::<CurrentUser>().cloned();
            AccessGuard::require_permission(&user, permission)?;
            Ok(next.run(req).await)
        })
    }
}
