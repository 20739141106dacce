//! Request Extractors
//!
//! [`CurrentUser`] for handlers behind the auth middleware, and [`ClientIp`]
//! for the `ip_address` column of audit entries.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use crate::auth::CurrentUser;
use crate::auth::middleware::authenticate_headers;
use crate::core::ServerState;
use shared::error::AppError;

impl FromRequestParts<ServerState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        // Already resolved by require_auth
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let claims = authenticate_headers(state, &parts.headers, &parts.uri)?;
        let user = CurrentUser::try_from(claims)?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Caller address: first `X-Forwarded-For` hop, else the socket peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Ok(ClientIp(ip))
    }
}
