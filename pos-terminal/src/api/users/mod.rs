//! User Administration API
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/users | GET | 用户列表 |
//! | /api/users | POST | 创建用户 |
//! | /api/users/{username} | PUT | 修改角色 / 启停 |
//! | /api/users/{username}/password | POST | 重置密码 |
//!
//! 全部要求 `user:manage`

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/users", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/{username}", put(handler::update))
        .route("/{username}/password", post(handler::reset_password))
        .route_layer(middleware::from_fn(require_permission("user:manage")))
}
