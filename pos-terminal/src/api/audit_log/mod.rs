//! Audit Log API 模块 (审计日志查询、导出、清理)
//!
//! | 路径 | 方法 | 权限 |
//! |------|------|------|
//! | /api/audit | GET | audit:read |
//! | /api/audit/stats | GET | audit:read |
//! | /api/audit/{id} | GET | audit:read |
//! | /api/audit/export | GET | audit:export |
//! | /api/audit | DELETE | audit:purge |

mod handler;

use axum::{
    Router, middleware,
    routing::{delete, get},
};

use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/audit", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/", get(handler::list))
        .route("/stats", get(handler::stats))
        .route("/{id}", get(handler::get_by_id))
        .route_layer(middleware::from_fn(require_permission("audit:read")));

    let export_routes = Router::new()
        .route("/export", get(handler::export))
        .route_layer(middleware::from_fn(require_permission("audit:export")));

    let purge_routes = Router::new()
        .route("/", delete(handler::purge))
        .route_layer(middleware::from_fn(require_permission("audit:purge")));

    read_routes.merge(export_routes).merge(purge_routes)
}
