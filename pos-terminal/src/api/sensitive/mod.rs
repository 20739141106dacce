//! Sensitive Data API
//!
//! | 路径 | 方法 | 权限 |
//! |------|------|------|
//! | /api/sensitive/{resource_type}/{resource_id} | GET | sensitive:read |
//! | /api/sensitive/{resource_type}/{resource_id}/{field} | GET | sensitive:read |
//! | /api/sensitive/{resource_type}/{resource_id}/{field}/check | POST | sensitive:read |
//! | /api/sensitive/{resource_type}/{resource_id}/{field} | PUT | sensitive:write |
//! | /api/sensitive/{resource_type}/{resource_id}/{field} | DELETE | sensitive:write |

mod handler;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::require_permission;
use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/sensitive", routes())
}

fn routes() -> Router<ServerState> {
    let read_routes = Router::new()
        .route("/{resource_type}/{resource_id}", get(handler::list))
        .route("/{resource_type}/{resource_id}/{field}", get(handler::get))
        .route(
            "/{resource_type}/{resource_id}/{field}/check",
            post(handler::check),
        )
        .route_layer(middleware::from_fn(require_permission("sensitive:read")));

    let write_routes = Router::new()
        .route(
            "/{resource_type}/{resource_id}/{field}",
            put(handler::store).delete(handler::delete),
        )
        .route_layer(middleware::from_fn(require_permission("sensitive:write")));

    read_routes.merge(write_routes)
}
