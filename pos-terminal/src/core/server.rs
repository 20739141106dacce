//! Agent-mode HTTP server

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use http::StatusCode;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::require_auth;
use crate::core::ServerState;
use shared::error::{AppError, AppResult};

/// All routes, no middleware
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(api::health::router())
        .merge(api::auth::router())
        .merge(api::users::router())
        .merge(api::audit_log::router())
        .merge(api::sensitive::router())
}

/// Router with auth, tracing, timeout and CORS, ready to serve or `oneshot`
pub fn build_app(state: ServerState) -> Router {
    let timeout = Duration::from_millis(state.config.request_timeout_ms);

    build_router()
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct Server {
    state: ServerState,
}

impl Server {
    pub fn new(state: ServerState) -> Self {
        Self { state }
    }

    /// Serve until Ctrl-C
    pub async fn run(&self, port: u16) -> AppResult<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

        tracing::info!(%addr, "Agent server listening");

        let app = build_app(self.state.clone());
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

        tracing::info!("Agent server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
