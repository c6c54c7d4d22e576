// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router, middleware as axum_middleware,
    routing::{any, get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use courier_config::model::ServerConfig;
use courier_core::{Backend, CourierError, HandlerRegistry};

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;
use crate::receive;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub backend: Arc<dyn Backend>,
    pub registry: Arc<HandlerRegistry>,
    /// First path segment of channel routes.
    pub mount: String,
    pub auth: AuthConfig,
    /// Process start, for uptime on the status page.
    pub started: Instant,
}

impl GatewayState {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<HandlerRegistry>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            mount: config.mount.trim_matches('/').to_string(),
            auth: AuthConfig {
                bearer_token: config.auth_token.clone(),
            },
            started: Instant::now(),
        }
    }
}

/// Builds the application router.
///
/// - GET / and GET /status (public)
/// - ANY /<mount>/{channel_type}/{uuid}/{action} (channel webhooks)
/// - POST /v1/send (bearer auth)
pub fn router(state: GatewayState) -> Router {
    let channel_path = format!("/{}/{{channel_type}}/{{uuid}}/{{action}}", state.mount);

    let public_routes = Router::new()
        .route("/", get(handlers::get_index))
        .route("/status", get(handlers::get_status))
        .route(&channel_path, any(receive::handle_webhook))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/send", post(handlers::post_send))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serves the gateway until `cancel` fires, then lets open requests finish.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), CourierError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CourierError::Config(format!("failed to bind {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| CourierError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
