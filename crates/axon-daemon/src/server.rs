//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::ws;

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // API routes
        .route("/api/tree", get(api::get_tree))
        .route("/api/commands", get(api::list_commands))
        .route("/api/config", get(api::get_config))
        .route("/api/values/{*path}", get(api::get_value).put(api::set_value))
        .route("/api/nodes/{network}/{node}/level", post(api::set_level))
        .route("/api/nodes/{network}/{node}/config", post(api::set_config_param))
        // WebSocket for session events
        .route("/ws", get(ws::websocket_handler))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // State
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn run<F>(state: Arc<AppState>, bind: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Web server stopped");
    Ok(())
}
