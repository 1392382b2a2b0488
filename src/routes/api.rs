use axum::{routing::get, Router};
use std::sync::Arc;

use crate::handlers::health;
use crate::websocket::handler::collab_ws_handler;
use crate::ws::CollabGateway;

/// Build the versioned API router.
pub fn create_api_routes(gateway: Arc<CollabGateway>) -> Router {
    Router::new()
        .route("/v1/health", get(health::health_check))
        .route("/v1/ready", get(health::ready_check))
        .route("/v1/diagnostics", get(health::diagnostics))
        .route("/v1/ws", get(collab_ws_handler))
        .with_state(gateway)
}
