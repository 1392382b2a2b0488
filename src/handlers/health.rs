use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::models::{DiagnosticsResponse, HealthResponse};
use crate::ws::CollabGateway;

/// Liveness check
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            message: "Service is running".to_string(),
        }),
    )
}

/// Readiness check. The gateway is ready as soon as it is constructed;
/// database-less deployments are still ready in degraded mode.
pub async fn ready_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            message: "Service is ready".to_string(),
        }),
    )
}

/// Room and connection counters for this process.
pub async fn diagnostics(
    State(gateway): State<Arc<CollabGateway>>,
) -> Json<DiagnosticsResponse> {
    Json(DiagnosticsResponse {
        active_rooms: gateway.registry().room_count().await,
        active_connections: gateway.registry().connection_count().await,
    })
}
