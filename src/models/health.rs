use serde::{Deserialize, Serialize};

/// Response for the health and readiness endpoints
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Gateway counters exposed on the diagnostics endpoint
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub active_rooms: usize,
    pub active_connections: usize,
}
