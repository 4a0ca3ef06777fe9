//! Liveness, statistics and service description endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::RegistryStats;
use crate::relay::RouterStatsSnapshot;
use crate::server::AppState;
use crate::websocket::timestamp;

const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub active_sessions: usize,
    /// Process uptime in seconds
    pub uptime: f64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub uptime_seconds: u64,
    pub registry: RegistryStats,
    pub router: RouterStatsSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfoResponse {
    pub name: String,
    pub version: String,
    pub endpoints: EndpointMap,
    pub websocket: WebSocketInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMap {
    pub health: String,
    pub send_message: String,
    pub sessions: String,
    pub metrics: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketInfo {
    pub path: String,
    pub active_sessions: usize,
}

/// GET /health - Read-only; never touches registry state
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        active_sessions: state.registry.count(),
        uptime: state.start_time.elapsed().as_secs_f64(),
        timestamp: timestamp(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        uptime_seconds: state.start_time.elapsed().as_secs(),
        registry: state.registry.stats(),
        router: state.router.stats(),
    })
}

/// GET / - Service description and endpoint map
pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        name: SERVICE_NAME.to_string(),
        version: SERVICE_VERSION.to_string(),
        endpoints: EndpointMap {
            health: "GET /health".to_string(),
            send_message: "POST /api/send-message".to_string(),
            sessions: "GET /api/sessions".to_string(),
            metrics: "GET /metrics".to_string(),
        },
        websocket: WebSocketInfo {
            path: state.settings.websocket.path.clone(),
            active_sessions: state.registry.count(),
        },
    })
}
