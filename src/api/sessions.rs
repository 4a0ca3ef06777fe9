//! Registry introspection endpoint.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection_manager::SessionInfo;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub success: bool,
    pub count: usize,
    pub sessions: Vec<SessionInfo>,
}

/// GET /api/sessions - Bound sessions with per-connection liveness
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.registry.list();

    Json(SessionListResponse {
        success: true,
        count: sessions.len(),
        sessions,
    })
}
