use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::metrics::SessionMetrics;
use crate::server::AppState;

/// Request to relay text to a session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Target session id
    #[serde(default)]
    pub session_id: Option<String>,
    /// Text to display to the user
    #[serde(default)]
    pub text: Option<String>,
}

/// Response for a delivered relay
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    /// Correlation id of the delivered `operator_message` frame
    pub message_id: String,
    pub timestamp: String,
}

/// POST /api/send-message
pub async fn send_message(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidBody(e.body_text()))?;

    tracing::info!(session_id = ?request.session_id, "Send message request");

    let session_id = request.session_id.unwrap_or_default();
    let text = request.text.unwrap_or_default();

    let result = state.router.relay(&session_id, &text).await;
    SessionMetrics::set_bound(state.registry.count());
    let receipt = result?;

    Ok(Json(SendMessageResponse {
        success: true,
        message: "Message sent to user successfully".to_string(),
        session_id: receipt.session_id,
        message_id: receipt.message_id,
        timestamp: receipt.timestamp,
    }))
}
