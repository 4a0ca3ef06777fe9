use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::relay::RelayError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            AppError::Relay(e) => match e {
                RelayError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
                RelayError::SessionNotFound { .. } | RelayError::ConnectionClosed { .. } => {
                    StatusCode::NOT_FOUND
                }
                RelayError::DeliveryFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Relay(e) => e.kind(),
            AppError::InvalidBody(_) => "invalid_input",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let mut body = Map::new();
        body.insert("success".into(), Value::Bool(false));
        body.insert("code".into(), Value::from(code));

        let (client_message, log_message) = match &self {
            AppError::InvalidBody(msg) => {
                body.insert(
                    "received".into(),
                    json!({ "sessionId": false, "text": false }),
                );
                ("sessionId and text are required".to_string(), msg.clone())
            }
            AppError::Relay(e) => {
                match e {
                    RelayError::InvalidInput {
                        has_session_id,
                        has_text,
                    } => {
                        body.insert(
                            "received".into(),
                            json!({ "sessionId": has_session_id, "text": has_text }),
                        );
                    }
                    RelayError::SessionNotFound {
                        session_id,
                        active_sessions,
                    } => {
                        body.insert("sessionId".into(), Value::from(session_id.as_str()));
                        body.insert("activeSessions".into(), Value::from(*active_sessions));
                    }
                    RelayError::ConnectionClosed { session_id } => {
                        body.insert("sessionId".into(), Value::from(session_id.as_str()));
                    }
                    RelayError::DeliveryFailed { session_id, reason } => {
                        body.insert("sessionId".into(), Value::from(session_id.as_str()));
                        if !is_production() {
                            body.insert("details".into(), Value::from(reason.as_str()));
                        }
                    }
                }
                (e.to_string(), format!("{:?}", e))
            }
        };

        body.insert("error".into(), Value::String(client_message));

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        (status, Json(Value::Object(body))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
