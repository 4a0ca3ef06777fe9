use serde::Serialize;
use uuid::Uuid;

use crate::websocket::{timestamp, ServerFrame};

/// A control-plane message addressed to one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    pub session_id: String,
    pub text: String,
    pub timestamp: String,
    /// Unique per delivery attempt
    pub message_id: String,
}

impl RelayMessage {
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            timestamp: timestamp(),
            message_id: format!("msg-{}", Uuid::new_v4()),
        }
    }

    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::OperatorMessage {
            text: self.text.clone(),
            timestamp: self.timestamp.clone(),
            message_id: self.message_id.clone(),
        }
    }

    pub fn receipt(&self) -> RelayReceipt {
        RelayReceipt {
            session_id: self.session_id.clone(),
            message_id: self.message_id.clone(),
            timestamp: self.timestamp.clone(),
        }
    }
}

/// Returned to the control-plane caller after a successful delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    pub session_id: String,
    pub message_id: String,
    pub timestamp: String,
}

/// Why a relay request was not delivered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("sessionId and text are required")]
    InvalidInput { has_session_id: bool, has_text: bool },

    #[error("Session not found")]
    SessionNotFound {
        session_id: String,
        active_sessions: usize,
    },

    #[error("Connection closed")]
    ConnectionClosed { session_id: String },

    #[error("Failed to send message")]
    DeliveryFailed { session_id: String, reason: String },
}

impl RelayError {
    /// Stable label used for metrics and error codes
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::SessionNotFound { .. } => "session_not_found",
            Self::ConnectionClosed { .. } => "connection_closed",
            Self::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}
