use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Frames sent from client to relay
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Register {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Ping,
    /// Any other `type`. Accepted and ignored so newer clients keep working.
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Ping => "ping",
            Self::Unknown => "unknown",
        }
    }
}

/// Frames sent from relay to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        message: String,
    },
    Registered {
        #[serde(rename = "sessionId")]
        session_id: String,
        timestamp: String,
    },
    Pong {
        timestamp: String,
    },
    Error {
        message: String,
    },
    OperatorMessage {
        text: String,
        timestamp: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn registered(session_id: impl Into<String>) -> Self {
        Self::Registered {
            session_id: session_id.into(),
            timestamp: timestamp(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: timestamp(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Server timestamp in RFC 3339 UTC with millisecond precision
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
