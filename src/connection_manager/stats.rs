//! Registry introspection structures

use serde::Serialize;

use super::types::ConnectionState;

/// One bound session as reported by the control API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub connected: bool,
    pub state: ConnectionState,
}

/// Registry counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub bound_sessions: usize,
}
