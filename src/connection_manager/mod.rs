//! Connection lifecycle and session registry
//!
//! This module provides:
//! - Per-connection handles with an explicit `CONNECTING -> OPEN -> CLOSED` state machine
//! - The session registry binding each session id to at most one live connection
//! - Registry introspection used by the control API

mod registry;
mod stats;
mod types;

pub use registry::SessionRegistry;
pub use stats::{RegistryStats, SessionInfo};
pub use types::{ConnectionHandle, ConnectionState, RegistryError, SendError};
