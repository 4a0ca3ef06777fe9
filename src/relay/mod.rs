//! Message routing between the control plane and client connections
//!
//! Inbound frames from a connection (registration, keep-alive) and outbound
//! relay requests from the control API both funnel through [`MessageRouter`].

mod router;
mod types;

pub use router::{MessageRouter, RouterStats, RouterStatsSnapshot, INVALID_FRAME_MESSAGE};
pub use types::{RelayError, RelayMessage, RelayReceipt};
