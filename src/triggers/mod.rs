//! Message sources that push into the relay.
//!
//! - `http`: control-plane REST endpoint used by external automation

mod http;

pub use http::{send_message, SendMessageRequest, SendMessageResponse};
