use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::connection_manager::{ConnectionHandle, RegistryError, SendError, SessionRegistry};
use crate::metrics::{FrameMetrics, RelayMetrics, SessionMetrics};
use crate::websocket::{ClientFrame, ServerFrame};

use super::types::{RelayError, RelayMessage, RelayReceipt};

/// Error text returned to a client whose frame could not be parsed
pub const INVALID_FRAME_MESSAGE: &str = "Invalid message format";

/// Characters of relayed text included in logs
const LOG_PREVIEW_CHARS: usize = 50;

/// Counters for routed traffic
#[derive(Debug, Default)]
pub struct RouterStats {
    pub frames_received: AtomicU64,
    pub invalid_frames: AtomicU64,
    pub registrations: AtomicU64,
    pub supersessions: AtomicU64,
    pub pings: AtomicU64,
    pub relays_delivered: AtomicU64,
    pub relays_failed: AtomicU64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            invalid_frames: self.invalid_frames.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            supersessions: self.supersessions.load(Ordering::Relaxed),
            pings: self.pings.load(Ordering::Relaxed),
            relays_delivered: self.relays_delivered.load(Ordering::Relaxed),
            relays_failed: self.relays_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterStatsSnapshot {
    pub frames_received: u64,
    pub invalid_frames: u64,
    pub registrations: u64,
    pub supersessions: u64,
    pub pings: u64,
    pub relays_delivered: u64,
    pub relays_failed: u64,
}

/// Validates inbound frames and delivers control-plane messages
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            stats: RouterStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Handle one text frame received on `handle`.
    ///
    /// Malformed frames are answered with an `error` frame; the connection stays open.
    #[tracing::instrument(
        name = "ws.frame",
        skip(self, handle, text),
        fields(connection_id = %handle.id)
    )]
    pub async fn handle_text(&self, handle: &Arc<ConnectionHandle>, text: &str) {
        if !handle.is_open() {
            tracing::debug!("Dropping frame received after close");
            return;
        }

        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.invalid_frames.fetch_add(1, Ordering::Relaxed);
                FrameMetrics::record_invalid();
                tracing::warn!(error = %e, "Failed to parse client frame");
                self.reply(handle, ServerFrame::error(INVALID_FRAME_MESSAGE))
                    .await;
                return;
            }
        };

        FrameMetrics::record(frame.kind());

        match frame {
            ClientFrame::Register { session_id } => {
                self.handle_register(handle, session_id).await;
            }
            ClientFrame::Ping => {
                self.stats.pings.fetch_add(1, Ordering::Relaxed);
                self.reply(handle, ServerFrame::pong()).await;
            }
            ClientFrame::Unknown => {
                tracing::debug!("Ignoring frame with unknown type");
            }
        }
    }

    async fn handle_register(&self, handle: &Arc<ConnectionHandle>, session_id: String) {
        match self.registry.bind(&session_id, handle) {
            Ok(superseded) => {
                self.stats.registrations.fetch_add(1, Ordering::Relaxed);
                SessionMetrics::record_registered();
                if superseded.is_some() {
                    self.stats.supersessions.fetch_add(1, Ordering::Relaxed);
                    SessionMetrics::record_superseded();
                }

                tracing::info!(
                    session_id = %session_id,
                    active_sessions = self.registry.count(),
                    "Session registered"
                );

                self.reply(handle, ServerFrame::registered(session_id)).await;
            }
            Err(e @ RegistryError::EmptySessionId) => {
                self.stats.invalid_frames.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Register frame with empty sessionId");
                self.reply(handle, ServerFrame::error(e.to_string())).await;
            }
            Err(RegistryError::ConnectionClosed(_)) => {
                tracing::debug!(session_id = %session_id, "Connection closed before registration");
            }
        }
    }

    async fn reply(&self, handle: &ConnectionHandle, frame: ServerFrame) {
        if let Err(e) = handle.send(frame).await {
            tracing::debug!(connection_id = %handle.id, error = %e, "Failed to send reply frame");
        }
    }

    /// Deliver `text` to whichever connection currently owns `session_id`.
    ///
    /// Best effort: there is no retry, the caller decides whether to resend.
    #[tracing::instrument(
        name = "relay.send",
        skip(self, text),
        fields(text_len = text.len())
    )]
    pub async fn relay(&self, session_id: &str, text: &str) -> Result<RelayReceipt, RelayError> {
        let result = self.deliver(session_id, text).await;

        match &result {
            Ok(receipt) => {
                self.stats.relays_delivered.fetch_add(1, Ordering::Relaxed);
                RelayMetrics::record_delivered();
                tracing::info!(
                    message_id = %receipt.message_id,
                    preview = %preview(text),
                    "Message relayed to session"
                );
            }
            Err(e) => {
                self.stats.relays_failed.fetch_add(1, Ordering::Relaxed);
                RelayMetrics::record_failed(e.kind());
                tracing::warn!(error = %e, kind = e.kind(), "Relay failed");
            }
        }

        result
    }

    async fn deliver(&self, session_id: &str, text: &str) -> Result<RelayReceipt, RelayError> {
        if session_id.is_empty() || text.is_empty() {
            return Err(RelayError::InvalidInput {
                has_session_id: !session_id.is_empty(),
                has_text: !text.is_empty(),
            });
        }

        let Some(handle) = self.registry.lookup(session_id) else {
            return Err(RelayError::SessionNotFound {
                session_id: session_id.to_string(),
                active_sessions: self.registry.count(),
            });
        };

        if !handle.is_open() {
            self.registry.prune_stale(session_id, &handle);
            return Err(RelayError::ConnectionClosed {
                session_id: session_id.to_string(),
            });
        }

        let message = RelayMessage::new(session_id, text);

        match handle.send(message.to_frame()).await {
            Ok(()) => Ok(message.receipt()),
            Err(SendError::Closed) => {
                self.registry.prune_stale(session_id, &handle);
                Err(RelayError::ConnectionClosed {
                    session_id: session_id.to_string(),
                })
            }
            Err(e @ SendError::ChannelClosed) => Err(RelayError::DeliveryFailed {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(LOG_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn setup() -> MessageRouter {
        MessageRouter::new(Arc::new(SessionRegistry::new()))
    }

    fn open(router: &MessageRouter) -> (Arc<ConnectionHandle>, mpsc::Receiver<ServerFrame>) {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = router.registry().connect(None, tx);
        handle.open();
        // Discard the welcome frame
        assert!(matches!(rx.try_recv(), Ok(ServerFrame::Connected { .. })));
        (handle, rx)
    }

    #[tokio::test]
    async fn test_register_acknowledges() {
        let router = setup();
        let (handle, mut rx) = open(&router);

        router
            .handle_text(&handle, r#"{"type":"register","sessionId":"cw-1"}"#)
            .await;

        match rx.try_recv().unwrap() {
            ServerFrame::Registered { session_id, .. } => assert_eq!(session_id, "cw-1"),
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(router.registry().lookup("cw-1").unwrap().id, handle.id);
        assert_eq!(router.stats().registrations, 1);
    }

    #[tokio::test]
    async fn test_register_empty_session_is_error() {
        let router = setup();
        let (handle, mut rx) = open(&router);

        router
            .handle_text(&handle, r#"{"type":"register","sessionId":""}"#)
            .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            ServerFrame::error("sessionId is required")
        );
        assert_eq!(router.registry().count(), 0);
        assert!(handle.is_open());
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection_open() {
        let router = setup();
        let (handle, mut rx) = open(&router);

        router.handle_text(&handle, "{not json").await;

        assert_eq!(rx.try_recv().unwrap(), ServerFrame::error(INVALID_FRAME_MESSAGE));
        assert!(handle.is_open());

        // Client may retry on the same connection
        router.handle_text(&handle, r#"{"type":"ping"}"#).await;
        assert!(matches!(rx.try_recv(), Ok(ServerFrame::Pong { .. })));
    }

    #[tokio::test]
    async fn test_ping_produces_one_pong() {
        let router = setup();
        let (handle, mut rx) = open(&router);

        router.handle_text(&handle, r#"{"type":"ping"}"#).await;

        assert!(matches!(rx.try_recv(), Ok(ServerFrame::Pong { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_type_is_ignored() {
        let router = setup();
        let (handle, mut rx) = open(&router);

        router.handle_text(&handle, r#"{"type":"typing"}"#).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(router.stats().invalid_frames, 0);
    }

    #[tokio::test]
    async fn test_frames_after_close_are_dropped() {
        let router = setup();
        let (handle, mut rx) = open(&router);
        handle.close();

        router
            .handle_text(&handle, r#"{"type":"register","sessionId":"late"}"#)
            .await;

        assert!(rx.try_recv().is_err());
        assert!(router.registry().lookup("late").is_none());
    }

    #[tokio::test]
    async fn test_relay_delivers_operator_message() {
        let router = setup();
        let (handle, mut rx) = open(&router);
        router.registry().bind("cw-1", &handle).unwrap();

        let receipt = router.relay("cw-1", "Hello").await.unwrap();

        match rx.try_recv().unwrap() {
            ServerFrame::OperatorMessage {
                text,
                timestamp,
                message_id,
            } => {
                assert_eq!(text, "Hello");
                assert_eq!(message_id, receipt.message_id);
                assert_eq!(timestamp, receipt.timestamp);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert_eq!(receipt.session_id, "cw-1");
    }

    #[tokio::test]
    async fn test_relay_invalid_input() {
        let router = setup();

        let err = router.relay("", "hi").await.unwrap_err();
        assert_eq!(
            err,
            RelayError::InvalidInput {
                has_session_id: false,
                has_text: true
            }
        );

        let err = router.relay("s", "").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_relay_unknown_session() {
        let router = setup();

        let err = router.relay("nonexistent-id", "hi").await.unwrap_err();
        assert_eq!(
            err,
            RelayError::SessionNotFound {
                session_id: "nonexistent-id".to_string(),
                active_sessions: 0
            }
        );
    }

    #[tokio::test]
    async fn test_relay_stale_session_prunes_binding() {
        let router = setup();
        let (handle, _rx) = open(&router);
        router.registry().bind("s", &handle).unwrap();
        handle.close();

        let err = router.relay("s", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "connection_closed");
        assert!(router.registry().lookup("s").is_none());

        let err = router.relay("s", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "session_not_found");
    }

    #[tokio::test]
    async fn test_relay_write_failure_is_delivery_failed() {
        let router = setup();
        let (handle, rx) = open(&router);
        router.registry().bind("s", &handle).unwrap();
        drop(rx);

        let err = router.relay("s", "hi").await.unwrap_err();
        assert_eq!(err.kind(), "delivery_failed");
        assert_eq!(router.stats().relays_failed, 1);
    }

    #[tokio::test]
    async fn test_register_over_stale_binding_is_not_counted_as_supersession() {
        let router = setup();
        let (old, _rx_old) = open(&router);
        let (new, mut rx_new) = open(&router);
        router.registry().bind("s", &old).unwrap();
        old.close();

        router
            .handle_text(&new, r#"{"type":"register","sessionId":"s"}"#)
            .await;

        assert!(matches!(rx_new.try_recv(), Ok(ServerFrame::Registered { .. })));
        assert_eq!(router.stats().registrations, 1);
        assert_eq!(router.stats().supersessions, 0);
    }

    #[tokio::test]
    async fn test_relay_blocked_on_full_channel_ends_when_closed() {
        let router = Arc::new(setup());
        let (tx, _rx) = mpsc::channel(1);
        let handle = router.registry().connect(None, tx);
        // Welcome frame occupies the only slot and is never drained
        handle.open();
        router.registry().bind("s", &handle).unwrap();

        let pending = {
            let router = router.clone();
            tokio::spawn(async move { router.relay("s", "hi").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.close();

        let err = tokio::time::timeout(std::time::Duration::from_secs(1), pending)
            .await
            .expect("relay should not hang after close")
            .unwrap()
            .unwrap_err();
        assert_eq!(err.kind(), "connection_closed");
        assert!(router.registry().lookup("s").is_none());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(60);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), LOG_PREVIEW_CHARS + 3);
    }
}
