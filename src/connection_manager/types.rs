//! Connection handle and related types

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::websocket::ServerFrame;

/// Welcome text sent when a connection opens
pub const WELCOME_MESSAGE: &str = "WebSocket connection established";

/// Lifecycle of one persistent client connection.
///
/// `Closed` is terminal: no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a frame could not be queued for a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The handle had already reached `CLOSED` before the write
    #[error("connection is closed")]
    Closed,
    /// The writer side of the socket has gone away
    #[error("outbound channel is closed")]
    ChannelClosed,
}

/// Errors raised by registry mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("sessionId is required")]
    EmptySessionId,
    #[error("connection {0} is closed")]
    ConnectionClosed(Uuid),
}

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<ServerFrame>,
    state: watch::Sender<ConnectionState>,
    /// Back-reference to the session this connection registered, if any.
    /// Never held across an await or while a registry guard is acquired.
    session_id: Mutex<Option<String>>,
}

impl ConnectionHandle {
    pub fn new(remote_addr: Option<SocketAddr>, sender: mpsc::Sender<ServerFrame>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            id: Uuid::new_v4(),
            remote_addr,
            connected_at: Utc::now(),
            sender,
            state,
            session_id: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// `CONNECTING -> OPEN`. Queues the welcome frame on success.
    ///
    /// Returns false if the handle was not in `CONNECTING`.
    pub fn open(&self) -> bool {
        let opened = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        });

        if opened {
            let welcome = ServerFrame::Connected {
                message: WELCOME_MESSAGE.to_string(),
            };
            if let Err(e) = self.sender.try_send(welcome) {
                tracing::warn!(connection_id = %self.id, error = %e, "Failed to queue welcome frame");
            }
        }

        opened
    }

    /// Move to `CLOSED` from any state.
    ///
    /// Returns true only for the call that performed the transition. Waiters
    /// on [`closed`](Self::closed) are woken; the registry entry is released
    /// by whoever owns the socket once it observes the transition.
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Closed;
                true
            } else {
                false
            }
        })
    }

    /// Resolves once the handle reaches `CLOSED`.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    pub(crate) fn set_session_id(&self, session_id: &str) {
        *self.session_id.lock() = Some(session_id.to_string());
    }

    /// Queue a frame for the writer task.
    ///
    /// Waits for space in the channel, but gives up with `Closed` as soon as
    /// the handle is closed.
    pub async fn send(&self, frame: ServerFrame) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        tokio::select! {
            result = self.sender.send(frame) => result.map_err(|_| SendError::ChannelClosed),
            _ = self.closed() => Err(SendError::Closed),
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(None, tx), rx)
    }

    #[test]
    fn test_new_handle_is_connecting() {
        let (h, _rx) = handle();
        assert_eq!(h.state(), ConnectionState::Connecting);
        assert!(h.session_id().is_none());
    }

    #[tokio::test]
    async fn test_open_emits_welcome() {
        let (h, mut rx) = handle();
        assert!(h.open());
        assert!(h.is_open());

        let frame = rx.recv().await.unwrap();
        assert_eq!(
            frame,
            ServerFrame::Connected {
                message: WELCOME_MESSAGE.to_string()
            }
        );

        // Second open is a no-op
        assert!(!h.open());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_is_terminal() {
        let (h, _rx) = handle();
        h.open();
        assert!(h.close());
        assert!(!h.close());
        assert!(!h.open());
        assert_eq!(h.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (h, _rx) = handle();
        h.open();
        h.close();
        let result = h.send(ServerFrame::Pong { timestamp: "t".into() }).await;
        assert_eq!(result, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_send_with_dropped_writer_fails() {
        let (h, rx) = handle();
        h.open();
        drop(rx);
        let result = h.send(ServerFrame::Pong { timestamp: "t".into() }).await;
        assert_eq!(result, Err(SendError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_send_on_full_channel_fails_once_closed() {
        let (tx, _rx) = mpsc::channel(1);
        let h = std::sync::Arc::new(ConnectionHandle::new(None, tx));
        // The welcome frame fills the only slot
        h.open();

        let pending = {
            let h = h.clone();
            tokio::spawn(async move { h.send(ServerFrame::Pong { timestamp: "t".into() }).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        h.close();
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), pending)
            .await
            .expect("send should give up after close")
            .unwrap();
        assert_eq!(result, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let (tx, _rx) = mpsc::channel(8);
        let h = std::sync::Arc::new(ConnectionHandle::new(None, tx));
        h.open();

        let waiter = {
            let h = h.clone();
            tokio::spawn(async move { h.closed().await })
        };

        h.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("closed() should resolve")
            .unwrap();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "OPEN");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connecting).unwrap(),
            "\"CONNECTING\""
        );
    }
}
