use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection_manager::ConnectionHandle;
use crate::metrics::{ConnectionMetrics, SessionMetrics};
use crate::server::AppState;

use super::message::ServerFrame;

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state), fields(remote_addr = %addr))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    tracing::info!("New WebSocket connection");

    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Drive one established connection until either side closes it
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state),
    fields(remote_addr = %remote_addr, otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, remote_addr: SocketAddr) {
    let connection_start = std::time::Instant::now();

    // Channel for frames headed to this connection
    let (tx, mut rx) = mpsc::channel::<ServerFrame>(state.settings.websocket.channel_buffer_size);

    let handle = state.registry.connect(Some(remote_addr), tx);
    let connection_id = handle.id;

    // Queues the welcome frame
    handle.open();
    ConnectionMetrics::record_opened();
    ConnectionMetrics::set_active(state.registry.connection_count());

    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for writing queued frames to the socket
    let writer_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match frame.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize frame");
                            continue;
                        }
                    };

                    // A stalled peer must not keep a closed handle's writer alive
                    tokio::select! {
                        result = ws_sender.send(Message::Text(text.into())) => {
                            if result.is_err() {
                                break;
                            }
                        }
                        _ = writer_handle.closed() => break,
                    }
                }
                _ = writer_handle.closed() => {
                    // Superseded or shutting down
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Task for reading frames from the socket
    let reader_state = state.clone();
    let reader_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &reader_state, &reader_handle).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
    }

    send_task.abort();
    recv_task.abort();

    // OPEN -> CLOSED, then release the binding if this connection still owns it
    handle.close();
    let released = state.registry.disconnect(&handle);

    ConnectionMetrics::set_active(state.registry.connection_count());
    SessionMetrics::set_bound(state.registry.count());
    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_closed(duration);

    match handle.session_id() {
        Some(session_id) if released => tracing::info!(
            connection_id = %connection_id,
            session_id = %session_id,
            remaining = state.registry.count(),
            duration_secs = duration,
            "Session disconnected"
        ),
        Some(session_id) => tracing::info!(
            connection_id = %connection_id,
            session_id = %session_id,
            duration_secs = duration,
            "Superseded connection closed"
        ),
        None => tracing::info!(
            connection_id = %connection_id,
            duration_secs = duration,
            "Unregistered connection closed"
        ),
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            state.router.handle_text(handle, text.as_str()).await;
            SessionMetrics::set_bound(state.registry.count());
            !handle.is_closed()
        }
        Message::Binary(_) => {
            let _ = handle
                .send(ServerFrame::error("Binary messages are not supported"))
                .await;
            true
        }
        // Axum answers transport-level pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
