//! WebSocket connection management: upgrade admission, the per-client read
//! loop, ping/pong liveness, and drain on shutdown.
//!
//! Each connection owns exactly one task.  That task is the sole mutator of
//! its Session and multiplexes three inputs: inbound frames (under the read
//! deadline), the liveness ping timer, and the client's event queue.
//! Cleanup -- bus removal, session delete, rate-limit forget, connection
//! counter -- lives in a drop guard so it runs on every exit path, panics
//! included.

use crate::dispatch;
use crate::methods::response;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use cam_protocol::{EventMessage, RpcResponse};
use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pending event deliveries per client before drops begin.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Going-away close code sent when the gateway drains.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Upgrade handler.  Admission is decided before any session resources are
/// allocated: a full gateway or a draining gateway answers 503 at the
/// handshake.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_fired() {
        return (StatusCode::SERVICE_UNAVAILABLE, "gateway is shutting down").into_response();
    }
    if !state
        .metrics
        .try_reserve_connection(state.config.server.max_connections)
    {
        warn!("connection refused: at capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "gateway at connection capacity")
            .into_response();
    }

    // The slot travels with the session future; if the upgrade dies before
    // the session starts, dropping the closure releases it.
    let slot = ConnectionSlot {
        state: state.clone(),
    };
    ws.on_upgrade(move |socket| client_session(socket, state, slot))
}

/// Releases the admission slot exactly once.
struct ConnectionSlot {
    state: AppState,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.metrics.connection_closed();
    }
}

/// Scoped cleanup for everything a live session owns.
struct SessionGuard {
    state: AppState,
    client_id: u64,
    // Dropped last: the slot frees after the session is gone.
    _slot: ConnectionSlot,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.bus.remove_client(self.client_id);
        self.state.sessions.remove(self.client_id);
        self.state.rate_limiter.forget(self.client_id);
        info!(client_id = self.client_id, "client disconnected");
    }
}

async fn client_session(socket: WebSocket, state: AppState, slot: ConnectionSlot) {
    let client_id = state.sessions.create();
    let (event_tx, event_rx) = mpsc::channel::<EventMessage>(EVENT_QUEUE_CAPACITY);
    state.bus.register_sender(client_id, event_tx);
    info!(client_id, "client connected");

    let guard = SessionGuard {
        state: state.clone(),
        client_id,
        _slot: slot,
    };
    run_client_loop(socket, &state, client_id, event_rx).await;
    drop(guard);
}

async fn run_client_loop(
    mut socket: WebSocket,
    state: &AppState,
    client_id: u64,
    mut event_rx: mpsc::Receiver<EventMessage>,
) {
    let server = &state.config.server;
    let mut shutdown_rx = state.shutdown.subscribe();
    let mut ping_timer = tokio::time::interval(server.ping_interval);
    // The interval fires immediately; skip that first tick.
    ping_timer.tick().await;
    let mut pending_ping: Option<Instant> = None;

    loop {
        tokio::select! {
            inbound = tokio::time::timeout(server.read_timeout, socket.recv()) => {
                match inbound {
                    Err(_) => {
                        warn!(client_id, "read deadline expired");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        debug!(client_id, error = %e, "websocket read error");
                        break;
                    }
                    Ok(Some(Ok(Message::Text(text)))) => {
                        state.sessions.touch(client_id);
                        let reply = if text.len() > server.max_message_size {
                            state.metrics.record_request();
                            state.metrics.record_error();
                            RpcResponse::failure(
                                Value::Null,
                                response::oversized_frame(text.len(), server.max_message_size),
                            )
                        } else {
                            dispatch::dispatch_text(state, client_id, &text).await
                        };
                        if !send_reply(&mut socket, state, &reply).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Ok(Some(Ok(Message::Pong(_)))) => {
                        pending_ping = None;
                        state.sessions.touch(client_id);
                    }
                    Ok(Some(Ok(Message::Close(_)))) => {
                        debug!(client_id, "client closed the connection");
                        break;
                    }
                    Ok(Some(Ok(Message::Binary(_)))) => {
                        // Binary frames are not part of the protocol.
                        debug!(client_id, "ignoring binary frame");
                    }
                }
            }
            _ = ping_timer.tick() => {
                if let Some(sent) = pending_ping {
                    if sent.elapsed() > server.pong_wait {
                        warn!(client_id, "liveness pong overdue, closing");
                        break;
                    }
                }
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                if pending_ping.is_none() {
                    pending_ping = Some(Instant::now());
                }
            }
            event = event_rx.recv() => {
                let Some(message) = event else { break };
                let frame = message.to_notification();
                if !send_value(&mut socket, state, &frame).await {
                    break;
                }
            }
            _ = shutdown_rx.changed() => {
                info!(client_id, "draining for shutdown");
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_GOING_AWAY,
                        reason: "server shutting down".into(),
                    })))
                    .await;
                break;
            }
        }
    }
}

async fn send_reply(socket: &mut WebSocket, state: &AppState, reply: &RpcResponse) -> bool {
    match serde_json::to_string(reply) {
        Ok(json) => send_text(socket, state, json).await,
        Err(e) => {
            warn!(error = %e, "reply serialization failed");
            true
        }
    }
}

async fn send_value(socket: &mut WebSocket, state: &AppState, value: &Value) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => send_text(socket, state, json).await,
        Err(e) => {
            warn!(error = %e, "notification serialization failed");
            true
        }
    }
}

/// Write one frame under the write deadline.  `false` means the connection
/// is no longer usable.
async fn send_text(socket: &mut WebSocket, state: &AppState, json: String) -> bool {
    let write_timeout = state.config.server.write_timeout;
    match tokio::time::timeout(write_timeout, socket.send(Message::Text(json.into()))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "websocket write error");
            false
        }
        Err(_) => {
            warn!("write deadline expired");
            false
        }
    }
}
