//! WebSocket connection actor.
//!
//! Each accepted socket gets two tasks: a read loop that drives the
//! join/add/remove state machine, and a write loop that drains the
//! bounded outbound queue into the socket. A shared `CancellationToken`
//! (child of the hub's root token) tears both down together, whether the
//! close came from the peer, from overflow eviction, or from the admin
//! console.
//!
//! Connection lifecycle: Unjoined, then Member after a successful `join`,
//! then Closed. Malformed frames get a unicast `error` and the connection
//! lives on; exactly one `unregister` is submitted when the read loop
//! exits as a member.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actors::messages::MemberHandle;
use crate::errors::HubError;
use crate::protocol::Envelope;
use crate::registry::new_connection_record;
use crate::routes::AppState;

/// `GET /ws` upgrade handler.
pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let ip_address = client_ip(&headers, addr);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    ws.on_upgrade(move |socket| handle_socket(state, socket, ip_address, user_agent))
}

/// Peer address for the console, honoring proxy headers.
fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    addr.ip().to_string()
}

async fn handle_socket(
    state: Arc<AppState>,
    socket: WebSocket,
    ip_address: String,
    user_agent: String,
) {
    let connection_id = Uuid::new_v4().to_string();
    let cancel = state.hub.child_token();
    let (out_tx, out_rx) = mpsc::channel::<Arc<str>>(state.config.send_queue_capacity);
    let (ws_sink, ws_stream) = socket.split();

    info!(
        target: "hub.connection",
        connection_id = %connection_id,
        ip_address = %ip_address,
        "Connection opened"
    );

    let write_task = tokio::spawn(write_loop(ws_sink, out_rx, cancel.clone()));

    let mut actor = ConnectionActor {
        state: Arc::clone(&state),
        connection_id: connection_id.clone(),
        ip_address,
        user_agent,
        cancel: cancel.clone(),
        out_tx,
        joined_key: None,
    };

    actor.read_loop(ws_stream).await;

    // Tearing down: stop the write loop, then settle membership exactly once
    cancel.cancel();

    if actor.joined_key.is_some() {
        if let Err(e) = state.hub.unregister(connection_id.clone()).await {
            warn!(
                target: "hub.connection",
                connection_id = %connection_id,
                error = %e,
                "Failed to unregister connection"
            );
        }
        state.registry.mark_disconnected(&connection_id).await;
    }

    let _ = write_task.await;

    info!(
        target: "hub.connection",
        connection_id = %connection_id,
        "Connection closed"
    );
}

/// Drains the bounded outbound queue into the socket, then sends a close
/// frame. Exits on cancellation, queue closure, or a failed socket write.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<Arc<str>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,

            frame = out_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame.to_string())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
}

struct ConnectionActor {
    state: Arc<AppState>,
    connection_id: String,
    ip_address: String,
    user_agent: String,
    cancel: CancellationToken,
    out_tx: mpsc::Sender<Arc<str>>,
    /// Room this connection is a member of, once joined.
    joined_key: Option<String>,
}

impl ConnectionActor {
    async fn read_loop(&mut self, mut stream: SplitStream<WebSocket>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!(
                        target: "hub.connection",
                        connection_id = %self.connection_id,
                        "Read loop cancelled"
                    );
                    break;
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_frame(&text).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(Message::Binary(_))) => {
                            if !self
                                .unicast_error(&HubError::Protocol(
                                    "Binary frames are not supported".to_string(),
                                ))
                                .await
                            {
                                break;
                            }
                        }
                        // Ping/pong are handled by the transport
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(
                                target: "hub.connection",
                                connection_id = %self.connection_id,
                                error = %e,
                                "Socket read error"
                            );
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Process one text frame. Returns false when the connection should
    /// close (outbound queue gone).
    async fn handle_frame(&mut self, text: &str) -> bool {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(
                    target: "hub.connection",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Malformed frame"
                );
                return self
                    .unicast_error(&HubError::Protocol("Invalid message format".to_string()))
                    .await;
            }
        };

        match envelope {
            Envelope::Join { key, token } => self.handle_join(key, token).await,
            Envelope::Add { number, .. } => self.handle_add(number).await,
            Envelope::Remove { index, .. } => self.handle_remove(index).await,
            // Server-to-client kinds are not accepted from clients
            Envelope::Sync { .. } | Envelope::Error { .. } | Envelope::AuthRequired { .. } => {
                self.unicast_error(&HubError::Protocol(
                    "Unexpected message kind".to_string(),
                ))
                .await
            }
        }
    }

    async fn handle_join(&mut self, key: String, token: Option<String>) -> bool {
        if self.joined_key.is_some() {
            return self
                .unicast_error(&HubError::Protocol("Already joined a room".to_string()))
                .await;
        }

        if key.is_empty() {
            return self
                .unicast_error(&HubError::Protocol("Room key is required".to_string()))
                .await;
        }

        // Joining a nonexistent room creates it, open and empty
        let session = match self.state.repo.create_or_get_session(&key, None).await {
            Ok(session) => session,
            Err(e) => return self.unicast_error(&e).await,
        };

        if let Err(e) =
            self.state
                .auth
                .authorize_join(&key, token.as_deref(), session.has_password())
        {
            return self.unicast(&e.to_envelope(Some(&key))).await;
        }

        let member = MemberHandle {
            connection_id: self.connection_id.clone(),
            sender: self.out_tx.clone(),
            cancel: self.cancel.clone(),
        };
        if self.state.hub.register(key.clone(), member).await.is_err() {
            return false;
        }
        self.joined_key = Some(key.clone());

        self.state
            .registry
            .record_join(new_connection_record(
                &self.connection_id,
                &key,
                self.ip_address.clone(),
                self.user_agent.clone(),
            ))
            .await;

        info!(
            target: "hub.connection",
            connection_id = %self.connection_id,
            room_key = %key,
            "Joined room"
        );

        // The history MUST be fetched after registration. Mutations are
        // persisted before their broadcast is submitted, so any frame
        // already queued ahead of this sync is reflected in the history
        // read here and the sync can never be older than it.
        let history = match self.state.repo.get_session(&key).await {
            Ok(Some(session)) => session.history,
            Ok(None) => Vec::new(),
            Err(e) => return self.unicast_error(&e).await,
        };

        let sync = Envelope::Sync {
            key,
            history,
            full: true,
        };
        self.unicast(&sync).await
    }

    async fn handle_add(&mut self, number: crate::protocol::SpinValue) -> bool {
        let Some(key) = self.joined_key.clone() else {
            return self
                .unicast_error(&HubError::Protocol("Join a room first".to_string()))
                .await;
        };

        if !number.is_valid() {
            return self
                .unicast_error(&HubError::Protocol("Invalid wheel number".to_string()))
                .await;
        }

        // Persist first; only an accepted append is broadcast
        let version = match self.state.repo.append_number(&key, &number).await {
            Ok(version) => version,
            Err(e) => return self.unicast_error(&e).await,
        };

        self.state.registry.touch(&self.connection_id).await;

        self.state
            .hub
            .broadcast(
                key.clone(),
                Envelope::Add {
                    key: Some(key),
                    number,
                    version: Some(version),
                },
            )
            .await
            .is_ok()
    }

    async fn handle_remove(&mut self, index: usize) -> bool {
        let Some(key) = self.joined_key.clone() else {
            return self
                .unicast_error(&HubError::Protocol("Join a room first".to_string()))
                .await;
        };

        let version = match self.state.repo.remove_number(&key, index).await {
            Ok(version) => version,
            Err(e) => return self.unicast_error(&e).await,
        };

        self.state.registry.touch(&self.connection_id).await;

        self.state
            .hub
            .broadcast(
                key.clone(),
                Envelope::Remove {
                    key: Some(key),
                    index,
                    version: Some(version),
                },
            )
            .await
            .is_ok()
    }

    async fn unicast_error(&self, error: &HubError) -> bool {
        self.unicast(&error.to_envelope(self.joined_key.as_deref()))
            .await
    }

    /// Queue a frame to this connection only. Returns false when the
    /// outbound queue is gone and the connection should close.
    async fn unicast(&self, envelope: &Envelope) -> bool {
        let frame: Arc<str> = match serde_json::to_string(envelope) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(
                    target: "hub.connection",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to serialize unicast envelope"
                );
                return true;
            }
        };

        self.out_tx.send(frame).await.is_ok()
    }
}
