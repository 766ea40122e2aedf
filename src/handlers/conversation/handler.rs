//! Conversation WebSocket handler
//!
//! One upgraded socket carries one conversation. The handler wires the
//! transport to a [`Session`]: inbound frames are decoded and fed to the
//! session in strict arrival order, completion signals from the session's
//! spawned tasks are pumped through the same loop, and outbound events flow
//! through a dedicated sender task. The session itself never touches the
//! socket.

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::Auth;
use crate::core::conversation::{
    MessageRoute, ServerEvent, Session, SessionHandle, SessionSignal, protocol,
};
use crate::middleware::ClientIp;
use crate::state::AppState;

/// Outbound channel depth per connection
const CHANNEL_BUFFER_SIZE: usize = 256;

/// Completion-signal channel depth per connection
const SIGNAL_BUFFER_SIZE: usize = 64;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// How often we check if the connection is stale
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Conversation WebSocket handler
///
/// Upgrades the HTTP connection to a WebSocket speaking the tagged-frame
/// conversation protocol (`start` / `user_turn` / `interrupt` /
/// `playback_done` / `end` inbound).
pub async fn conversation_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<Auth>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    info!(auth_id = ?auth.id, "Conversation WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            handle_conversation_socket(socket, state, client_ip.map(|Extension(ip)| ip))
        })
}

/// Handle one conversation WebSocket connection, cradle to grave.
async fn handle_conversation_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    client_ip: Option<ClientIp>,
) {
    let connection_id = Uuid::new_v4();
    info!(%connection_id, "Conversation WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let (signal_tx, mut signal_rx) = mpsc::channel::<SessionSignal>(SIGNAL_BUFFER_SIZE);

    // Sender task for outgoing frames
    let sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let should_close = matches!(route, MessageRoute::Close);

            let result = match route {
                MessageRoute::Outgoing(event) => match protocol::encode(&event) {
                    Ok(frame) => sender.send(Message::Text(frame.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing event: {}", e);
                        continue;
                    }
                },
                MessageRoute::Close => {
                    info!("Closing conversation WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
            if should_close {
                break;
            }
        }
    });

    let session = Session::new(
        connection_id,
        Arc::clone(&app_state.provider),
        message_tx.clone(),
        signal_tx,
        app_state.config.session_config(),
    );

    // A rejected insert means the connection id is already live, which is a
    // lifecycle bug: fatal to this connection, never papered over.
    let session_handle = match app_state.sessions.create(connection_id, session) {
        Ok(handle) => handle,
        Err(e) => {
            error!(%connection_id, error = %e, "Session registry rejected connection");
            let _ = message_tx
                .send(MessageRoute::Outgoing(ServerEvent::Error {
                    message: "internal session lifecycle error".to_string(),
                }))
                .await;
            let _ = message_tx.send(MessageRoute::Close).await;
            if let Some(ClientIp(ip)) = client_ip {
                app_state.release_connection(ip);
            }
            return;
        }
    };

    // Maximum idle time before closing the connection, with ±10% jitter so
    // a burst of simultaneous connects does not time out in lockstep.
    let base_idle_secs = app_state.config.idle_timeout_seconds.max(1);
    let jitter_range = (base_idle_secs / 10).max(1);
    let jitter_offset =
        (connection_id.as_u128() % (jitter_range as u128 * 2)) as i64 - jitter_range as i64;
    let idle_timeout = Duration::from_secs((base_idle_secs as i64 + jitter_offset).max(1) as u64);
    let mut last_activity = Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = Instant::now();

                match msg_result {
                    Some(Ok(msg)) => {
                        let continue_processing =
                            process_frame(msg, &session_handle, &message_tx).await;

                        // The registry invariant: an entry exists only while
                        // the connection is open and the session has not
                        // ended. The handler keeps serving protocol errors
                        // for late frames until the client goes away.
                        if session_handle.lock().await.is_ended() {
                            app_state.sessions.remove(connection_id);
                        }

                        if !continue_processing {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%connection_id, "Conversation WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(%connection_id, "Conversation WebSocket closed by client");
                        break;
                    }
                }
            }
            Some(signal) = signal_rx.recv() => {
                session_handle.lock().await.handle_signal(signal).await;
            }
            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(
                        %connection_id,
                        "Connection idle for {}s, closing stale connection",
                        last_activity.elapsed().as_secs()
                    );
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(ServerEvent::Error {
                            message: "connection closed due to inactivity".to_string(),
                        }))
                        .await;
                    let _ = message_tx.send(MessageRoute::Close).await;
                    break;
                }
                debug!(%connection_id, "Idle check - connection still active");
            }
        }
    }

    // Cleanup: transport gone forces the end transition regardless of any
    // in-flight provider call, and the registry entry goes with it.
    session_handle.lock().await.on_close();
    app_state.sessions.remove(connection_id);
    if let Some(ClientIp(ip)) = client_ip {
        app_state.release_connection(ip);
    }
    sender_task.abort();

    info!(%connection_id, "Conversation WebSocket connection terminated");
}

/// Process one inbound frame. Returns false to terminate the connection.
async fn process_frame(
    msg: Message,
    session: &SessionHandle,
    message_tx: &mpsc::Sender<MessageRoute>,
) -> bool {
    match msg {
        Message::Text(text) => {
            match protocol::decode(&text) {
                Ok(event) => session.lock().await.handle_inbound(event).await,
                Err(e) => {
                    // Decode failures never crash the connection and never
                    // touch session state.
                    debug!("Undecodable inbound frame: {}", e);
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(ServerEvent::Error {
                            message: e.to_string(),
                        }))
                        .await;
                }
            }
            true
        }
        Message::Binary(data) => {
            debug!("Rejecting binary frame: {} bytes", data.len());
            let _ = message_tx
                .send(MessageRoute::Outgoing(ServerEvent::Error {
                    message: "binary frames are not supported; send audio base64-encoded in a user_turn frame"
                        .to_string(),
                }))
                .await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!("Conversation WebSocket close received");
            false
        }
    }
}
