use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use snakesync_core::gateway::SyncGateway;
use snakesync_core::net::messages::{ClientMessage, JoinMsg, ServerMessage, WelcomeMsg};
use snakesync_core::net::protocol::{
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION, decode_client_message, encode_server_message,
};

use crate::session_loop::{SessionBroadcast, SessionCommand, SessionLoopConfig, spawn_session_loop};
use crate::state::{AppState, ConnectionGuard};

/// Longest accepted player id, in characters.
const MAX_PLAYER_ID_CHARS: usize = 64;

/// WebSocket close code for policy violations.
const CLOSE_POLICY: u16 = 1008;

/// WebSocket close code for server-side failures.
const CLOSE_INTERNAL: u16 = 1011;

pub async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let max_ws = state.config.limits.max_ws_connections;
    let Some(guard) = ConnectionGuard::try_acquire(&state.ws_connection_count, max_ws) else {
        tracing::warn!(max = max_ws, "WS connection limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, guard)))
}

/// How the player's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    /// The client sent a close frame.
    Closed,
    /// The socket failed or vanished without a close frame.
    Dropped,
}

async fn handle_socket(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Wait for the first message: must be a Join.
    let first_msg = match ws_receiver.next().await {
        Some(Ok(Message::Binary(data))) => data,
        _ => return,
    };

    let join = match decode_client_message(&first_msg) {
        Ok(ClientMessage::Join(j)) => j,
        Ok(other) => {
            tracing::warn!(?other, "First message was not Join");
            reject(&mut ws_sender, CLOSE_POLICY, "expected join").await;
            return;
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode first message");
            reject(&mut ws_sender, CLOSE_POLICY, "malformed join").await;
            return;
        },
    };

    if let Err(reason) = validate_join(&join) {
        tracing::warn!(player_id = %join.player_id, reason, "Join rejected");
        reject(&mut ws_sender, CLOSE_POLICY, reason).await;
        return;
    }
    let player_id = join.player_id;

    let welcome = ServerMessage::Welcome(WelcomeMsg {
        player_id: player_id.clone(),
        board: state.config.board(),
        tick_period_ms: state.config.engine.tick_period_ms,
    });
    match encode_server_message(&welcome) {
        Ok(data) => {
            if ws_sender.send(Message::Binary(data.into())).await.is_err() {
                return;
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Welcome");
            return;
        },
    }

    let client = state.store.connect();
    let client_id = client.id();
    let gateway: Arc<dyn SyncGateway> = Arc::new(client);
    let (cmd_tx, broadcast_rx, loop_handle) = match spawn_session_loop(
        SessionLoopConfig::new(player_id.clone(), &state.config),
        gateway,
    ) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!(player_id = %player_id, error = %e, "Failed to start session loop");
            reject(&mut ws_sender, CLOSE_INTERNAL, "session unavailable").await;
            return;
        },
    };

    tracing::info!(player_id = %player_id, client_id, "Player connected");

    let writer = spawn_writer(ws_sender, broadcast_rx);

    let outcome = read_loop(&mut ws_receiver, &cmd_tx, &player_id).await;

    // Nothing more reaches the player; this also releases a loop waiting for queue room.
    writer.abort();

    match outcome {
        ReadOutcome::Closed => {
            let _ = cmd_tx.send(SessionCommand::Stop);
            if let Err(e) = loop_handle.await {
                tracing::warn!(player_id = %player_id, error = %e, "Session loop panicked");
            }
        },
        ReadOutcome::Dropped => {
            // The store client goes down with the task and its fallbacks end the record.
            loop_handle.abort();
            let _ = loop_handle.await;
        },
    }

    tracing::info!(player_id = %player_id, ?outcome, "Player disconnected");
}

fn validate_join(join: &JoinMsg) -> Result<(), &'static str> {
    if join.protocol_version != 0 && join.protocol_version != PROTOCOL_VERSION {
        return Err("protocol version mismatch");
    }
    if !is_valid_player_id(&join.player_id) {
        return Err("invalid player id");
    }
    Ok(())
}

/// Player ids are 1 to 64 characters with no control characters.
pub fn is_valid_player_id(id: &str) -> bool {
    let len = id.chars().count();
    (1..=MAX_PLAYER_ID_CHARS).contains(&len) && !id.chars().any(char::is_control)
}

async fn reject(ws_sender: &mut SplitSink<WebSocket, Message>, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = ws_sender.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Failed to send close frame");
    }
}

fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<SessionBroadcast>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg {
                SessionBroadcast::EncodedMessage(data) => {
                    if ws_sender.send(Message::Binary(data)).await.is_err() {
                        break;
                    }
                },
                SessionBroadcast::SessionEnded => break,
            }
        }
    })
}

async fn read_loop(
    ws_receiver: &mut SplitStream<WebSocket>,
    cmd_tx: &mpsc::UnboundedSender<SessionCommand>,
    player_id: &str,
) -> ReadOutcome {
    while let Some(msg) = ws_receiver.next().await {
        let data = match msg {
            Ok(Message::Binary(d)) => d,
            Ok(Message::Close(_)) => return ReadOutcome::Closed,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(player_id, error = %e, "WebSocket receive error");
                return ReadOutcome::Dropped;
            },
        };

        if data.is_empty() || data.len() > MAX_MESSAGE_SIZE {
            continue;
        }

        match decode_client_message(&data) {
            Ok(ClientMessage::Input(input)) => {
                if cmd_tx.send(SessionCommand::Input(input.event)).is_err() {
                    // Loop is gone; nothing left to drive.
                    return ReadOutcome::Closed;
                }
            },
            Ok(ClientMessage::Join(_)) => {
                tracing::warn!(player_id, "Ignoring repeated Join");
            },
            Err(e) => {
                tracing::debug!(player_id, error = %e, "Dropping undecodable message");
            },
        }
    }

    ReadOutcome::Dropped
}
