use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use snakesync_core::gateway::{SessionHandle, SyncGateway};
use snakesync_core::geometry::EmptyBoard;
use snakesync_core::input::InputEvent;
use snakesync_core::net::messages::{FrameMsg, ServerMessage, SessionStartedMsg};
use snakesync_core::net::protocol::encode_server_message;
use snakesync_core::reducer::PlayState;
use snakesync_core::session::{SessionConfig, SessionOrchestrator};

use crate::config::ServerConfig;

/// Outbound slots frames may never take, so session control messages still fit.
const CONTROL_RESERVE: usize = 2;

/// Commands sent from the WebSocket handler to the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Input(InputEvent),
    Stop,
}

/// Messages sent from the session loop to the connected player.
#[derive(Debug, Clone)]
pub enum SessionBroadcast {
    /// Serialized ServerMessage bytes ready to send over WebSocket.
    EncodedMessage(Bytes),
    /// The loop has finalized its session and exited.
    SessionEnded,
}

/// Configuration for one player's session loop.
pub struct SessionLoopConfig {
    pub session: SessionConfig,
    pub tick_period: Duration,
    pub auto_start: bool,
    /// Capacity of the outbound queue to the player.
    pub message_buffer: usize,
}

impl SessionLoopConfig {
    pub fn new(player_id: impl Into<String>, config: &ServerConfig) -> Self {
        Self {
            session: SessionConfig::new(player_id, config.board(), &config.engine),
            tick_period: config.engine.tick_period(),
            auto_start: config.engine.auto_start,
            message_buffer: config.limits.player_message_buffer,
        }
    }
}

/// Spawn a session loop as a tokio task.
/// Returns the command sender and the player's bounded outbound receiver.
///
/// Frames are dropped while the player is not draining its queue; session
/// announcements wait for room.
pub fn spawn_session_loop(
    config: SessionLoopConfig,
    gateway: Arc<dyn SyncGateway>,
) -> Result<
    (
        mpsc::UnboundedSender<SessionCommand>,
        mpsc::Receiver<SessionBroadcast>,
        JoinHandle<()>,
    ),
    EmptyBoard,
> {
    let SessionLoopConfig {
        session,
        tick_period,
        auto_start,
        message_buffer,
    } = config;
    let orchestrator = SessionOrchestrator::new(session, gateway)?;
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (broadcast_tx, broadcast_rx) = mpsc::channel(message_buffer.max(CONTROL_RESERVE + 1));

    let handle = tokio::spawn(async move {
        run_session_loop(orchestrator, tick_period, auto_start, cmd_rx, broadcast_tx).await;
    });

    Ok((cmd_tx, broadcast_rx, handle))
}

async fn run_session_loop(
    mut orchestrator: SessionOrchestrator,
    tick_period: Duration,
    auto_start: bool,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    broadcast_tx: mpsc::Sender<SessionBroadcast>,
) {
    if auto_start {
        let handle = orchestrator.start();
        send_session_started(&broadcast_tx, handle).await;
    }

    let mut interval = tokio::time::interval(tick_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let frames = orchestrator.tick();
                if let Some(handle) = orchestrator.session_handle() {
                    for state in frames {
                        send_frame(&broadcast_tx, handle, state);
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Input(event)) => {
                        if orchestrator.handle_input(event)
                            && let Some(handle) = orchestrator.session_handle().cloned()
                        {
                            send_session_started(&broadcast_tx, handle).await;
                        }
                    },
                    Some(SessionCommand::Stop) | None => break,
                }
            }
        }
    }

    orchestrator.finish();
    tracing::info!(player_id = %orchestrator.player_id(), "Session loop stopped");
    // The writer also stops once this sender is dropped.
    if let Err(e) = broadcast_tx.try_send(SessionBroadcast::SessionEnded) {
        tracing::debug!(error = %e, "Could not queue SessionEnded");
    }
}

/// Queue a session announcement, waiting for room if the player is behind.
async fn send_session_started(tx: &mpsc::Sender<SessionBroadcast>, handle: SessionHandle) {
    let msg = ServerMessage::SessionStarted(SessionStartedMsg { session_id: handle });
    if let Some(data) = encode(&msg) {
        let _ = tx.send(SessionBroadcast::EncodedMessage(data)).await;
    }
}

/// Queue a frame unless the player is behind, in which case it is dropped.
fn send_frame(tx: &mpsc::Sender<SessionBroadcast>, handle: &SessionHandle, state: PlayState) {
    if tx.capacity() <= CONTROL_RESERVE {
        tracing::debug!(session_id = %handle, "Dropping frame for slow client");
        return;
    }
    let msg = ServerMessage::Frame(FrameMsg {
        session_id: handle.clone(),
        state,
    });
    if let Some(data) = encode(&msg)
        && let Err(e) = tx.try_send(SessionBroadcast::EncodedMessage(data))
    {
        tracing::debug!(session_id = %handle, error = %e, "Dropping frame for slow client");
    }
}

fn encode(msg: &ServerMessage) -> Option<Bytes> {
    match encode_server_message(msg) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode session message");
            None
        },
    }
}
