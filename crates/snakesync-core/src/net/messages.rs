use serde::{Deserialize, Serialize};

use crate::gateway::SessionHandle;
use crate::geometry::BoardSize;
use crate::input::InputEvent;
use crate::reducer::PlayState;

/// Network message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Client -> Host
    Join = 0x01,
    Input = 0x02,

    // Host -> Client
    Welcome = 0x10,
    SessionStarted = 0x11,
    Frame = 0x12,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Join),
            0x02 => Some(Self::Input),
            0x10 => Some(Self::Welcome),
            0x11 => Some(Self::SessionStarted),
            0x12 => Some(Self::Frame),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Join(JoinMsg),
    Input(InputMsg),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Welcome(WelcomeMsg),
    SessionStarted(SessionStartedMsg),
    Frame(FrameMsg),
}

/// First message on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinMsg {
    pub player_id: String,
    pub protocol_version: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMsg {
    pub event: InputEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeMsg {
    pub player_id: String,
    pub board: BoardSize,
    pub tick_period_ms: u64,
}

/// A new game began under `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartedMsg {
    pub session_id: SessionHandle,
}

/// One changed local state, for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMsg {
    pub session_id: SessionHandle,
    pub state: PlayState,
}
