use serde::{Deserialize, Serialize};

use crate::geometry::Direction;

/// Decoded input code delivered by the input layer (keyboard or swipe recognizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputCode {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    SwipeUp,
    SwipeDown,
    SwipeLeft,
    SwipeRight,
    Space,
    Enter,
    NumpadEnter,
    Unknown(u16),
}

impl InputCode {
    /// Start/confirm keys that (re)start a session.
    pub fn is_start(self) -> bool {
        matches!(self, InputCode::Enter | InputCode::NumpadEnter)
    }

    pub fn is_pause_toggle(self) -> bool {
        self == InputCode::Space
    }
}

/// A discrete event from the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    Key(InputCode),
    /// The game window lost focus.
    Blur,
}

/// Map an input code to a movement direction. Non-directional codes yield `None`.
pub fn to_direction(code: InputCode) -> Option<Direction> {
    match code {
        InputCode::ArrowUp | InputCode::SwipeUp => Some(Direction::Up),
        InputCode::ArrowDown | InputCode::SwipeDown => Some(Direction::Down),
        InputCode::ArrowLeft | InputCode::SwipeLeft => Some(Direction::Left),
        InputCode::ArrowRight | InputCode::SwipeRight => Some(Direction::Right),
        InputCode::Space | InputCode::Enter | InputCode::NumpadEnter | InputCode::Unknown(_) => {
            None
        },
    }
}
