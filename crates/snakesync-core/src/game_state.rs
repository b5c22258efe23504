use serde::{Deserialize, Serialize};

/// Lifecycle of a single snake.
///
/// `Loaded` is the state right after spawn, before the first move.
/// `Running` and `Paused` alternate while playing, and `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameState {
    Loaded,
    Running,
    Paused,
    Ended,
}

impl GameState {
    pub fn is_terminal(self) -> bool {
        self == GameState::Ended
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameState::Loaded => "loaded",
            GameState::Running => "running",
            GameState::Paused => "paused",
            GameState::Ended => "ended",
        }
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
