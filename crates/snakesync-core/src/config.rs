use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debounce::TICK_PERIOD_MS;
use crate::reducer::DEFAULT_SNAKE_LENGTH;

/// Data-driven engine tuning shared by every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of one decision window (ms).
    pub tick_period_ms: u64,
    /// Body length of a freshly spawned snake.
    pub initial_length: usize,
    /// Start the first session as soon as the player joins, without waiting for Enter.
    pub auto_start: bool,
    /// Fixed RNG seed for fruit placement. Random per session when unset.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: TICK_PERIOD_MS,
            initial_length: DEFAULT_SNAKE_LENGTH,
            auto_start: true,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}
