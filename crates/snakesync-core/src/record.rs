use serde::{Deserialize, Serialize};

use crate::game_state::GameState;
use crate::geometry::{Direction, Point, direction_or_empty};
use crate::reducer::PlayState;

/// Remote representation of one player's game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub player_id: String,
    /// JSON-encoded point list, head first.
    pub snake: String,
    pub score: u32,
    pub state: GameState,
    #[serde(with = "direction_or_empty")]
    pub direction: Option<Direction>,
    /// Unix seconds of the last write.
    pub updated: u64,
}

impl SessionRecord {
    pub fn new(player_id: impl Into<String>, updated: u64) -> Self {
        Self {
            player_id: player_id.into(),
            snake: "[]".to_string(),
            score: 0,
            state: GameState::Loaded,
            direction: None,
            updated,
        }
    }

    /// Merge a partial update. Absent fields keep their current value.
    pub fn apply(&mut self, fields: &SessionFields) {
        if let Some(ref snake) = fields.snake {
            self.snake.clone_from(snake);
        }
        if let Some(score) = fields.score {
            self.score = score;
        }
        if let Some(state) = fields.state {
            self.state = state;
        }
        if let Some(direction) = fields.direction {
            self.direction = direction;
        }
        if let Some(updated) = fields.updated {
            self.updated = updated;
        }
    }

    pub fn apply_field(&mut self, field: RecordField) {
        match field {
            RecordField::Snake(s) => self.snake = s,
            RecordField::Score(s) => self.score = s,
            RecordField::State(s) => self.state = s,
            RecordField::Direction(d) => self.direction = d,
            RecordField::Updated(u) => self.updated = u,
        }
    }

    pub fn decode_snake(&self) -> Result<Vec<Point>, serde_json::Error> {
        serde_json::from_str(&self.snake)
    }
}

/// Partial update of a [`SessionRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFields {
    pub snake: Option<String>,
    pub score: Option<u32>,
    pub state: Option<GameState>,
    pub direction: Option<Option<Direction>>,
    pub updated: Option<u64>,
}

impl SessionFields {
    /// Full per-tick write for a local state.
    pub fn from_state(state: &PlayState, updated: u64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            snake: Some(serde_json::to_string(&state.snake)?),
            score: Some(state.score),
            state: Some(state.state),
            direction: Some(state.direction),
            updated: Some(updated),
        })
    }

    /// Only marks the record as ended. Used as the disconnect fallback.
    pub fn ended() -> Self {
        Self {
            state: Some(GameState::Ended),
            ..Self::default()
        }
    }
}

/// A single record field, for targeted writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordField {
    Snake(String),
    Score(u32),
    State(GameState),
    Direction(Option<Direction>),
    Updated(u64),
}
