use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game_state::GameState;
use crate::geometry::{BoardSize, Direction, Point, direction_or_empty};

/// Default body length of a freshly spawned snake.
pub const DEFAULT_SNAKE_LENGTH: usize = 5;

/// Random picks tried before falling back to a board scan for a free fruit cell.
const FRUIT_PLACEMENT_ATTEMPTS: usize = 100;

/// One player's game as seen by the reducer and the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayState {
    pub player_id: String,
    /// Body segments, head first.
    pub snake: Vec<Point>,
    pub state: GameState,
    pub score: u32,
    /// Fruit position observed on the last tick (render only).
    pub fruit: Option<Point>,
    /// Direction applied on the last tick (render only).
    #[serde(with = "direction_or_empty")]
    pub direction: Option<Direction>,
}

impl PlayState {
    /// Fresh snake: `length` segments stacked on the board center, not moving yet.
    pub fn initial(player_id: impl Into<String>, board: BoardSize, length: usize) -> Self {
        let center = board.center();
        Self {
            player_id: player_id.into(),
            snake: vec![center; length.max(1)],
            state: GameState::Loaded,
            score: 0,
            fruit: None,
            direction: None,
        }
    }

    pub fn head(&self) -> Option<Point> {
        self.snake.first().copied()
    }
}

/// Shared, cross-session configuration read on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedConfig {
    pub fruit: Option<Point>,
    pub board: BoardSize,
}

/// Inputs for one reducer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub direction: Option<Direction>,
    pub shared: SharedConfig,
    pub paused: bool,
}

/// Result of one reducer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub state: PlayState,
    /// New fruit position to publish when the fruit was eaten this tick.
    pub relocated_fruit: Option<Point>,
}

/// Advance one snake by one decision.
///
/// Pure apart from the RNG, which is only consulted when fruit is eaten.
pub fn play<R: Rng + ?Sized>(current: &PlayState, tick: &Tick, rng: &mut R) -> TickOutcome {
    let mut next = PlayState {
        fruit: tick.shared.fruit,
        direction: tick.direction,
        ..current.clone()
    };

    let direction = match tick.direction {
        Some(d) if !current.state.is_terminal() => d,
        _ => return unchanged(next),
    };

    if tick.paused {
        next.state = GameState::Paused;
        return unchanged(next);
    }

    let Some(head) = current.head() else {
        return unchanged(next);
    };
    let board = tick.shared.board;
    let candidate = head.translate(direction).wrap(board);

    next.state = if current.snake.contains(&candidate) {
        GameState::Ended
    } else {
        GameState::Running
    };

    next.snake.insert(0, candidate);

    let mut relocated_fruit = None;
    if tick.shared.fruit == Some(candidate) {
        next.snake[0] = candidate.inflate();
        let fruit = place_fruit(board, &next.snake, rng);
        next.fruit = Some(fruit);
        next.score += 1;
        relocated_fruit = Some(fruit);
    } else {
        next.snake.pop();
    }

    TickOutcome {
        state: next,
        relocated_fruit,
    }
}

fn unchanged(state: PlayState) -> TickOutcome {
    TickOutcome {
        state,
        relocated_fruit: None,
    }
}

/// Pick a fruit cell not covered by `occupied`.
///
/// Tries random cells first, then scans the board. A full board falls back to
/// any random cell.
pub fn place_fruit<R: Rng + ?Sized>(board: BoardSize, occupied: &[Point], rng: &mut R) -> Point {
    for _ in 0..FRUIT_PLACEMENT_ATTEMPTS {
        let p = Point::random(board, rng);
        if !occupied.contains(&p) {
            return p;
        }
    }

    for y in 0..board.height as i32 {
        for x in 0..board.width as i32 {
            let p = Point::new(x, y);
            if !occupied.contains(&p) {
                return p;
            }
        }
    }

    tracing::debug!(
        width = board.width,
        height = board.height,
        "Board is full, placing fruit on an occupied cell"
    );
    Point::random(board, rng)
}
