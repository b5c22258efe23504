//! Direction debouncing.
//!
//! Raw directional inputs arrive at arbitrary rates. They are filtered against
//! the held direction as they arrive, buffered for the current tick window, and
//! released once per window as an ordered list of decisions.

use crate::geometry::Direction;
use crate::input::{InputCode, to_direction};

/// Default decision window in milliseconds.
pub const TICK_PERIOD_MS: u64 = 80;

/// Holds the last accepted direction and rejects repeats and U-turns.
#[derive(Debug, Clone, Default)]
pub struct DirectionFilter {
    held: Option<Direction>,
}

impl DirectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one direction and return the value held afterwards.
    ///
    /// A direction is only accepted when it is perpendicular to the held one
    /// (or nothing is held yet); otherwise the held value is returned unchanged.
    pub fn accept(&mut self, next: Direction) -> Direction {
        match self.held {
            Some(prev) if !prev.is_perpendicular(next) => prev,
            _ => {
                self.held = Some(next);
                next
            },
        }
    }

    pub fn held(&self) -> Option<Direction> {
        self.held
    }
}

/// Batches filtered directions into fixed windows and releases one ordered
/// group of decisions per window.
#[derive(Debug, Clone, Default)]
pub struct DirectionScheduler {
    filter: DirectionFilter,
    window: Vec<Direction>,
    last_forwarded: Option<Direction>,
}

impl DirectionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a raw input code. Returns false for non-directional codes, which are dropped.
    pub fn push_code(&mut self, code: InputCode) -> bool {
        match to_direction(code) {
            Some(direction) => {
                self.push(direction);
                true
            },
            None => false,
        }
    }

    pub fn push(&mut self, direction: Direction) {
        let filtered = self.filter.accept(direction);
        self.window.push(filtered);
    }

    /// Close the current window.
    ///
    /// Consecutive duplicates inside the window collapse into one decision.
    /// An empty window repeats the previously forwarded decision so the snake
    /// keeps moving; before any direction exists that decision is `None`.
    pub fn close_window(&mut self) -> Vec<Option<Direction>> {
        let mut batch = std::mem::take(&mut self.window);
        batch.dedup();

        match batch.last() {
            Some(&last) => {
                self.last_forwarded = Some(last);
                batch.into_iter().map(Some).collect()
            },
            None => vec![self.last_forwarded],
        }
    }

    /// Direction currently held by the reversal filter.
    pub fn held(&self) -> Option<Direction> {
        self.filter.held()
    }

    pub fn pending(&self) -> usize {
        self.window.len()
    }
}
