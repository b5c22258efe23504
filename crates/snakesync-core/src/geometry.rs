use std::hash::{Hash, Hasher};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Board dimensions. Coordinates are zero-based and wrap on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSize {
    pub width: u32,
    pub height: u32,
}

impl BoardSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Like [`BoardSize::new`], but rejects a zero-sized side.
    pub fn try_new(width: u32, height: u32) -> Result<Self, EmptyBoard> {
        let board = Self::new(width, height);
        if board.is_empty() {
            return Err(EmptyBoard(board));
        }
        Ok(board)
    }

    /// True when the board has no cells. Nothing can be placed or wrapped on it.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Cell the snake is spawned on.
    pub fn center(&self) -> Point {
        Point::new((self.width / 2) as i32, (self.height / 2) as i32)
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A board with a zero-sized side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyBoard(pub BoardSize);

impl std::fmt::Display for EmptyBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "board {}x{} has no cells", self.0.width, self.0.height)
    }
}

impl std::error::Error for EmptyBoard {}

/// A cell on the board.
///
/// Equality and hashing only look at the coordinates; `grown` is a rendering
/// marker carried by segments added through fruit consumption.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub grown: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y, grown: false }
    }

    pub fn translate(self, direction: Direction) -> Self {
        let (dx, dy) = direction.vector();
        Self::new(self.x + dx, self.y + dy)
    }

    /// Fold the point back onto the torus `[0, width) x [0, height)`.
    /// `board` must not be empty.
    pub fn wrap(self, board: BoardSize) -> Self {
        Self {
            x: self.x.rem_euclid(board.width as i32),
            y: self.y.rem_euclid(board.height as i32),
            grown: self.grown,
        }
    }

    pub fn inflate(self) -> Self {
        Self {
            grown: true,
            ..self
        }
    }

    /// Uniform cell of a non-empty `board`.
    pub fn random<R: Rng + ?Sized>(board: BoardSize, rng: &mut R) -> Self {
        Self::new(
            rng.random_range(0..board.width) as i32,
            rng.random_range(0..board.height) as i32,
        )
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Eq for Point {}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x.hash(state);
        self.y.hash(state);
    }
}

/// Cardinal movement direction. Screen coordinates: `Up` decreases `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "[i32; 2]", try_from = "[i32; 2]")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn vector(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// True when neither vector component matches, i.e. a real turn.
    /// Repeats and reversals share an axis component and are rejected.
    pub fn is_perpendicular(self, other: Direction) -> bool {
        let (ax, ay) = self.vector();
        let (bx, by) = other.vector();
        ax != bx && ay != by
    }
}

impl From<Direction> for [i32; 2] {
    fn from(d: Direction) -> Self {
        let (dx, dy) = d.vector();
        [dx, dy]
    }
}

/// Error for vectors that are not one of the four unit directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidDirection(pub [i32; 2]);

impl std::fmt::Display for InvalidDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not a unit direction: [{}, {}]", self.0[0], self.0[1])
    }
}

impl std::error::Error for InvalidDirection {}

impl TryFrom<[i32; 2]> for Direction {
    type Error = InvalidDirection;

    fn try_from(v: [i32; 2]) -> Result<Self, Self::Error> {
        match v {
            [0, -1] => Ok(Direction::Up),
            [0, 1] => Ok(Direction::Down),
            [-1, 0] => Ok(Direction::Left),
            [1, 0] => Ok(Direction::Right),
            other => Err(InvalidDirection(other)),
        }
    }
}

/// Serde adapter for `Option<Direction>`: `[dx, dy]` or `[]` for "no direction yet".
pub mod direction_or_empty {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Direction;

    pub fn serialize<S: Serializer>(value: &Option<Direction>, s: S) -> Result<S::Ok, S::Error> {
        let v: Vec<i32> = match value {
            Some(d) => <[i32; 2]>::from(*d).to_vec(),
            None => Vec::new(),
        };
        v.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Direction>, D::Error> {
        let v = Vec::<i32>::deserialize(d)?;
        match v.as_slice() {
            [] => Ok(None),
            [dx, dy] => Direction::try_from([*dx, *dy])
                .map(Some)
                .map_err(D::Error::custom),
            _ => Err(D::Error::custom(format!(
                "direction must have 0 or 2 components, got {}",
                v.len()
            ))),
        }
    }
}
