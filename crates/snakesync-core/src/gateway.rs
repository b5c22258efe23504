use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::record::{RecordField, SessionFields};

/// Opaque key of one remote session record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    /// Allocate a fresh unique key locally, without a round trip.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The store could not be reached or is shutting down.
    Unavailable(String),
    UnknownSession(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(m) => write!(f, "store unavailable: {m}"),
            Self::UnknownSession(id) => write!(f, "unknown session: {id}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Interface to the shared store that mirrors session state to observers.
///
/// Writes are fire-and-forget from the engine's point of view: callers log
/// failures and keep going with local state. Writes issued through one handle
/// are applied in order; nothing is promised across handles.
pub trait SyncGateway: Send + Sync {
    /// Allocate a record for a new game of `player_id`.
    fn create_session(&self, player_id: &str) -> SessionHandle;

    fn update(&self, handle: &SessionHandle, fields: SessionFields) -> Result<(), GatewayError>;

    /// Fields the store applies on its own if this client disappears.
    fn register_disconnect_fallback(
        &self,
        handle: &SessionHandle,
        fields: SessionFields,
    ) -> Result<(), GatewayError>;

    /// Drop the fallback for `handle`. Called once its record is final.
    fn cancel_disconnect_fallback(&self, handle: &SessionHandle) -> Result<(), GatewayError>;

    fn set_field(&self, handle: &SessionHandle, field: RecordField) -> Result<(), GatewayError>;

    fn set_fruit_position(&self, position: Point) -> Result<(), GatewayError>;

    fn read_fruit_position(&self) -> Option<Point>;
}
