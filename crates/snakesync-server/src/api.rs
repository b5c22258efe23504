use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;

use snakesync_core::geometry::Point;
use snakesync_core::record::SessionRecord;

use crate::error::AppError;
use crate::state::AppState;
use crate::store::{StoreStats, StoreWrite};

/// Number of log entries included in the status response.
const STATUS_RECENT_WRITES: usize = 20;

/// GET /api/v1/snakes: every session record keyed by session id.
pub async fn list_snakes(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, SessionRecord>>, AppError> {
    Ok(Json(state.store.snapshot()?))
}

/// GET /api/v1/snakes/{id}
pub async fn get_snake(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionRecord>, AppError> {
    state
        .store
        .record(&id)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// GET /api/v1/fruit
pub async fn get_fruit(State(state): State<AppState>) -> Result<Json<Point>, AppError> {
    state
        .store
        .fruit()?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No fruit placed yet".to_string()))
}

#[derive(Debug, Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub sse: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    pub stats: StoreStats,
    pub connections: ConnectionInfo,
    pub recent_writes: Vec<StoreWrite>,
}

/// GET /api/v1/status: store statistics, connection counts and recent writes.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    use std::sync::atomic::Ordering;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        stats: state.store.stats()?,
        connections: ConnectionInfo {
            websocket: state.ws_connection_count.load(Ordering::Relaxed),
            sse: state.sse_subscriber_count.load(Ordering::Relaxed),
        },
        recent_writes: state.store.recent(STATUS_RECENT_WRITES)?,
    }))
}
