use std::convert::Infallible;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::{AppState, ConnectionGuard};
use crate::store::{StoreChange, StoreWrite};

/// GET /api/v1/snakes/stream: SSE stream of store writes.
pub async fn snake_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let Some(guard) = ConnectionGuard::try_acquire(&state.sse_subscriber_count, max_sse) else {
        tracing::warn!(max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let rx = state.store.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result: Result<StoreWrite, _>| {
        let _guard = &guard;
        match result {
            Ok(write) => match serde_json::to_string(&write) {
                Ok(json) => Some(Ok(SseEvent::default()
                    .event(event_name(&write.change))
                    .data(json)
                    .id(write.seq.to_string()))),
                Err(e) => {
                    tracing::warn!(seq = write.seq, error = %e, "Failed to encode store write");
                    None
                },
            },
            Err(e) => {
                tracing::warn!("SSE broadcast receive error: {e}");
                None
            },
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn event_name(change: &StoreChange) -> &'static str {
    match change {
        StoreChange::Created { .. } => "created",
        StoreChange::Updated { .. } => "updated",
        StoreChange::Fruit { .. } => "fruit",
    }
}
