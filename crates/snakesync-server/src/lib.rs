pub mod api;
pub mod config;
pub mod error;
pub mod session_loop;
pub mod sse;
pub mod state;
pub mod store;
pub mod ws;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let api_routes = Router::new()
        .route("/snakes", get(api::list_snakes))
        .route("/snakes/stream", get(sse::snake_stream))
        .route("/snakes/{id}", get(api::get_snake))
        .route("/fruit", get(api::get_fruit))
        .route("/status", get(api::get_status));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}
