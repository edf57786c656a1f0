//! Assembles the per-endpoint routers into the two listeners this gateway
//! exposes: the main HTTP API (native `/api/v1/*` plus the bare-path Ollama
//! translation layer) and the realtime WebSocket, served on a second port.

mod audio;
mod chat;
mod health;
mod images;
mod models;
mod ollama;
mod realtime;

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::logging::request_logger;
use crate::state::AppState;

/// Native `/api/v1/*` surface plus the Ollama-compatible bare-path
/// translation layer, served together on the primary HTTP port.
pub fn http_router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .merge(health::router())
        .merge(models::router())
        .merge(chat::router())
        .merge(images::router())
        .merge(audio::router())
        .merge(ollama::v1_router());

    Router::new()
        .nest("/api/v1", v1)
        .merge(ollama::router())
        .layer(middleware::from_fn(request_logger))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The realtime transcription WebSocket, served on its own port
/// (`config.server.ws_port`).
pub fn realtime_router(state: Arc<AppState>) -> Router {
    realtime::router()
        .layer(middleware::from_fn(request_logger))
        .with_state(state)
}
