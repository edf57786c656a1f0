//! `GET /api/v1/health` and `GET /api/v1/stats` (§4.7, §4.8).

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::AppState;
use crate::telemetry::TelemetrySnapshot;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    websocket_port: u16,
    models_loaded: Vec<String>,
    max_models: HashMap<String, usize>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let loaded = state.pool.list().await;
    let max_models = state
        .pool
        .capacities()
        .into_iter()
        .map(|(family, cap)| (family.to_string(), cap))
        .collect();
    Json(HealthResponse {
        status: "ok",
        websocket_port: state.config.server.ws_port(),
        models_loaded: loaded.into_iter().map(|m| m.name).collect(),
        max_models,
    })
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    model: Option<String>,
}

/// Without `?model=`, returns every model's snapshot keyed by name; with
/// it, a single snapshot (empty object if nothing has been observed yet).
async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<serde_json::Value>> {
    let value = match query.model {
        Some(model) => serde_json::to_value(state.telemetry.snapshot(&model).unwrap_or_default())
            .map_err(|e| crate::error::Error::Internal(e.to_string()))?,
        None => {
            let all: HashMap<String, TelemetrySnapshot> = state.telemetry.all();
            serde_json::to_value(all).map_err(|e| crate::error::Error::Internal(e.to_string()))?
        }
    };
    Ok(Json(value))
}
