//! `GET /api/v1/models`, `POST /api/v1/load`, `POST /api/v1/pull` (§4.7).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use lemonade_common::Family;
use serde::{Deserialize, Serialize};

use crate::catalog::ListFilter;
use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/models", get(list_models))
        .route("/load", post(load_model))
        .route("/pull", post(pull_model))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    show_all: bool,
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelData>,
}

#[derive(Debug, Serialize)]
struct ModelData {
    id: String,
    object: &'static str,
    family: Family,
}

async fn list_models(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<ModelsResponse> {
    let filter = ListFilter {
        only_installed: !query.show_all,
        ..ListFilter::default()
    };
    let entries = state.catalog.list(&filter, Some(&state.weights)).await;
    Json(ModelsResponse {
        object: "list",
        data: entries
            .into_iter()
            .map(|e| ModelData {
                id: e.id,
                object: "model",
                family: e.family,
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct LoadRequest {
    model_name: String,
    #[serde(default)]
    #[allow(dead_code)]
    backend: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoadResponse {
    status: &'static str,
    model: String,
}

/// Warms the model by acquiring and immediately releasing it, so it's
/// resident without being pinned by this request.
async fn load_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<LoadResponse>> {
    let _handle = state.pool.acquire(&request.model_name).await?;
    Ok(Json(LoadResponse {
        status: "loaded",
        model: request.model_name,
    }))
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    model_name: String,
}

#[derive(Debug, Serialize)]
struct PullResponse {
    status: &'static str,
    model: String,
}

/// Ensures weights and the backend binary are both present on disk,
/// without launching the backend (§4.1/§4.3's Download/Ensure).
async fn pull_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PullRequest>,
) -> Result<Json<PullResponse>> {
    use crate::weights::{hf_resolve_url, WeightRef};

    let entry = state.catalog.lookup(&request.model_name).await?;
    let weight_ref = WeightRef::parse(&entry.checkpoint);
    if state.weights.resolve(&weight_ref).is_err() {
        match &weight_ref {
            WeightRef::RepoFile(repo, filename) => {
                let url = hf_resolve_url(repo, filename);
                state.weights.download(repo, filename, &url).await?;
            }
            WeightRef::Repo(_) | WeightRef::Path(_) => {
                return Err(crate::error::Error::NotImplemented(
                    "pulling a bare repo id requires listing its files to find the primary \
                     weight; register the model with an explicit repo:filename checkpoint"
                        .to_string(),
                ));
            }
        }
    }

    let variant = state.installer.select_preferred_variant(
        entry.family,
        None,
        state.config.llamacpp.prefer_system,
    );
    let spec = crate::install::InstallSpec {
        family: entry.family,
        variant,
        version: "latest".to_string(),
    };
    state.installer.ensure(&spec).await?;

    Ok(Json(PullResponse {
        status: "available",
        model: request.model_name,
    }))
}
