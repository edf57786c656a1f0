//! `/chat/completions`, `/completions`, `/embeddings`, `/rerank` (§4.7).
//!
//! All four forward to the LLAMACPP/FLM adapter's OpenAI-compatible
//! upstream; only the path and label validation differ per endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use lemonade_common::{ChatCompletionRequest, EmbeddingsRequest, Label, RerankRequest};

use crate::adapter::{forward_json, forward_stream};
use crate::error::{Error, Result};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/completions", post(completions))
        .route("/embeddings", post(embeddings))
        .route("/rerank", post(rerank))
}

fn model_name(model: &Option<String>) -> Result<&str> {
    model
        .as_deref()
        .ok_or_else(|| Error::BadRequest("model is required".to_string()))
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response> {
    let name = model_name(&request.model)?;
    let handle = state.pool.acquire(name).await?;
    let body = serde_json::to_value(&request).map_err(|e| Error::Internal(e.to_string()))?;

    if request.wants_stream() {
        forward_stream(&state.http, handle.model.process.port, "/v1/chat/completions", body, name).await
    } else {
        let value = forward_json(&state.http, handle.model.process.port, "/v1/chat/completions", body, name).await?;
        Ok(Json(value).into_response())
    }
}

async fn completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<lemonade_common::CompletionRequest>,
) -> Result<Response> {
    let name = model_name(&request.model)?;
    let handle = state.pool.acquire(name).await?;
    let body = serde_json::to_value(&request).map_err(|e| Error::Internal(e.to_string()))?;

    if request.wants_stream() {
        forward_stream(&state.http, handle.model.process.port, "/v1/completions", body, name).await
    } else {
        let value = forward_json(&state.http, handle.model.process.port, "/v1/completions", body, name).await?;
        Ok(Json(value).into_response())
    }
}

async fn embeddings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmbeddingsRequest>,
) -> Result<Json<serde_json::Value>> {
    let name = model_name(&request.model)?;
    let entry = state.catalog.lookup(name).await?;
    if !entry.has_label(Label::Embeddings) {
        return Err(Error::BadRequest(format!("{name} is not an embeddings model")));
    }
    let handle = state.pool.acquire(name).await?;
    let body = serde_json::to_value(&request).map_err(|e| Error::Internal(e.to_string()))?;
    let value = forward_json(&state.http, handle.model.process.port, "/v1/embeddings", body, name).await?;
    Ok(Json(value))
}

async fn rerank(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RerankRequest>,
) -> Result<Json<serde_json::Value>> {
    let name = model_name(&request.model)?;
    let entry = state.catalog.lookup(name).await?;
    if !entry.has_label(Label::Reranking) {
        return Err(Error::BadRequest(format!("{name} is not a reranking model")));
    }
    let handle = state.pool.acquire(name).await?;
    let body = serde_json::to_value(&request).map_err(|e| Error::Internal(e.to_string()))?;
    let value = forward_json(&state.http, handle.model.process.port, "/v1/rerank", body, name).await?;
    Ok(Json(value))
}
