//! Ollama-compatible translation layer (§4.7).
//!
//! Re-dispatches onto the same ModelPool/adapter machinery as the native
//! OpenAI-style surface and reshapes the response into Ollama's envelope.
//! `/api/create`, `/api/copy`, `/api/push` have no equivalent here and
//! return 501.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use lemonade_common::{
    ChatMessage, OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest, OllamaGenerateResponse,
    OllamaModelTag, OllamaOptions, OllamaPsEntry, OllamaPsResponse, OllamaResponseMessage,
    OllamaShowDetails, OllamaShowRequest, OllamaShowResponse, OllamaTagsResponse, OllamaVersionResponse,
};

use crate::adapter::forward_json;
use crate::catalog::ListFilter;
use crate::error::{Error, Result};
use crate::state::AppState;

/// Bare-path surface (`/api/version`, `/api/tags`, ...) that Ollama clients
/// expect unprefixed.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/version", get(version))
        .route("/api/tags", get(tags))
        .route("/api/show", post(show))
        .route("/api/ps", get(ps))
        .route("/api/chat", post(chat))
        .route("/api/generate", post(generate))
        .route("/api/create", post(not_implemented))
        .route("/api/copy", post(not_implemented))
        .route("/api/push", post(not_implemented))
}

/// The same surface again under `/api/v1/ollama/*`, for clients that talk
/// to this gateway's native prefix instead of bare Ollama paths.
pub fn v1_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ollama/version", get(version))
        .route("/ollama/tags", get(tags))
        .route("/ollama/show", post(show))
        .route("/ollama/ps", get(ps))
        .route("/ollama/chat", post(chat))
        .route("/ollama/generate", post(generate))
        .route("/ollama/create", post(not_implemented))
        .route("/ollama/copy", post(not_implemented))
        .route("/ollama/push", post(not_implemented))
}

async fn not_implemented() -> Error {
    Error::NotImplemented("this Ollama endpoint has no equivalent in this gateway".to_string())
}

async fn version() -> Json<OllamaVersionResponse> {
    Json(OllamaVersionResponse::default())
}

async fn tags(State(state): State<Arc<AppState>>) -> Json<OllamaTagsResponse> {
    let entries = state.catalog.list(&ListFilter::default(), Some(&state.weights)).await;
    Json(OllamaTagsResponse {
        models: entries
            .into_iter()
            .map(|e| OllamaModelTag {
                name: e.id.clone(),
                model: e.id,
                modified_at: String::new(),
                size: 0,
                digest: String::new(),
            })
            .collect(),
    })
}

async fn show(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OllamaShowRequest>,
) -> Result<Json<OllamaShowResponse>> {
    let entry = state.catalog.lookup(&request.model).await?;
    Ok(Json(OllamaShowResponse {
        modelfile: String::new(),
        parameters: String::new(),
        template: String::new(),
        details: OllamaShowDetails {
            format: "gguf".to_string(),
            family: entry.family.to_string(),
            parameter_size: String::new(),
            quantization_level: entry.quantization.unwrap_or_default(),
        },
    }))
}

/// Lists only the models this pool currently has resident, matching
/// Ollama's "running models" semantics.
async fn ps(State(state): State<Arc<AppState>>) -> Json<OllamaPsResponse> {
    let loaded = state.pool.list().await;
    Json(OllamaPsResponse {
        models: loaded
            .into_iter()
            .map(|m| OllamaPsEntry {
                name: m.name.clone(),
                model: m.name,
                size: 0,
                digest: String::new(),
            })
            .collect(),
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OllamaChatRequest>,
) -> Result<Json<OllamaChatResponse>> {
    let handle = state.pool.acquire(&request.model).await?;
    let body = serde_json::json!({
        "messages": request.messages,
        "max_tokens": request.options.as_ref().and_then(|o| o.num_predict),
        "temperature": request.options.as_ref().and_then(|o| o.temperature),
        "stream": false,
    });
    let value = forward_json(
        &state.http,
        handle.model.process.port,
        "/v1/chat/completions",
        body,
        &request.model,
    )
    .await?;

    let message: ChatMessage = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| serde_json::from_value(m.clone()).ok())
        .ok_or_else(|| Error::UpstreamFailed("backend returned no choices".to_string()))?;

    Ok(Json(OllamaChatResponse {
        model: request.model,
        created_at: chrono::Utc::now().to_rfc3339(),
        message: OllamaResponseMessage {
            role: message.role,
            content: message.content.unwrap_or_default(),
        },
        done: true,
        prompt_eval_count: usage_field(&value, "prompt_tokens"),
        eval_count: usage_field(&value, "completion_tokens"),
    }))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OllamaGenerateRequest>,
) -> Result<Json<OllamaGenerateResponse>> {
    let handle = state.pool.acquire(&request.model).await?;
    let body = serde_json::json!({
        "prompt": request.prompt,
        "max_tokens": request.options.as_ref().and_then(|o: &OllamaOptions| o.num_predict),
        "temperature": request.options.as_ref().and_then(|o| o.temperature),
        "stream": false,
    });
    let value = forward_json(
        &state.http,
        handle.model.process.port,
        "/v1/completions",
        body,
        &request.model,
    )
    .await?;

    let text = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Json(OllamaGenerateResponse {
        model: request.model,
        created_at: chrono::Utc::now().to_rfc3339(),
        response: text,
        done: true,
    }))
}

fn usage_field(value: &serde_json::Value, field: &str) -> Option<u32> {
    value.get("usage")?.get(field)?.as_u64().map(|n| n as u32)
}
