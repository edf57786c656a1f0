//! `POST /images/{generations,edits,variations}` (§4.5, §4.7).
//!
//! All three share the same stable-diffusion upstream shape; `edits` and
//! `variations` additionally carry an input image the backend consumes
//! the same way, so they're dispatched through the same handler.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use lemonade_common::{ImageData, ImageGenerationRequest, ImageResponse};

use crate::adapter::stable_diffusion::resolve_params;
use crate::error::{Error, Result};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/images/generations", post(generations))
        .route("/images/edits", post(generations))
        .route("/images/variations", post(generations))
}

async fn generations(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageGenerationRequest>,
) -> Result<Json<ImageResponse>> {
    let prompt = request
        .prompt
        .as_deref()
        .ok_or_else(|| Error::BadRequest("prompt is required".to_string()))?;
    let name = request
        .model
        .as_deref()
        .ok_or_else(|| Error::BadRequest("model is required".to_string()))?;

    let entry = state.catalog.lookup(name).await?;
    let params = resolve_params(
        entry.image_defaults.as_ref(),
        request.steps,
        request.guidance_scale,
        request.size.as_deref(),
    );

    let handle = state.pool.acquire(name).await?;
    let body = serde_json::json!({
        "prompt": prompt,
        "steps": params.steps,
        "guidance_scale": params.guidance_scale,
        "width": params.width,
        "height": params.height,
        "n": request.n.unwrap_or(1),
    });
    let value = crate::adapter::forward_json(
        &state.http,
        handle.model.process.port,
        "/v1/images/generations",
        body,
        name,
    )
    .await?;

    let images: Vec<ImageData> = value
        .get("data")
        .and_then(|d| d.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| ImageData {
                    b64_json: item.get("b64_json").and_then(|v| v.as_str()).map(String::from),
                    url: item.get("url").and_then(|v| v.as_str()).map(String::from),
                })
                .collect()
        })
        .unwrap_or_default();

    if images.is_empty() {
        return Err(Error::UpstreamFailed("backend returned no image data".to_string()));
    }

    Ok(Json(ImageResponse {
        created: chrono::Utc::now().timestamp(),
        data: images,
    }))
}
