//! `POST /audio/transcriptions`, `POST /audio/speech` (§4.7).

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use lemonade_common::{SpeechRequest, TranscriptionResponse};

use crate::adapter::{bytes_response, tts, whisper};
use crate::error::{Error, Result};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/audio/transcriptions", post(transcriptions))
        .route("/audio/speech", post(speech))
}

async fn transcriptions(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>> {
    let mut model: Option<String> = None;
    let mut language: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename = "audio.wav".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "model" => model = Some(field.text().await.map_err(|e| Error::BadRequest(e.to_string()))?),
            "language" => {
                language = Some(field.text().await.map_err(|e| Error::BadRequest(e.to_string()))?)
            }
            "file" => {
                filename = field.file_name().unwrap_or("audio.wav").to_string();
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| Error::BadRequest(e.to_string()))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let name = model.ok_or_else(|| Error::BadRequest("model is required".to_string()))?;
    let audio = file_bytes.ok_or_else(|| Error::BadRequest("file is required".to_string()))?;

    let handle = state.pool.acquire(&name).await?;
    let text = whisper::transcribe(
        &state.http,
        handle.model.process.port,
        &filename,
        audio,
        language.as_deref(),
    )
    .await?;
    Ok(Json(TranscriptionResponse { text }))
}

async fn speech(State(state): State<Arc<AppState>>, Json(request): Json<SpeechRequest>) -> Result<Response> {
    let name = request
        .model
        .as_deref()
        .ok_or_else(|| Error::BadRequest("model is required".to_string()))?;
    let handle = state.pool.acquire(name).await?;
    let bytes = tts::synthesize(
        &state.http,
        handle.model.process.port,
        &request.input,
        &request.response_format,
    )
    .await?;
    Ok(bytes_response(bytes, request.content_type()))
}
