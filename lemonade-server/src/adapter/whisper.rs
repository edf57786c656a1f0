//! WHISPER family adapter (§4.5).
//!
//! Exposes `audio/transcriptions` over HTTP and, for the realtime
//! surface (§4.7), a direct in-process transcription call the
//! WebSocket handler uses once per committed audio buffer.

use std::path::Path;
use std::sync::Arc;

use lemonade_common::Family;
use tokio::process::Command;

use crate::catalog::ModelEntry;
use crate::error::{Error, Result};
use crate::telemetry::TelemetryAggregator;

use super::{base_url, spawn_process, BackendProcess};

pub async fn launch(
    entry: &ModelEntry,
    port: u16,
    binary: &Path,
    weights: &Path,
    telemetry: Arc<TelemetryAggregator>,
) -> Result<BackendProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("-m")
        .arg(weights)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string());

    spawn_process(cmd, Family::Whisper, port, entry.id.clone(), telemetry).await
}

/// Forwards raw audio bytes to the backend's transcription endpoint,
/// used both by `POST /audio/transcriptions` and by the realtime
/// WebSocket's commit handler.
pub async fn transcribe(
    http: &reqwest::Client,
    port: u16,
    filename: &str,
    audio: Vec<u8>,
    language: Option<&str>,
) -> Result<String> {
    let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_string());
    let mut form = reqwest::multipart::Form::new().part("file", part);
    if let Some(language) = language {
        form = form.text("language", language.to_string());
    }

    let resp = http
        .post(format!("{}/v1/audio/transcriptions", base_url(port)))
        .multipart(form)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::UpstreamFailed(format!("whisper backend {status}: {body}")));
    }
    let body: serde_json::Value = resp.json().await.map_err(|e| Error::UpstreamFailed(e.to_string()))?;
    body.get("text")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::UpstreamFailed("transcription response missing 'text'".to_string()))
}
