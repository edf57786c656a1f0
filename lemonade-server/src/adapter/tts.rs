//! TTS family adapter (§4.5).
//!
//! Exposes `audio/speech`, returning an audio container (mp3 by
//! default) the router passes straight back to the client with the
//! matching content type.

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

    spawn_process(cmd, Family::Tts, port, entry.id.clone(), telemetry).await
}

pub async fn synthesize(
    http: &reqwest::Client,
    port: u16,
    input: &str,
    response_format: &str,
) -> Result<Vec<u8>> {
    let body = serde_json::json!({ "input": input, "response_format": response_format });
    let resp = http
        .post(format!("{}/v1/audio/speech", base_url(port)))
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::UpstreamFailed(format!("tts backend {status}: {text}")));
    }
    Ok(resp.bytes().await.map_err(Error::from)?.to_vec())
}
