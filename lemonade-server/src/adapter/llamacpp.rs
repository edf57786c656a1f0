//! LLAMACPP family adapter (§4.5).
//!
//! Tries a GPU launch first; if the process exits or fails its health
//! check before `WaitReady` succeeds, the pool retries once with CPU
//! flags (§F of `SPEC_FULL.md`, grounded in `tools/server/llamacpp.py`
//! of the Python original). `LEMONADE_LLAMACPP_NO_FALLBACK` disables
//! the retry so a GPU failure surfaces directly.

use std::path::Path;
use std::sync::Arc;

use lemonade_common::{Family, Label};
use tokio::process::Command;

use crate::catalog::ModelEntry;
use crate::config::Config;
use crate::error::Result;
use crate::telemetry::TelemetryAggregator;

use super::{spawn_process, BackendProcess};

/// Builds the llama-server command line for `entry`, per §4.5: `-m`,
/// `--port`, `--jinja`, `--ctx-size`, `-ngl` (99 for GPU, 0 for CPU),
/// `--embeddings`/`--reranking` when the entry advertises those labels,
/// and `--mmproj`/`--no-mmproj-offload` for a secondary artifact on CPU.
pub async fn launch(
    entry: &ModelEntry,
    port: u16,
    binary: &Path,
    weights: &Path,
    config: &Config,
    gpu: bool,
    telemetry: Arc<TelemetryAggregator>,
) -> Result<BackendProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("-m")
        .arg(weights)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--jinja")
        .arg("--ctx-size")
        .arg(entry.context_length.unwrap_or(config.llamacpp.ctx_size).to_string())
        .arg("-ngl")
        .arg(if gpu { "99" } else { "0" });

    if entry.has_label(Label::Embeddings) {
        cmd.arg("--embeddings");
    }
    if entry.has_label(Label::Reranking) {
        cmd.arg("--reranking");
    }
    if let Some(secondary) = &entry.secondary_artifact {
        cmd.arg("--mmproj").arg(secondary);
        if !gpu {
            cmd.arg("--no-mmproj-offload");
        }
    }
    for arg in &config.llamacpp.extra_args {
        cmd.arg(arg);
    }

    spawn_process(cmd, Family::LlamaCpp, port, entry.id.clone(), telemetry).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelEntry;

    fn entry() -> ModelEntry {
        ModelEntry {
            id: "test".to_string(),
            family: Family::LlamaCpp,
            checkpoint: "org/repo".to_string(),
            secondary_artifact: None,
            recipe: None,
            labels: vec![Label::Embeddings],
            context_length: Some(2048),
            image_defaults: None,
            quantization: None,
        }
    }

    #[tokio::test]
    async fn launch_fails_cleanly_for_missing_binary() {
        let result = launch(
            &entry(),
            9999,
            Path::new("/nonexistent/llama-server"),
            Path::new("/nonexistent/model.gguf"),
            &Config::default(),
            true,
            Arc::new(TelemetryAggregator::new()),
        )
        .await;
        assert!(result.is_err());
    }
}
