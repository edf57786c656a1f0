//! STABLE_DIFFUSION family adapter (§4.5).
//!
//! Exposes `images/generations`, `images/edits`, `images/variations`
//! upstream; the router applies the entry's `image_defaults` for any
//! field the request leaves unset before forwarding.

use std::path::Path;
use std::sync::Arc;

use lemonade_common::{Family, ImageParams};
use tokio::process::Command;

use crate::catalog::{ImageDefaults, ModelEntry};
use crate::config::Config;
use crate::error::Result;
use crate::telemetry::TelemetryAggregator;

use super::{spawn_process, BackendProcess};

pub async fn launch(
    entry: &ModelEntry,
    port: u16,
    binary: &Path,
    weights: &Path,
    config: &Config,
    telemetry: Arc<TelemetryAggregator>,
) -> Result<BackendProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("-m")
        .arg(weights)
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string());

    if config.sdcpp.save_images {
        cmd.arg("--save-images");
        let dir = config.sdcpp.images_dir.clone().unwrap_or_else(|| config.cache.cache_dir().join("images"));
        cmd.arg("--images-dir").arg(dir);
    }

    spawn_process(cmd, Family::StableDiffusion, port, entry.id.clone(), telemetry).await
}

/// Resolves request-supplied image parameters against the entry's
/// declared defaults, per §4.5 ("uses entry's image defaults when the
/// request omits them").
pub fn resolve_params(
    defaults: Option<&ImageDefaults>,
    steps: Option<u32>,
    guidance_scale: Option<f32>,
    size: Option<&str>,
) -> ImageParams {
    let (default_w, default_h, default_steps, default_cfg) = match defaults {
        Some(d) => (d.width, d.height, d.steps, d.guidance_scale),
        None => (512, 512, 20, 7.5),
    };
    let (width, height) = size
        .and_then(ImageParams::parse_size)
        .unwrap_or((default_w, default_h));
    ImageParams {
        steps: steps.unwrap_or(default_steps),
        guidance_scale: guidance_scale.unwrap_or(default_cfg),
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_values_override_defaults() {
        let defaults = ImageDefaults {
            steps: 4,
            guidance_scale: 0.0,
            width: 512,
            height: 512,
        };
        let params = resolve_params(Some(&defaults), Some(30), None, Some("256x256"));
        assert_eq!(params.steps, 30);
        assert_eq!(params.guidance_scale, 0.0);
        assert_eq!(params.width, 256);
        assert_eq!(params.height, 256);
    }

    #[test]
    fn missing_request_values_fall_back_to_defaults() {
        let defaults = ImageDefaults {
            steps: 4,
            guidance_scale: 1.5,
            width: 512,
            height: 512,
        };
        let params = resolve_params(Some(&defaults), None, None, None);
        assert_eq!(params.steps, 4);
        assert_eq!(params.guidance_scale, 1.5);
        assert_eq!(params.width, 512);
    }

    #[test]
    fn no_entry_defaults_uses_hardcoded_fallback() {
        let params = resolve_params(None, None, None, None);
        assert_eq!(params.width, 512);
        assert_eq!(params.steps, 20);
    }
}
