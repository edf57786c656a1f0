//! Image generation/edit/variation wire types (stable-diffusion family).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub n: Option<u32>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub steps: Option<u32>,
    #[serde(default)]
    pub guidance_scale: Option<f32>,
    #[serde(default)]
    pub response_format: Option<String>,
}

/// Resolved parameters after applying a ModelEntry's image defaults to
/// whatever the request left unset.
#[derive(Debug, Clone, Copy)]
pub struct ImageParams {
    pub steps: u32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
}

impl ImageParams {
    pub fn parse_size(size: &str) -> Option<(u32, u32)> {
        let (w, h) = size.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub created: i64,
    pub data: Vec<ImageData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_size() {
        assert_eq!(ImageParams::parse_size("256x512"), Some((256, 512)));
    }

    #[test]
    fn rejects_malformed_size() {
        assert_eq!(ImageParams::parse_size("256"), None);
        assert_eq!(ImageParams::parse_size("widexhigh"), None);
    }
}
