//! Wire types for the Ollama-compatible translation layer (§4.7).
//!
//! These are the shapes Ollama clients expect; the router fills them in
//! from the OpenAI-style request/response types and re-dispatches to the
//! same backends used by the native API.

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaVersionResponse {
    pub version: String,
}

impl Default for OllamaVersionResponse {
    fn default() -> Self {
        Self {
            version: "0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: Option<OllamaOptions>,
}

impl OllamaChatRequest {
    pub fn wants_stream(&self) -> bool {
        self.stream.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaOptions {
    #[serde(default)]
    pub num_predict: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatResponse {
    pub model: String,
    pub created_at: String,
    pub message: OllamaResponseMessage,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaResponseMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaGenerateRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub options: Option<OllamaOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaGenerateResponse {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaTagsResponse {
    pub models: Vec<OllamaModelTag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaModelTag {
    pub name: String,
    pub model: String,
    pub modified_at: String,
    pub size: u64,
    pub digest: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaShowRequest {
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaShowResponse {
    pub modelfile: String,
    pub parameters: String,
    pub template: String,
    pub details: OllamaShowDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaShowDetails {
    pub format: String,
    pub family: String,
    pub parameter_size: String,
    pub quantization_level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaPsResponse {
    pub models: Vec<OllamaPsEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaPsEntry {
    pub name: String,
    pub model: String,
    pub size: u64,
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_defaults_to_zero() {
        assert_eq!(OllamaVersionResponse::default().version, "0.0.0");
    }

    #[test]
    fn chat_request_streams_by_default() {
        let req: OllamaChatRequest =
            serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!(req.wants_stream());
    }

    #[test]
    fn chat_request_can_disable_streaming() {
        let req: OllamaChatRequest =
            serde_json::from_str(r#"{"model":"m","messages":[],"stream":false}"#).unwrap();
        assert!(!req.wants_stream());
    }
}
