//! Lemonade Server Common Types
//!
//! Wire types shared by the gateway's router and (in principle) any client
//! tooling: OpenAI-compatible chat/completion/embeddings/rerank shapes,
//! image and audio shapes, and the backend family tag.

pub mod audio;
pub mod chat;
pub mod family;
pub mod image;
pub mod ollama;
pub mod realtime;

pub use audio::{SpeechRequest, TranscriptionResponse};
pub use chat::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice, CompletionRequest,
    EmbeddingData, EmbeddingsInput, EmbeddingsRequest, EmbeddingsResponse, RerankRequest,
    RerankResponse, RerankResult, ToolCall, ToolFunction, Usage,
};
pub use family::{Family, Label};
pub use image::{ImageData, ImageGenerationRequest, ImageParams, ImageResponse};
pub use ollama::{
    OllamaChatRequest, OllamaChatResponse, OllamaGenerateRequest, OllamaGenerateResponse,
    OllamaModelTag, OllamaOptions, OllamaPsEntry, OllamaPsResponse, OllamaResponseMessage,
    OllamaShowDetails, OllamaShowRequest, OllamaShowResponse, OllamaTagsResponse,
    OllamaVersionResponse,
};
pub use realtime::{ClientEvent, RealtimeError, ServerEvent, SessionConfig, SessionSnapshot};
