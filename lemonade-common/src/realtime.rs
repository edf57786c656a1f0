//! Message types for the realtime transcription WebSocket surface (§4.7).
//!
//! The protocol is a small subset of the OpenAI realtime API: a client opens
//! a session, streams base64-encoded audio chunks, and receives transcript
//! deltas/completions back. Session configuration and audio framing are the
//! only pieces implemented; there is no model-to-model voice surface here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename = "transcription_session.update")]
    SessionUpdate { session: SessionConfig },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub input_audio_format: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename = "transcription_session.created")]
    SessionCreated { session: SessionSnapshot },
    #[serde(rename = "transcription_session.updated")]
    SessionUpdated { session: SessionSnapshot },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    TranscriptionDelta { delta: String },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },
    #[serde(rename = "error")]
    Error { error: RealtimeError },
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub input_audio_format: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeError {
    pub message: String,
    pub code: String,
}
