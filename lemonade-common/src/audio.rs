//! Audio transcription/speech wire types (whisper/tts families).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub input: String,
    #[serde(default = "default_response_format")]
    pub response_format: String,
}

fn default_response_format() -> String {
    "mp3".to_string()
}

impl SpeechRequest {
    pub fn content_type(&self) -> &'static str {
        match self.response_format.as_str() {
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "opus" => "audio/opus",
            "flac" => "audio/flac",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_response_format_is_mp3() {
        let req: SpeechRequest = serde_json::from_str(r#"{"input":"hi"}"#).unwrap();
        assert_eq!(req.response_format, "mp3");
        assert_eq!(req.content_type(), "audio/mpeg");
    }

    #[test]
    fn unknown_format_falls_back_to_octet_stream() {
        let req = SpeechRequest {
            model: None,
            input: "hi".to_string(),
            response_format: "ogg-vorbis-legacy".to_string(),
        };
        assert_eq!(req.content_type(), "application/octet-stream");
    }
}
