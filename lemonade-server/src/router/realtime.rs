//! Realtime streaming transcription WebSocket (§4.7).
//!
//! Served on the second port (`ws_port`), mirroring the split between the
//! gateway's runner-registration socket and its HTTP API in the codebase
//! this grew from. Each connection starts `AwaitingUpdate`; a
//! `session.update` event moves it to `Streaming`, where audio chunks
//! accumulate until a `input_audio_buffer.commit` drains the buffer
//! through the transcription backend and reports back.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use base64::Engine;
use lemonade_common::{ClientEvent, RealtimeError, ServerEvent, SessionConfig, SessionSnapshot};
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct RealtimeQuery {
    #[allow(dead_code)]
    intent: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/v1/realtime", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(_query): Query<RealtimeQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

/// Amplitude threshold (16-bit PCM full scale is 32768) above which the
/// buffer is considered to contain speech, loosely mirroring a simple
/// energy-based VAD.
const VAD_THRESHOLD: i32 = 500;

enum SessionState {
    AwaitingUpdate,
    Streaming { model: String, language: Option<String> },
}

async fn handle_session(mut socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4().to_string();
    let mut buffer: Vec<u8> = Vec::new();
    let mut speaking = false;
    let mut session_state = SessionState::AwaitingUpdate;

    let created = ServerEvent::SessionCreated {
        session: SessionSnapshot {
            id: session_id.clone(),
            input_audio_format: "pcm16".to_string(),
            model: String::new(),
        },
    };
    if send_event(&mut socket, &created).await.is_err() {
        return;
    }

    loop {
        let Some(Ok(message)) = socket.recv().await else {
            break;
        };
        let Message::Text(text) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };

        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(err) => {
                let _ = send_event(
                    &mut socket,
                    &ServerEvent::Error {
                        error: RealtimeError {
                            message: err.to_string(),
                            code: "parse_error".to_string(),
                        },
                    },
                )
                .await;
                continue;
            }
        };

        let streaming = match &session_state {
            SessionState::Streaming { model, language } => Some((model.clone(), language.clone())),
            _ => None,
        };

        match (event, streaming) {
            (ClientEvent::SessionUpdate { session }, None) => {
                match start_session(&state, &session, &session_id, &mut socket).await {
                    Ok((model, language)) => {
                        session_state = SessionState::Streaming { model, language };
                    }
                    Err(err) => {
                        let _ = send_event(
                            &mut socket,
                            &ServerEvent::Error {
                                error: RealtimeError {
                                    message: err.to_string(),
                                    code: "session_update_failed".to_string(),
                                },
                            },
                        )
                        .await;
                    }
                }
            }
            (ClientEvent::InputAudioBufferAppend { audio }, Some(_)) => {
                match base64::engine::general_purpose::STANDARD.decode(&audio) {
                    Ok(bytes) => {
                        let was_speaking = speaking;
                        speaking = rms_i16(&bytes) > VAD_THRESHOLD;
                        buffer.extend_from_slice(&bytes);
                        if speaking && !was_speaking {
                            let _ = send_event(&mut socket, &ServerEvent::SpeechStarted).await;
                        } else if !speaking && was_speaking {
                            let _ = send_event(&mut socket, &ServerEvent::SpeechStopped).await;
                        }
                    }
                    Err(err) => {
                        let _ = send_event(
                            &mut socket,
                            &ServerEvent::Error {
                                error: RealtimeError {
                                    message: format!("invalid base64 audio: {err}"),
                                    code: "bad_audio".to_string(),
                                },
                            },
                        )
                        .await;
                    }
                }
            }
            (ClientEvent::InputAudioBufferCommit, Some((model, language))) => {
                match commit_buffer(&state, &model, language.as_deref(), &buffer).await {
                    Ok(transcript) => {
                        let _ = send_event(
                            &mut socket,
                            &ServerEvent::TranscriptionCompleted { transcript },
                        )
                        .await;
                    }
                    Err(err) => {
                        let _ = send_event(
                            &mut socket,
                            &ServerEvent::Error {
                                error: RealtimeError {
                                    message: err.to_string(),
                                    code: "transcription_failed".to_string(),
                                },
                            },
                        )
                        .await;
                    }
                }
                buffer.clear();
                speaking = false;
            }
            (_, _) => {
                let _ = send_event(
                    &mut socket,
                    &ServerEvent::Error {
                        error: RealtimeError {
                            message: "message not valid in current session state".to_string(),
                            code: "invalid_state".to_string(),
                        },
                    },
                )
                .await;
            }
        }
    }
}

async fn start_session(
    state: &Arc<AppState>,
    session: &SessionConfig,
    session_id: &str,
    socket: &mut WebSocket,
) -> crate::error::Result<(String, Option<String>)> {
    let model = session
        .model
        .clone()
        .ok_or_else(|| crate::error::Error::BadRequest("session.model is required".to_string()))?;
    // Warm the model so the first commit doesn't pay cold-start latency.
    let _handle = state.pool.acquire(&model).await?;

    let updated = ServerEvent::SessionUpdated {
        session: SessionSnapshot {
            id: session_id.to_string(),
            input_audio_format: session
                .input_audio_format
                .clone()
                .unwrap_or_else(|| "pcm16".to_string()),
            model: model.clone(),
        },
    };
    let _ = send_event(socket, &updated).await;
    Ok((model, session.language.clone()))
}

async fn commit_buffer(
    state: &Arc<AppState>,
    model: &str,
    language: Option<&str>,
    buffer: &[u8],
) -> crate::error::Result<String> {
    let handle = state.pool.acquire(model).await?;
    let wav = pcm16_to_wav(buffer, 16_000, 1);
    crate::adapter::whisper::transcribe(&state.http, handle.model.process.port, "buffer.wav", wav, language).await
}

/// Wraps raw little-endian PCM16 samples in a minimal WAV container so
/// the whisper backend's multipart endpoint can read it as a file.
fn pcm16_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;
    let data_len = pcm.len() as u32;
    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

fn rms_i16(bytes: &[u8]) -> i32 {
    if bytes.len() < 2 {
        return 0;
    }
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    if samples.is_empty() {
        return 0;
    }
    let sum_sq: i64 = samples.iter().map(|s| (*s as i64) * (*s as i64)).sum();
    ((sum_sq / samples.len() as i64) as f64).sqrt() as i32
}

async fn send_event(
    socket: &mut WebSocket,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).expect("ServerEvent always serializes");
    socket.send(Message::Text(json)).await
}
