//! BackendAdapter (§4.5): one implementation per runtime family.
//!
//! Dispatch is a tagged enum switch, not a trait object — per §9's
//! "Dynamic model dispatch" redesign item, the duck-typed adapters of the
//! source become an explicit match over `Family` here and in `pool.rs`.
//! Each family module owns its launch flags, health check path and
//! request-forwarding shape; this module holds what's common: the
//! spawned-process handle, the stdout/stderr reader task, and graceful
//! shutdown.

pub mod flm;
pub mod llamacpp;
pub mod stable_diffusion;
pub mod tts;
pub mod whisper;

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use lemonade_common::Family;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::telemetry::TelemetryAggregator;

/// A running backend subprocess (§3, BackendProcess).
///
/// Exactly one of these exists per `LoadedModel`. The port is only
/// released back to the allocator once the process has fully exited,
/// which `shutdown` waits for before returning.
pub struct BackendProcess {
    pub pid: u32,
    pub port: u16,
    pub family: Family,
    pub started_at: Instant,
    child: Mutex<Option<Child>>,
}

impl BackendProcess {
    pub async fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Sends SIGTERM (POSIX) and waits up to `timeout`; force-kills on
    /// timeout. Drains whatever is left of the stdout/stderr reader
    /// tasks by letting the pipes close naturally when the child exits.
    pub async fn shutdown(&self, timeout: Duration) {
        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(pid = self.pid, ?status, "backend process exited"),
            Ok(Err(err)) => tracing::warn!(pid = self.pid, %err, "error waiting for backend process"),
            Err(_) => {
                tracing::warn!(pid = self.pid, "backend process did not exit in time, killing");
                let _ = child.kill().await;
            }
        }
    }
}

/// Spawns `cmd`, wiring stdout/stderr into a line-oriented reader task
/// that feeds the telemetry aggregator (§4.8) and the debug log.
pub async fn spawn_process(
    mut cmd: Command,
    family: Family,
    port: u16,
    model_id: String,
    telemetry: Arc<TelemetryAggregator>,
) -> Result<BackendProcess> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::InstallFailed(format!("failed to spawn {family} backend: {e}")))?;
    let pid = child.id().unwrap_or(0);

    if let Some(stdout) = child.stdout.take() {
        spawn_log_reader(stdout, family, model_id.clone(), telemetry.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_log_reader(stderr, family, model_id, telemetry);
    }

    Ok(BackendProcess {
        pid,
        port,
        family,
        started_at: Instant::now(),
        child: Mutex::new(Some(child)),
    })
}

fn spawn_log_reader<R>(pipe: R, family: Family, model_id: String, telemetry: Arc<TelemetryAggregator>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let matched = telemetry.ingest_line(&model_id, family, &line);
                    if matched {
                        tracing::debug!(model = %model_id, %family, "{line}");
                    } else {
                        tracing::trace!(model = %model_id, %family, "{line}");
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(model = %model_id, %err, "backend log reader stopped");
                    break;
                }
            }
        }
    });
}

/// The URL `WaitReady` polls until it returns 200 (§4.5). FLM and the
/// llama.cpp-style families expose different readiness probes.
pub fn health_url(family: Family, port: u16) -> String {
    match family {
        Family::Flm => format!("http://127.0.0.1:{port}/api/tags"),
        _ => format!("http://127.0.0.1:{port}/health"),
    }
}

/// The base URL `Forward` issues upstream requests against.
pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

/// Polls `health_url` until it answers 200, the process exits, or
/// `timeout` elapses (§4.5 WaitReady).
pub async fn wait_ready(
    process: &BackendProcess,
    http: &reqwest::Client,
    timeout: Duration,
) -> Result<()> {
    let url = health_url(process.family, process.port);
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout {
            return Err(Error::UpstreamTimeout(format!(
                "{} did not become ready within {:?}",
                url, timeout
            )));
        }
        if !process.is_alive().await {
            return Err(Error::UpstreamFailed(format!(
                "backend process exited during startup (port {})",
                process.port
            )));
        }
        if let Ok(resp) = http.get(&url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Forwards a non-streaming OpenAI-compatible request body upstream,
/// overriding `model` to the resolved catalog id before sending so the
/// response always echoes the name the client asked for (§4.5 Forward).
pub async fn forward_json(
    http: &reqwest::Client,
    port: u16,
    path: &str,
    mut body: serde_json::Value,
    model_id: &str,
) -> Result<serde_json::Value> {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), serde_json::Value::String(model_id.to_string()));
    }
    let resp = http
        .post(format!("{}{path}", base_url(port)))
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::UpstreamFailed(format!("backend {status}: {text}")));
    }
    resp.json().await.map_err(Error::from)
}

/// Forwards a streaming request upstream and relays the byte stream back
/// to the client verbatim as `text/event-stream`, per §4.7's SSE framing.
pub async fn forward_stream(
    http: &reqwest::Client,
    port: u16,
    path: &str,
    mut body: serde_json::Value,
    model_id: &str,
) -> Result<Response> {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), serde_json::Value::String(model_id.to_string()));
    }
    let resp = http
        .post(format!("{}{path}", base_url(port)))
        .json(&body)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(Error::UpstreamFailed(format!("backend {status}: {text}")));
    }
    let stream = resp.bytes_stream();
    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
    Ok(response)
}

/// Wraps raw bytes with the given content type, for the TTS/image
/// response shapes that aren't JSON-envelope passthroughs.
pub fn bytes_response(bytes: Vec<u8>, content_type: &'static str) -> Response {
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llamacpp_health_url_uses_health_path() {
        assert_eq!(health_url(Family::LlamaCpp, 8001), "http://127.0.0.1:8001/health");
    }

    #[test]
    fn flm_health_url_uses_api_tags() {
        assert_eq!(health_url(Family::Flm, 8001), "http://127.0.0.1:8001/api/tags");
    }

    #[test]
    fn base_url_is_loopback() {
        assert_eq!(base_url(8001), "http://127.0.0.1:8001");
    }
}
