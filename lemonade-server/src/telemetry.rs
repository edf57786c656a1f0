//! TelemetryAggregator (§4.8): per-request inference metrics.
//!
//! Backends emit timing information as free-form lines on stdout/stderr.
//! Parsing is best-effort: lines that don't match a known pattern are
//! ignored rather than treated as errors, since a backend upgrade that
//! changes its log format shouldn't take the gateway down with it.

use std::collections::HashMap;
use std::sync::Mutex;

use lemonade_common::Family;
use regex::Regex;
use serde::Serialize;

/// A single request's worth of accumulated timing data. Fields are
/// optional because not every family's backend reports every metric
/// (FLM, for instance, reports essentially nothing yet).
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetrySnapshot {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub time_to_first_token: Option<f64>,
    pub tokens_per_second: Option<f64>,
    pub prompt_eval_time: Option<f64>,
    pub eval_time: Option<f64>,
    /// Per-decode-step timings, seconds, in emission order. The llama.cpp
    /// log lines this is parsed from don't carry one, so this stays empty
    /// for that family; it exists for adapters that can report it.
    pub decode_token_times: Vec<f64>,
}

impl TelemetrySnapshot {
    fn merge_prompt_eval(&mut self, ms: f64, tokens: u32, _tokens_per_second: f64) {
        self.prompt_eval_time = Some(ms / 1000.0);
        self.input_tokens = Some(tokens);
        self.time_to_first_token = Some(ms / 1000.0);
    }

    fn merge_eval(&mut self, ms: f64, tokens: u32, tokens_per_second: f64) {
        self.eval_time = Some(ms / 1000.0);
        self.output_tokens = Some(tokens);
        self.tokens_per_second = Some(tokens_per_second);
    }
}

struct LlamaCppPatterns {
    prompt_eval: Regex,
    eval: Regex,
}

impl LlamaCppPatterns {
    fn new() -> Self {
        Self {
            prompt_eval: Regex::new(
                r"prompt eval time\s*=\s*([\d.]+)\s*ms\s*/\s*(\d+)\s*tokens.*?([\d.]+)\s*tokens per second",
            )
            .expect("static pattern"),
            eval: Regex::new(
                r"eval time\s*=\s*([\d.]+)\s*ms\s*/\s*(\d+)\s*tokens.*?([\d.]+)\s*tokens per second",
            )
            .expect("static pattern"),
        }
    }
}

/// Parses one line of backend log output into (or onto) a snapshot.
/// Returns `true` if the line matched something recognized.
pub fn parse_line(family: Family, line: &str, snapshot: &mut TelemetrySnapshot) -> bool {
    match family {
        Family::LlamaCpp | Family::StableDiffusion | Family::Whisper => {
            parse_llamacpp_style(line, snapshot)
        }
        Family::Flm | Family::Tts => false,
    }
}

fn parse_llamacpp_style(line: &str, snapshot: &mut TelemetrySnapshot) -> bool {
    thread_local! {
        static PATTERNS: LlamaCppPatterns = LlamaCppPatterns::new();
    }
    PATTERNS.with(|patterns| {
        // "eval time" also matches inside "prompt eval time", so the
        // prompt-specific pattern must be tried first.
        if let Some(caps) = patterns.prompt_eval.captures(line) {
            let (Ok(ms), Ok(tokens), Ok(tps)) = (
                caps[1].parse::<f64>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<f64>(),
            ) else {
                return false;
            };
            snapshot.merge_prompt_eval(ms, tokens, tps);
            return true;
        }
        if let Some(caps) = patterns.eval.captures(line) {
            let (Ok(ms), Ok(tokens), Ok(tps)) = (
                caps[1].parse::<f64>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<f64>(),
            ) else {
                return false;
            };
            snapshot.merge_eval(ms, tokens, tps);
            return true;
        }
        false
    })
}

/// Keeps the most recent snapshot per loaded model so `/api/v1/stats` can
/// answer without re-reading backend logs.
pub struct TelemetryAggregator {
    latest: Mutex<HashMap<String, TelemetrySnapshot>>,
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Feeds one line of backend output for `model_id`, updating its
    /// running snapshot in place if the line carries new information.
    /// Returns whether the line matched a known pattern.
    pub fn ingest_line(&self, model_id: &str, family: Family, line: &str) -> bool {
        let mut latest = self.latest.lock().expect("telemetry mutex poisoned");
        let snapshot = latest.entry(model_id.to_string()).or_default();
        parse_line(family, line, snapshot)
    }

    pub fn snapshot(&self, model_id: &str) -> Option<TelemetrySnapshot> {
        self.latest
            .lock()
            .expect("telemetry mutex poisoned")
            .get(model_id)
            .cloned()
    }

    pub fn all(&self) -> HashMap<String, TelemetrySnapshot> {
        self.latest.lock().expect("telemetry mutex poisoned").clone()
    }

    pub fn clear(&self, model_id: &str) {
        self.latest.lock().expect("telemetry mutex poisoned").remove(model_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prompt_eval_line() {
        let mut snapshot = TelemetrySnapshot::default();
        let line = "prompt eval time =     123.45 ms /    17 tokens (    7.26 ms per token,   137.77 tokens per second)";
        assert!(parse_line(Family::LlamaCpp, line, &mut snapshot));
        assert_eq!(snapshot.input_tokens, Some(17));
        assert_eq!(snapshot.time_to_first_token, Some(0.12345));
    }

    #[test]
    fn parses_generation_eval_line() {
        let mut snapshot = TelemetrySnapshot::default();
        let line = "eval time =     987.65 ms /    42 tokens (   23.51 ms per token,    42.53 tokens per second)";
        assert!(parse_line(Family::LlamaCpp, line, &mut snapshot));
        assert_eq!(snapshot.output_tokens, Some(42));
        assert_eq!(snapshot.tokens_per_second, Some(42.53));
    }

    #[test]
    fn prompt_and_eval_lines_both_update_same_snapshot() {
        let mut snapshot = TelemetrySnapshot::default();
        parse_line(
            Family::LlamaCpp,
            "prompt eval time =     100.00 ms /    10 tokens (    0.00 ms per token,   100.00 tokens per second)",
            &mut snapshot,
        );
        parse_line(
            Family::LlamaCpp,
            "eval time =     200.00 ms /    20 tokens (    0.00 ms per token,   100.00 tokens per second)",
            &mut snapshot,
        );
        assert_eq!(snapshot.input_tokens, Some(10));
        assert_eq!(snapshot.output_tokens, Some(20));
    }

    #[test]
    fn unrecognized_line_is_ignored_not_an_error() {
        let mut snapshot = TelemetrySnapshot::default();
        assert!(!parse_line(Family::LlamaCpp, "ggml_vulkan: Found 1 Vulkan devices:", &mut snapshot));
        assert!(snapshot.input_tokens.is_none());
    }

    #[test]
    fn flm_never_matches_anything() {
        let mut snapshot = TelemetrySnapshot::default();
        assert!(!parse_line(Family::Flm, "eval time = 1.0 ms / 1 tokens (1.0 ms per token, 1.0 tokens per second)", &mut snapshot));
    }

    #[test]
    fn aggregator_tracks_latest_snapshot_per_model() {
        let aggregator = TelemetryAggregator::new();
        aggregator.ingest_line(
            "Qwen3-4B-GGUF",
            Family::LlamaCpp,
            "eval time =     200.00 ms /    20 tokens (    0.00 ms per token,   100.00 tokens per second)",
        );
        let snapshot = aggregator.snapshot("Qwen3-4B-GGUF").unwrap();
        assert_eq!(snapshot.output_tokens, Some(20));
        assert!(aggregator.snapshot("missing-model").is_none());
    }
}
