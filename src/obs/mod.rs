//! Per-turn observability.
//!
//! Emits one JSONL event per retrieval turn, with sampling, redaction,
//! and daily file rotation. The first three queries of a process are
//! warm-up and are flagged in their events and excluded from latency
//! budget accounting. Observability failures are logged and swallowed -
//! they never break the product flow.

pub mod redaction;

pub use redaction::Redactor;

use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Fast-lane p95 retrieval budget, in milliseconds (target, not a hard
/// limit).
pub const FAST_P95_BUDGET_MS: f64 = 150.0;

/// Accurate-lane p95 retrieval budget, in milliseconds.
pub const ACCURATE_P95_BUDGET_MS: f64 = 500.0;

/// Number of warm-up queries per process.
pub const WARMUP_QUERIES: usize = 3;

/// Observability configuration, sourced from `RAG_OBS_*`.
#[derive(Debug, Clone)]
pub struct ObsConfig {
    /// Master switch (`RAG_OBS_ENABLED=1`).
    pub enabled: bool,
    /// Log directory (`RAG_OBS_DIR`, default `logs/rag`).
    pub dir: PathBuf,
    /// Fixed file name; empty means rotate daily (`RAG_OBS_FILE`).
    pub file: Option<String>,
    /// Sampling rate in `[0, 1]` (`RAG_OBS_SAMPLING`, default 1.0).
    pub sampling: f32,
    /// Replace the query with `{hash, len}` (`RAG_OBS_REDACT=1`).
    pub redact_query: bool,
    /// Query truncation length (`RAG_OBS_MAXLEN`, default 2000).
    pub max_len: usize,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs/rag"),
            file: None,
            sampling: 1.0,
            redact_query: false,
            max_len: 2000,
        }
    }
}

impl ObsConfig {
    /// Reads the configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("RAG_OBS_ENABLED").map(|v| v == "1").unwrap_or(false),
            dir: std::env::var("RAG_OBS_DIR").map_or(defaults.dir, PathBuf::from),
            file: std::env::var("RAG_OBS_FILE").ok().filter(|f| !f.is_empty()),
            sampling: std::env::var("RAG_OBS_SAMPLING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.sampling),
            redact_query: std::env::var("RAG_OBS_REDACT").map(|v| v == "1").unwrap_or(false),
            max_len: std::env::var("RAG_OBS_MAXLEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_len),
        }
    }
}

/// One citation into a retrieved source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited document identifier.
    pub source_id: String,
    /// Span start (byte offset into the answer text).
    pub span_start: usize,
    /// Span end.
    pub span_end: usize,
}

/// Stage latencies for one turn, in milliseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimings {
    /// Retrieval time.
    pub retrieve_ms: f64,
    /// Rerank time.
    pub rerank_ms: f64,
    /// Synthesis time.
    pub synth_ms: f64,
    /// End-to-end time.
    pub total_ms: f64,
}

/// Flags attached to one turn event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnFlags {
    /// Whether retrieval was enabled for this turn.
    pub rag_enabled: bool,
    /// Fallback slug when the turn degraded ("low_grounding",
    /// "no_citations", "flags.disabled").
    pub fallback: Option<String>,
    /// Whether this was a warm-up query.
    pub warmup: bool,
    /// Refusal slug, present only on refusals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

/// Everything an event needs from one turn.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    /// Request identifier (UUIDv4).
    pub request_id: String,
    /// Lane name ("fast", "accurate", "disabled").
    pub lane: String,
    /// The user query (redacted/truncated before writing).
    pub query: String,
    /// Result count.
    pub topk: usize,
    /// Expected stones, when the caller supplied them.
    pub stones: Option<Vec<String>>,
    /// Normalised grounding score, when computed.
    pub grounding_score: Option<f32>,
    /// Stage latencies.
    pub stages: StageTimings,
    /// Turn flags.
    pub flags: TurnFlags,
    /// Citations.
    pub citations: Vec<Citation>,
    /// Small optional debug payload.
    pub trace: Option<serde_json::Value>,
}

/// JSONL turn logger with sampling, redaction, rotation, and per-lane
/// latency tracking.
pub struct TurnLogger {
    config: ObsConfig,
    redactor: Redactor,
    /// Non-warm-up total latencies per lane.
    latencies: Mutex<HashMap<String, Vec<f64>>>,
}

impl TurnLogger {
    /// Creates a logger; the log directory is created lazily on first
    /// write.
    #[must_use]
    pub fn new(config: ObsConfig, redactor: Redactor) -> Self {
        Self {
            config,
            redactor,
            latencies: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a logger from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(ObsConfig::from_env(), Redactor::from_env())
    }

    /// Whether event emission is on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Logs one turn event. All failures are swallowed after a warning -
    /// observability never breaks the product flow.
    pub fn log_turn(&self, record: &TurnRecord) {
        if !self.config.enabled || !self.should_sample(&record.request_id) {
            return;
        }

        if let Err(err) = self.write_event(record) {
            tracing::warn!(%err, "failed to log turn event (never break the product flow)");
        }
    }

    /// Records a completed turn's total latency for budget tracking.
    /// Warm-up turns are excluded.
    pub fn record_latency(&self, lane: &str, total_ms: f64, warmup: bool) {
        if warmup {
            return;
        }
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.entry(lane.to_string()).or_default().push(total_ms);
        }
    }

    /// The p95 total latency for a lane, excluding warm-up turns.
    #[must_use]
    pub fn p95(&self, lane: &str) -> Option<f64> {
        let latencies = self.latencies.lock().ok()?;
        let samples = latencies.get(lane)?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted.get(idx.saturating_sub(1)).copied()
    }

    /// Whether a lane currently meets its p95 budget. `None` when there
    /// are no samples yet.
    #[must_use]
    pub fn within_budget(&self, lane: &str) -> Option<bool> {
        let budget = match lane {
            "fast" => FAST_P95_BUDGET_MS,
            "accurate" => ACCURATE_P95_BUDGET_MS,
            _ => return None,
        };
        self.p95(lane).map(|p95| p95 <= budget)
    }

    fn write_event(&self, record: &TurnRecord) -> crate::error::Result<()> {
        let query_value = if self.config.redact_query {
            serde_json::json!({
                "hash": hex_sha256(&record.query),
                "len": record.query.len(),
            })
        } else {
            serde_json::Value::String(self.redactor.redact_text(&truncate(
                &record.query,
                self.config.max_len,
            )))
        };

        let event = serde_json::json!({
            "ts": timestamp_seconds(),
            "request_id": record.request_id,
            "lane": record.lane,
            "topk": record.topk,
            "stones": record.stones,
            "grounding_score": record.grounding_score,
            "stages": record.stages,
            "flags": record.flags,
            "citations": record.citations,
            "trace": record.trace,
        });

        // Redact the full event, then attach the query: a hashed query
        // must survive the long-token scrubbing.
        let mut event = self.redactor.redact_value(event);
        if let Some(map) = event.as_object_mut() {
            map.insert("query".to_string(), query_value);
        }

        let path = self.log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        serde_json::to_writer(&mut file, &event)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Deterministic per-request sampling from the request id.
    fn should_sample(&self, request_id: &str) -> bool {
        if self.config.sampling >= 1.0 {
            return true;
        }
        if self.config.sampling <= 0.0 {
            return false;
        }

        let digest = Sha256::digest(request_id.as_bytes());
        let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        #[allow(clippy::cast_precision_loss)]
        let unit = bucket as f32 / u32::MAX as f32;
        unit < self.config.sampling
    }

    fn log_path(&self) -> PathBuf {
        match &self.config.file {
            Some(file) => self.config.dir.join(file),
            None => {
                let date_format = format_description!("[year]-[month]-[day]");
                let today = OffsetDateTime::now_utc()
                    .format(&date_format)
                    .unwrap_or_else(|_| "unknown-date".to_string());
                self.config.dir.join(format!("{today}.jsonl"))
            }
        }
    }
}

fn hex_sha256(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Seconds-precision UTC timestamp with a `Z` suffix.
#[must_use]
pub fn timestamp_seconds() -> String {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0)
        .unwrap_or(now)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(request_id: &str, query: &str) -> TurnRecord {
        TurnRecord {
            request_id: request_id.to_string(),
            lane: "fast".to_string(),
            query: query.to_string(),
            topk: 5,
            stones: Some(vec!["stewardship".to_string()]),
            grounding_score: Some(0.75),
            stages: StageTimings {
                retrieve_ms: 12.0,
                rerank_ms: 0.0,
                synth_ms: 3.0,
                total_ms: 15.0,
            },
            flags: TurnFlags {
                rag_enabled: true,
                fallback: None,
                warmup: false,
                refusal: None,
            },
            citations: vec![Citation {
                source_id: "clean_edges".to_string(),
                span_start: 0,
                span_end: 42,
            }],
            trace: None,
        }
    }

    fn logger(dir: &std::path::Path, redact_query: bool) -> TurnLogger {
        TurnLogger::new(
            ObsConfig {
                enabled: true,
                dir: dir.to_path_buf(),
                file: Some("turns.jsonl".to_string()),
                sampling: 1.0,
                redact_query,
                max_len: 2000,
            },
            Redactor::new(true),
        )
    }

    fn read_events(path: &std::path::Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_event_schema() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), false);
        logger.log_turn(&record("req-1", "how do I hold the boundary"));

        let events = read_events(&dir.path().join("turns.jsonl"));
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["request_id"], "req-1");
        assert_eq!(event["lane"], "fast");
        assert_eq!(event["topk"], 5);
        assert!(event["ts"].as_str().unwrap().ends_with('Z'));
        assert!(event["stages"]["total_ms"].as_f64().unwrap() > 0.0);
        assert_eq!(event["flags"]["rag_enabled"], true);
        assert_eq!(event["citations"][0]["source_id"], "clean_edges");
        assert_eq!(event["query"], "how do I hold the boundary");
    }

    #[test]
    fn test_query_hash_redaction() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), true);
        logger.log_turn(&record("req-2", "a sensitive query"));

        let events = read_events(&dir.path().join("turns.jsonl"));
        let query = &events[0]["query"];
        assert_eq!(query["len"], 17);
        assert_eq!(query["hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_event_strings_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(dir.path(), false);
        logger.log_turn(&record("req-3", "mail someone@example.com about this"));

        let events = read_events(&dir.path().join("turns.jsonl"));
        let query = events[0]["query"].as_str().unwrap();
        assert!(query.contains("[EMAIL_REDACTED]"));
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TurnLogger::new(
            ObsConfig {
                enabled: false,
                dir: dir.path().to_path_buf(),
                file: Some("turns.jsonl".to_string()),
                ..ObsConfig::default()
            },
            Redactor::new(false),
        );
        logger.log_turn(&record("req-4", "anything"));
        assert!(!dir.path().join("turns.jsonl").exists());
    }

    #[test]
    fn test_sampling_zero_drops_all() {
        let dir = tempfile::tempdir().unwrap();
        let logger = TurnLogger::new(
            ObsConfig {
                enabled: true,
                dir: dir.path().to_path_buf(),
                file: Some("turns.jsonl".to_string()),
                sampling: 0.0,
                ..ObsConfig::default()
            },
            Redactor::new(false),
        );
        logger.log_turn(&record("req-5", "anything"));
        assert!(!dir.path().join("turns.jsonl").exists());
    }

    #[test]
    fn test_sampling_is_deterministic_per_request() {
        let logger = TurnLogger::new(
            ObsConfig {
                sampling: 0.5,
                ..ObsConfig::default()
            },
            Redactor::new(false),
        );
        let first = logger.should_sample("stable-id");
        for _ in 0..10 {
            assert_eq!(logger.should_sample("stable-id"), first);
        }
    }

    #[test]
    fn test_p95_excludes_warmup() {
        let logger = logger(tempfile::tempdir().unwrap().path(), false);
        logger.record_latency("fast", 5000.0, true);
        assert!(logger.p95("fast").is_none());

        for ms in [10.0, 20.0, 30.0, 40.0, 50.0] {
            logger.record_latency("fast", ms, false);
        }
        let p95 = logger.p95("fast").unwrap();
        assert!((p95 - 50.0).abs() < f64::EPSILON);
        assert_eq!(logger.within_budget("fast"), Some(true));
    }

    #[test]
    fn test_budget_violation() {
        let logger = logger(tempfile::tempdir().unwrap().path(), false);
        logger.record_latency("accurate", 900.0, false);
        assert_eq!(logger.within_budget("accurate"), Some(false));
        assert_eq!(logger.within_budget("unknown"), None);
    }

    #[test]
    fn test_truncate_long_query() {
        let long = "x".repeat(3000);
        let out = truncate(&long, 100);
        assert!(out.len() <= 103);
        assert!(out.ends_with("..."));
    }
}
