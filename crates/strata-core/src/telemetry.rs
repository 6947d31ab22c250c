//! JSON-lines telemetry sink
//!
//! Optional convenience stream of `{version, phase, event, time, ...}` objects.
//! Nothing persisted depends on it; write failures are logged and dropped.

use std::io::Write;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::TelemetryConfig;
use crate::TELEMETRY_LINE_VERSION;

#[derive(Serialize)]
struct Line<'a> {
    version: u32,
    phase: &'a str,
    event: &'a str,
    time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    episode_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<i64>,
    payload: &'a Value,
}

struct SinkState {
    out: Box<dyn Write + Send>,
    seen: u64,
}

/// Filtered, sampled line writer
pub struct TelemetrySink {
    state: Option<Mutex<SinkState>>,
    allowlist: Vec<String>,
    sample_every: u64,
}

impl TelemetrySink {
    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self {
            state: None,
            allowlist: Vec::new(),
            sample_every: 1,
        }
    }

    /// Sink writing to `out` with the configured filter
    pub fn new(out: Box<dyn Write + Send>, config: &TelemetryConfig) -> Self {
        Self {
            state: Some(Mutex::new(SinkState { out, seen: 0 })),
            allowlist: config.allowlist.clone(),
            sample_every: config.sample_every.max(1),
        }
    }

    /// Sink on stdout, or disabled when the config says so
    pub fn from_config(config: &TelemetryConfig) -> Self {
        if config.enabled {
            Self::new(Box::new(std::io::stdout()), config)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.is_some()
    }

    fn allowed(&self, phase: &str, event: &str) -> bool {
        self.allowlist.is_empty()
            || self.allowlist.iter().any(|entry| match entry.split_once(':') {
                Some((p, e)) => p == phase && (e == event || e == "*"),
                None => entry == phase,
            })
    }

    /// Emit one line if it passes the allowlist and the sampler
    pub fn emit(&self, phase: &str, event: &str, episode_index: Option<i64>, step: Option<i64>, payload: &Value) {
        let Some(state) = &self.state else {
            return;
        };
        if !self.allowed(phase, event) {
            return;
        }
        let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.seen += 1;
        if (state.seen - 1) % self.sample_every != 0 {
            return;
        }

        let line = Line {
            version: TELEMETRY_LINE_VERSION,
            phase,
            event,
            time: Utc::now().to_rfc3339(),
            episode_index,
            step,
            payload,
        };
        let result = serde_json::to_string(&line)
            .map_err(std::io::Error::other)
            .and_then(|text| writeln!(state.out, "{}", text));
        if let Err(e) = result {
            tracing::warn!(phase, event, "telemetry line dropped: {}", e);
        }
    }
}
