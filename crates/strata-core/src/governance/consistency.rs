//! Self-consistency (Phase 12)

use std::sync::Arc;

use serde_json::json;

use crate::cognition::{MetacogEvent, MetacogObserver};
use crate::config::ConsistencyConfig;
use crate::error::CoreResult;
use crate::storage::Storage;

/// Windowed stability of self-trust
pub struct Consistency {
    store: Arc<Storage>,
    run_id: i64,
    config: ConsistencyConfig,
    last: Option<f64>,
}

impl Consistency {
    pub fn new(store: Arc<Storage>, run_id: i64, config: ConsistencyConfig) -> Self {
        Self {
            store,
            run_id,
            config,
            last: None,
        }
    }

    /// Latest computed score
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// `1 - stdev(self_trust)` over the last `window` metacognition rows
    pub fn compute(&mut self, now_ms: i64) -> CoreResult<f64> {
        let window = self.config.window.max(1) as usize;
        let rows = self.store.get_recent_metacognition(self.run_id, window)?;
        let trusts: Vec<f64> = rows.iter().map(|r| r.self_trust).collect();
        let stdev = population_stdev(&trusts);
        let score = (1.0 - stdev).clamp(0.0, 1.0);

        let driver = json!({
            "window": window,
            "stdev": stdev,
            "latest_trust": trusts.first(),
        })
        .to_string();
        self.store
            .insert_consistency(self.run_id, now_ms, score, trusts.len() as i64, &driver)?;
        self.last = Some(score);
        tracing::debug!(run_id = self.run_id, score, samples = trusts.len(), "self consistency");
        Ok(score)
    }
}

impl MetacogObserver for Consistency {
    fn stage(&self) -> &'static str {
        "phase12"
    }

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()> {
        self.compute(event.ts_ms).map(|_| ())
    }
}

/// Population standard deviation, zero for fewer than two values
pub fn population_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}
