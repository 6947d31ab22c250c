//! Meta-reasoner (Phase 14)
//!
//! Flags degraded calibration from windowed means of self-trust and narrative
//! RMSE.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cognition::{MetacogEvent, MetacogObserver};
use crate::config::MetaReasonerConfig;
use crate::error::CoreResult;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStatus {
    Nominal,
    Degraded,
}

impl CalibrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Degraded => "degraded",
        }
    }
}

/// One windowed verdict
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetaVerdict {
    pub status: CalibrationStatus,
    pub mean_trust: f64,
    pub mean_rmse: f64,
    pub samples: usize,
}

pub struct MetaReasoner {
    store: Arc<Storage>,
    run_id: i64,
    config: MetaReasonerConfig,
    last: Option<MetaVerdict>,
}

impl MetaReasoner {
    pub fn new(store: Arc<Storage>, run_id: i64, config: MetaReasonerConfig) -> Self {
        Self {
            store,
            run_id,
            config,
            last: None,
        }
    }

    pub fn last(&self) -> Option<MetaVerdict> {
        self.last
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.last, Some(v) if v.status == CalibrationStatus::Degraded)
    }

    pub fn evaluate(&mut self, now_ms: i64) -> CoreResult<MetaVerdict> {
        let window = self.config.window.max(1) as usize;
        let rows = self.store.get_recent_metacognition(self.run_id, window)?;
        let (mean_trust, mean_rmse) = if rows.is_empty() {
            (0.5, 0.0)
        } else {
            let n = rows.len() as f64;
            (
                rows.iter().map(|r| r.self_trust).sum::<f64>() / n,
                rows.iter().map(|r| r.narrative_rmse).sum::<f64>() / n,
            )
        };

        let status = if mean_trust < self.config.trust_degraded || mean_rmse > self.config.rmse_degraded {
            CalibrationStatus::Degraded
        } else {
            CalibrationStatus::Nominal
        };
        if status == CalibrationStatus::Degraded && !self.is_degraded() {
            tracing::warn!(run_id = self.run_id, mean_trust, mean_rmse, "calibration degraded");
        }

        let driver = json!({
            "window": window,
            "samples": rows.len(),
            "trust_degraded": self.config.trust_degraded,
            "rmse_degraded": self.config.rmse_degraded,
        })
        .to_string();
        self.store
            .insert_meta_reasoner(self.run_id, now_ms, status.as_str(), mean_trust, mean_rmse, &driver)?;

        let verdict = MetaVerdict {
            status,
            mean_trust,
            mean_rmse,
            samples: rows.len(),
        };
        self.last = Some(verdict);
        Ok(verdict)
    }
}

impl MetacogObserver for MetaReasoner {
    fn stage(&self) -> &'static str {
        "phase14"
    }

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()> {
        self.evaluate(event.ts_ms).map(|_| ())
    }
}
