//! Self-explanation (Phase 10)
//!
//! One short explanation per metacognition row naming what moved self-trust.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cognition::{MetacogEvent, MetacogObserver};
use crate::error::CoreResult;
use crate::storage::Storage;

/// Trust changes smaller than this count as stable
const STABLE_DELTA: f64 = 0.01;

/// Dominant driver of a trust change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationDriver {
    NarrativeError,
    GoalDrift,
    Stable,
}

impl ExplanationDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NarrativeError => "narrative_error",
            Self::GoalDrift => "goal_drift",
            Self::Stable => "stable",
        }
    }

    pub fn classify(event: &MetacogEvent) -> Self {
        if event.delta_trust().abs() < STABLE_DELTA {
            Self::Stable
        } else if event.narrative_rmse >= event.goal_mae {
            Self::NarrativeError
        } else {
            Self::GoalDrift
        }
    }
}

pub struct SelfExplanation {
    store: Arc<Storage>,
    run_id: i64,
    last: Option<ExplanationDriver>,
}

impl SelfExplanation {
    pub fn new(store: Arc<Storage>, run_id: i64) -> Self {
        Self {
            store,
            run_id,
            last: None,
        }
    }

    pub fn last_driver(&self) -> Option<ExplanationDriver> {
        self.last
    }

    pub fn explain(&mut self, event: &MetacogEvent) -> CoreResult<i64> {
        let driver = ExplanationDriver::classify(event);
        let delta = event.delta_trust();
        let text = match driver {
            ExplanationDriver::Stable => format!("self-trust steady at {:.3}", event.self_trust),
            ExplanationDriver::NarrativeError => format!(
                "self-trust {} by {:.3}: narrative predictions off by {:.3}",
                if delta > 0.0 { "rose" } else { "fell" },
                delta.abs(),
                event.narrative_rmse
            ),
            ExplanationDriver::GoalDrift => format!(
                "self-trust {} by {:.3}: goal shift off by {:.3}",
                if delta > 0.0 { "rose" } else { "fell" },
                delta.abs(),
                event.goal_mae
            ),
        };
        let drivers = json!({
            "driver": driver.as_str(),
            "delta_trust": delta,
            "narrative_rmse": event.narrative_rmse,
            "goal_mae": event.goal_mae,
            "ece": event.ece,
            "resolved": event.resolved,
        })
        .to_string();

        let id = self.store.insert_self_explanation(
            self.run_id,
            event.ts_ms,
            event.metacognition_id,
            &text,
            &drivers,
        )?;
        self.last = Some(driver);
        Ok(id)
    }
}

impl MetacogObserver for SelfExplanation {
    fn stage(&self) -> &'static str {
        "phase10"
    }

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()> {
        self.explain(event).map(|_| ())
    }
}
