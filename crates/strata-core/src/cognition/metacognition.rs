//! Metacognition (Phase 9)
//!
//! Narrative predictions wait in a bounded queue until their horizon has
//! passed. Resolving them against observed coherence and goal shift yields an
//! RMSE that drives self-trust, a goal MAE and a binned calibration error. Each
//! resolution writes one metacognition row and is then handed to the observer
//! stages (Phases 10 to 15) in the order given by the caller.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;

use crate::config::MetacognitionConfig;
use crate::error::{CoreError, CoreResult};
use crate::storage::{NewMetacognition, Storage};

use super::reflection::NarrativePredictionSpec;

/// Coherence baseline the predicted deltas are relative to
const COHERENCE_BASELINE: f64 = 0.5;

/// A registered, not yet resolved prediction
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPrediction {
    /// Store id
    pub id: i64,
    pub ts_ms: i64,
    pub reflection_id: i64,
    pub predicted_delta: f64,
    pub confidence: f64,
    pub horizon_ms: i64,
    /// Expected goal shift, zero when the prediction names none
    pub goal_shift: f64,
}

impl PendingPrediction {
    pub fn due_ms(&self) -> i64 {
        self.ts_ms.saturating_add(self.horizon_ms)
    }
}

/// One resolved batch, as seen by the observer stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetacogEvent {
    pub metacognition_id: i64,
    pub ts_ms: i64,
    /// Step during which the batch was resolved
    pub step: i64,
    pub self_trust: f64,
    pub prev_trust: f64,
    pub narrative_rmse: f64,
    pub goal_mae: f64,
    pub ece: Option<f64>,
    pub actual_coherence: f64,
    pub resolved: usize,
    pub notes: String,
}

impl MetacogEvent {
    pub fn delta_trust(&self) -> f64 {
        self.self_trust - self.prev_trust
    }
}

/// A stage that reacts to each metacognition row
pub trait MetacogObserver {
    /// Component name used when a failure is reported
    fn stage(&self) -> &'static str;

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()>;
}

/// Outcome of [`Metacognition::resolve_actuals`]
#[derive(Debug)]
pub struct MetacogResolution {
    pub event: MetacogEvent,
    /// Observers that failed, in dispatch order
    pub failures: Vec<(&'static str, CoreError)>,
}

#[derive(Debug, Clone, Copy)]
struct RowSnapshot {
    trust: f64,
    coherence: f64,
    goal_accuracy: f64,
}

/// Phase 9 metacognition
pub struct Metacognition {
    store: Arc<Storage>,
    run_id: i64,
    config: MetacognitionConfig,
    pending: VecDeque<PendingPrediction>,
    self_trust: f64,
    last_row: Option<RowSnapshot>,
    dropped: u64,
}

impl Metacognition {
    pub fn new(store: Arc<Storage>, run_id: i64, config: MetacognitionConfig) -> Self {
        let self_trust = config.initial_trust.clamp(0.0, 1.0);
        Self {
            store,
            run_id,
            config,
            pending: VecDeque::new(),
            self_trust,
            last_row: None,
            dropped: 0,
        }
    }

    pub fn get_self_trust(&self) -> f64 {
        self.self_trust
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Predictions evicted because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Earliest time at which a pending prediction becomes due
    pub fn next_due_ms(&self) -> Option<i64> {
        self.pending.iter().map(PendingPrediction::due_ms).min()
    }

    /// Persist a narrative prediction and queue it
    pub fn register_narrative_prediction(
        &mut self,
        spec: &NarrativePredictionSpec,
        now_ms: i64,
    ) -> CoreResult<i64> {
        let id = self.store.insert_narrative_prediction(
            self.run_id,
            now_ms,
            spec.reflection_id,
            spec.predicted_coherence_delta,
            spec.confidence,
            spec.horizon_ms,
            &spec.targets_json,
        )?;

        self.pending.push_back(PendingPrediction {
            id,
            ts_ms: now_ms,
            reflection_id: spec.reflection_id,
            predicted_delta: spec.predicted_coherence_delta,
            confidence: spec.confidence.clamp(0.0, 1.0),
            horizon_ms: spec.horizon_ms.max(0),
            goal_shift: goal_shift_target(&spec.targets_json),
        });
        while self.pending.len() > self.config.pending_limit {
            if let Some(old) = self.pending.pop_front() {
                self.dropped += 1;
                tracing::warn!(prediction_id = old.id, "pending prediction queue full, oldest dropped");
            }
        }
        Ok(id)
    }

    /// Resolve every due prediction against the observed actuals
    ///
    /// Returns `Ok(None)` when nothing is due. Otherwise one metacognition row
    /// is written, the resolved predictions are marked, and each observer is
    /// invoked once in slice order; a failing observer does not stop the rest.
    pub fn resolve_actuals(
        &mut self,
        actual_coherence: f64,
        actual_goal_shift: f64,
        notes: &str,
        step: i64,
        now_ms: i64,
        observers: &mut [&mut dyn MetacogObserver],
    ) -> CoreResult<Option<MetacogResolution>> {
        if !actual_coherence.is_finite() || !actual_goal_shift.is_finite() {
            tracing::warn!(run_id = self.run_id, "non-finite actuals, resolution skipped");
            return Ok(None);
        }
        if !self.pending.iter().any(|p| p.due_ms() <= now_ms) {
            return Ok(None);
        }

        let (due, rest): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|p| p.due_ms() <= now_ms);
        self.pending = rest.into();

        let observed = actual_coherence - COHERENCE_BASELINE;
        let n = due.len() as f64;
        let mut sq = 0.0;
        let mut goal_err = 0.0;
        for p in &due {
            let e = p.predicted_delta - observed;
            sq += e * e;
            goal_err += (p.goal_shift - actual_goal_shift).abs();
        }
        let rmse = (sq / n).sqrt();
        let goal_mae = goal_err / n;
        let ece = expected_calibration_error(&due, observed, self.config.ece_bins);

        let prev_trust = self.self_trust;
        let target = 1.0 - rmse.clamp(0.0, 1.0);
        let rate = self.config.trust_rate.clamp(0.0, 0.5);
        let trust = (prev_trust + rate * (target - prev_trust)).clamp(0.0, 1.0);
        let goal_accuracy = 1.0 - goal_mae.min(1.0);

        let prev = self.last_row.unwrap_or(RowSnapshot {
            trust: self.config.initial_trust.clamp(0.0, 1.0),
            coherence: COHERENCE_BASELINE,
            goal_accuracy: 1.0,
        });
        let row = NewMetacognition {
            ts_ms: now_ms,
            self_trust: trust,
            narrative_rmse: rmse,
            goal_mae,
            ece,
            notes: notes.to_string(),
            delta_trust: Some(trust - prev.trust),
            delta_coherence: Some(actual_coherence - prev.coherence),
            delta_goal_accuracy: Some(goal_accuracy - prev.goal_accuracy),
        };

        let metacognition_id = match self.store.insert_metacognition(self.run_id, &row) {
            Ok(id) => id,
            Err(e) => {
                // Put the batch back so a later call can retry it
                let mut restored: Vec<_> = due.into_iter().chain(self.pending.drain(..)).collect();
                restored.sort_by_key(|p| (p.ts_ms, p.id));
                self.pending = restored.into();
                return Err(e.into());
            }
        };
        self.self_trust = trust;
        self.last_row = Some(RowSnapshot {
            trust,
            coherence: actual_coherence,
            goal_accuracy,
        });

        let ids: Vec<i64> = due.iter().map(|p| p.id).collect();
        if let Err(e) = self.store.mark_narrative_predictions_resolved(&ids, metacognition_id) {
            tracing::warn!(metacognition_id, "predictions not marked resolved: {}", e);
        }
        tracing::info!(
            run_id = self.run_id,
            metacognition_id,
            resolved = ids.len(),
            self_trust = trust,
            rmse,
            "narrative predictions resolved"
        );

        let event = MetacogEvent {
            metacognition_id,
            ts_ms: now_ms,
            step,
            self_trust: trust,
            prev_trust,
            narrative_rmse: rmse,
            goal_mae,
            ece,
            actual_coherence,
            resolved: ids.len(),
            notes: notes.to_string(),
        };

        let mut failures = Vec::new();
        for observer in observers.iter_mut() {
            if let Err(e) = observer.observe(&event) {
                tracing::warn!(stage = observer.stage(), metacognition_id, "observer failed: {}", e);
                failures.push((observer.stage(), e));
            }
        }

        Ok(Some(MetacogResolution { event, failures }))
    }
}

fn goal_shift_target(targets_json: &str) -> f64 {
    serde_json::from_str::<serde_json::Value>(targets_json)
        .ok()
        .and_then(|v| v.get("goal_shift").and_then(|g| g.as_f64()))
        .filter(|g| g.is_finite())
        .unwrap_or(0.0)
}

/// Confidence-binned gap between stated confidence and achieved accuracy
///
/// Accuracy of one prediction is `1 - min(|error|, 1)`. Bins are equal-width
/// over `[0, 1]`; `None` with zero bins.
fn expected_calibration_error(due: &[PendingPrediction], observed: f64, bins: usize) -> Option<f64> {
    if bins == 0 || due.is_empty() {
        return None;
    }
    let mut conf = vec![0.0; bins];
    let mut acc = vec![0.0; bins];
    let mut count = vec![0usize; bins];
    for p in due {
        let b = ((p.confidence * bins as f64) as usize).min(bins - 1);
        conf[b] += p.confidence;
        acc[b] += 1.0 - (p.predicted_delta - observed).abs().min(1.0);
        count[b] += 1;
    }
    let total = due.len() as f64;
    let ece = (0..bins)
        .filter(|&b| count[b] > 0)
        .map(|b| {
            let c = count[b] as f64;
            (c / total) * (acc[b] / c - conf[b] / c).abs()
        })
        .sum();
    Some(ece)
}
