//! Reflection (Phase 7b)
//!
//! Gated, at most one reflection per episode. Every N reflections a narrative
//! summary is written as well, together with the parameters of a narrative
//! prediction the engine hands on to metacognition.

use std::sync::Arc;

use serde_json::json;

use crate::config::ReflectionConfig;
use crate::error::CoreResult;
use crate::storage::Storage;

use super::affect::AffectiveState;

/// Lower bound of a narrative prediction horizon
pub const MIN_HORIZON_MS: i64 = 30_000;
/// Upper bound of a narrative prediction horizon
pub const MAX_HORIZON_MS: i64 = 120_000;

/// Title used for narrative summaries
pub const NARRATIVE_TITLE: &str = "narrative summary";

/// Metrics of the episode that just ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeMetrics {
    pub episode_index: i64,
    pub contradiction_rate: f64,
    pub avg_reward: f64,
}

/// Earlier-stage state a reflection reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionView {
    pub affect: AffectiveState,
    pub identity_confidence: Option<f64>,
    /// Goal coherence as of the previous step
    pub coherence: f64,
    pub episode_id: Option<i64>,
}

/// A persisted reflection, ready to be ingested as a goal
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionRecordOut {
    pub id: i64,
    pub title: String,
    pub rationale_json: String,
    pub impact: f64,
}

/// Parameters of a narrative prediction
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativePredictionSpec {
    pub reflection_id: i64,
    pub predicted_coherence_delta: f64,
    pub confidence: f64,
    pub horizon_ms: i64,
    pub targets_json: String,
}

/// Narrative summary plus its prediction
#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeOut {
    pub summary: ReflectionRecordOut,
    pub prediction: NarrativePredictionSpec,
}

/// Everything one reflection produced
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionOutcome {
    pub reflection: ReflectionRecordOut,
    pub narrative: Option<NarrativeOut>,
}

/// `0.6 * contradiction_rate + 0.4 * |avg_reward|`
pub fn trigger_value(contradiction_rate: f64, avg_reward: f64) -> f64 {
    0.6 * contradiction_rate + 0.4 * avg_reward.abs()
}

/// Horizon grows with coherence, reward magnitude and agreement
pub fn narrative_horizon_ms(coherence: f64, avg_reward: f64, contradiction_rate: f64) -> i64 {
    let coh = coherence.clamp(0.0, 1.0);
    let reward = avg_reward.abs().min(1.0);
    let agreement = (1.0 - contradiction_rate).clamp(0.0, 1.0);
    let span = (MAX_HORIZON_MS - MIN_HORIZON_MS) as f64;
    let h = MIN_HORIZON_MS as f64 + span * (0.4 * coh + 0.3 * reward + 0.3 * agreement);
    (h.round() as i64).clamp(MIN_HORIZON_MS, MAX_HORIZON_MS)
}

/// Reflection stage
pub struct Reflection {
    store: Arc<Storage>,
    run_id: i64,
    config: ReflectionConfig,
    last_reflected: i64,
    count: u32,
}

impl Reflection {
    pub fn new(store: Arc<Storage>, run_id: i64, mut config: ReflectionConfig) -> Self {
        config.narrative_every = config.narrative_every.max(1);
        Self {
            store,
            run_id,
            config,
            last_reflected: -1,
            count: 0,
        }
    }

    /// Episode index of the last reflection, `-1` before the first
    pub fn last_reflected(&self) -> i64 {
        self.last_reflected
    }

    /// Reflections written so far (narrative summaries excluded)
    pub fn reflection_count(&self) -> u32 {
        self.count
    }

    /// Whether an episode passes the gate
    pub fn should_reflect(&self, metrics: &EpisodeMetrics) -> bool {
        if self.last_reflected >= 0 && metrics.episode_index - self.last_reflected < self.config.min_gap {
            return false;
        }
        trigger_value(metrics.contradiction_rate, metrics.avg_reward) >= self.config.trigger_threshold
    }

    /// Possibly write a reflection (and a narrative summary) for an episode
    pub fn maybe_reflect(
        &mut self,
        metrics: &EpisodeMetrics,
        view: &ReflectionView,
        ts_ms: i64,
    ) -> CoreResult<Option<ReflectionOutcome>> {
        if !metrics.contradiction_rate.is_finite() || !metrics.avg_reward.is_finite() {
            tracing::warn!(episode = metrics.episode_index, "non-finite episode metrics, reflection skipped");
            return Ok(None);
        }
        if !self.should_reflect(metrics) {
            return Ok(None);
        }

        let trigger = trigger_value(metrics.contradiction_rate, metrics.avg_reward);
        let title = if 0.6 * metrics.contradiction_rate >= 0.4 * metrics.avg_reward.abs() {
            "reduce contradictions"
        } else if metrics.avg_reward < 0.0 {
            "recover reward"
        } else {
            "sustain reward"
        };
        let message = format!(
            "episode {}: contradiction rate {:.2}, average reward {:.2}",
            metrics.episode_index, metrics.contradiction_rate, metrics.avg_reward
        );
        let mut rationale = json!({
            "episode_index": metrics.episode_index,
            "contradiction_rate": metrics.contradiction_rate,
            "avg_reward": metrics.avg_reward,
            "trigger": trigger,
            "valence": view.affect.valence,
            "arousal": view.affect.arousal,
            "message": message,
        });
        if let Some(conf) = view.identity_confidence {
            rationale["identity_confidence"] = json!(conf);
        }
        let rationale_json = rationale.to_string();
        let impact = trigger.clamp(0.0, 1.0);

        let id = self
            .store
            .insert_reflection(self.run_id, ts_ms, title, &rationale_json, impact, view.episode_id)?;
        self.last_reflected = metrics.episode_index;
        self.count += 1;
        tracing::info!(run_id = self.run_id, reflection_id = id, title, impact, "reflection written");

        let reflection = ReflectionRecordOut {
            id,
            title: title.to_string(),
            rationale_json,
            impact,
        };

        let narrative = if self.count % self.config.narrative_every == 0 {
            Some(self.write_narrative(metrics, view, ts_ms)?)
        } else {
            None
        };

        Ok(Some(ReflectionOutcome { reflection, narrative }))
    }

    fn write_narrative(
        &mut self,
        metrics: &EpisodeMetrics,
        view: &ReflectionView,
        ts_ms: i64,
    ) -> CoreResult<NarrativeOut> {
        let coherence = view.coherence.clamp(0.0, 1.0);
        let rationale_json = json!({
            "reflections": self.count,
            "coherence": coherence,
            "avg_reward": metrics.avg_reward,
            "contradiction_rate": metrics.contradiction_rate,
            "valence": view.affect.valence,
            "message": format!("{} reflections, coherence {:.2}", self.count, coherence),
        })
        .to_string();
        let impact = coherence;

        let id = self.store.insert_reflection(
            self.run_id,
            ts_ms,
            NARRATIVE_TITLE,
            &rationale_json,
            impact,
            view.episode_id,
        )?;

        // Expected stability decay per second at this coherence
        let goal_shift = 0.01 + 0.02 * (1.0 - coherence);
        let prediction = NarrativePredictionSpec {
            reflection_id: id,
            predicted_coherence_delta: coherence - 0.5,
            confidence: coherence,
            horizon_ms: narrative_horizon_ms(coherence, metrics.avg_reward, metrics.contradiction_rate),
            targets_json: json!({ "coherence": coherence, "goal_shift": goal_shift }).to_string(),
        };

        Ok(NarrativeOut {
            summary: ReflectionRecordOut {
                id,
                title: NARRATIVE_TITLE.to_string(),
                rationale_json,
                impact,
            },
            prediction,
        })
    }
}
