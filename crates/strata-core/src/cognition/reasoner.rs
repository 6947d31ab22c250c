//! Reasoner (Phase 6)
//!
//! Scores candidate options by a running-mean reward prior minus a complexity
//! penalty. The penalty weight `α` is modulated by goal coherence, self-trust,
//! personality risk and identity confidence; the autonomy envelope then pulls
//! scores toward their mean. Outcomes update the posterior and, unless the
//! reasoner is off, are verified for contradictions that feed the intent graph.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ReasonerConfig, ReflectionConfig};
use crate::error::CoreResult;
use crate::storage::{NewAutonomyModulation, Storage};

use super::affect::AffectiveState;
use super::reflection::{EpisodeMetrics, Reflection, ReflectionOutcome, ReflectionView};

/// A reward below this on an option believed good is a contradiction
const CONTRADICTION_REWARD_BELOW: f64 = -0.25;
/// Posterior mean above which an option counts as believed good
const CONTRADICTION_MEAN_ABOVE: f64 = 0.15;
/// Ceiling of the envelope-driven exploration bias
const MAX_EXPLORATION_BIAS: f64 = 0.3;

// ============================================================================
// TYPES
// ============================================================================

/// How much the reasoner is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonerMode {
    /// No verification or intent logging; never overrides the driver
    Off,
    /// Logs like `On` but never overrides the driver
    Audit,
    /// Logs and lets the best-scored option override the driver
    On,
}

impl ReasonerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Audit => "audit",
            Self::On => "on",
        }
    }

    /// Whether outcomes are verified and intents recorded
    pub fn logs(&self) -> bool {
        !matches!(self, Self::Off)
    }

    /// Whether scoring may replace the driver's choice
    pub fn overrides(&self) -> bool {
        matches!(self, Self::On)
    }
}

/// A candidate option as proposed by the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOption {
    /// Stable label the posterior is keyed by
    pub key: String,
    pub confidence: f64,
    pub complexity: f64,
    /// Who proposed it
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "driver".to_string()
}

impl CandidateOption {
    pub fn new(key: impl Into<String>, confidence: f64, complexity: f64) -> Self {
        Self {
            key: key.into(),
            confidence,
            complexity,
            source: default_source(),
        }
    }

    fn payload_json(&self) -> String {
        json!({ "key": self.key, "complexity": self.complexity }).to_string()
    }
}

/// In-memory running mean for one option key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorEntry {
    pub key: String,
    pub n: i64,
    pub mean: f64,
    pub last_ms: i64,
}

/// Result of scoring a set of options
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReasonScore {
    /// Argmax of `scores`, lowest index on ties; `None` for an empty set
    pub best_index: Option<usize>,
    pub best_score: f64,
    /// Post-modulation scores
    pub scores: Vec<f64>,
    pub pre_scores: Vec<f64>,
    /// Clamped, modulated complexity weight
    pub alpha: f64,
    pub exploration_bias: f64,
}

/// Snapshot of other stages' state consumed by scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReasonerInputs {
    /// Goal coherence from the previous step
    pub coherence: f64,
    pub self_trust: f64,
    /// Personality risk tolerance in `[-1, 1]`
    pub personality_risk: f64,
    pub identity_confidence: f64,
    /// Latest ethics decision was a deny
    pub ethics_hard_block: bool,
    /// Zero while the envelope has not produced a valid state
    pub autonomy_score: f64,
    /// Last sample of the reasoner's context peer, when registered
    pub context_modulation: Option<f64>,
}

impl Default for ReasonerInputs {
    fn default() -> Self {
        Self {
            coherence: 0.0,
            self_trust: 0.5,
            personality_risk: 0.0,
            identity_confidence: 0.5,
            ethics_hard_block: false,
            autonomy_score: 0.0,
            context_modulation: None,
        }
    }
}

/// What applying one outcome did
#[derive(Debug, Clone, PartialEq)]
pub struct OptionOutcome {
    pub option_id: i64,
    pub key: String,
    pub n: i64,
    pub old_mean: f64,
    pub mean: f64,
    /// `None` when verification was not requested
    pub contradiction: Option<bool>,
    pub verification_id: Option<i64>,
    pub correction_node: Option<i64>,
    pub resolution_node: Option<i64>,
}

// ============================================================================
// REASONER
// ============================================================================

/// Phase 6 reasoner, owner of the posterior map and the affect/reflection stages
pub struct Reasoner {
    store: Arc<Storage>,
    run_id: i64,
    episode_id: Option<i64>,
    config: ReasonerConfig,
    posteriors: HashMap<String, PosteriorEntry>,
    last_contradiction: HashMap<String, bool>,
    last_intent_node: HashMap<String, i64>,
    affect: AffectiveState,
    reflection: Reflection,
    last_avg_reward: Option<f64>,
}

impl Reasoner {
    pub fn new(
        store: Arc<Storage>,
        run_id: i64,
        config: ReasonerConfig,
        reflection: ReflectionConfig,
    ) -> Self {
        let reflection = Reflection::new(Arc::clone(&store), run_id, reflection);
        Self {
            store,
            run_id,
            episode_id: None,
            config,
            posteriors: HashMap::new(),
            last_contradiction: HashMap::new(),
            last_intent_node: HashMap::new(),
            affect: AffectiveState::default(),
            reflection,
            last_avg_reward: None,
        }
    }

    /// Episode that verifications are attributed to
    pub fn set_episode(&mut self, episode_id: i64) {
        self.episode_id = Some(episode_id);
    }

    pub fn mode(&self) -> ReasonerMode {
        self.config.mode
    }

    pub fn affect(&self) -> AffectiveState {
        self.affect
    }

    pub fn reflection(&self) -> &Reflection {
        &self.reflection
    }

    pub fn posterior(&self, key: &str) -> Option<&PosteriorEntry> {
        self.posteriors.get(key)
    }

    /// Posterior mean, zero for unseen keys
    pub fn posterior_mean(&self, key: &str) -> f64 {
        self.posteriors.get(key).map(|p| p.mean).unwrap_or(0.0)
    }

    /// Ensure a posterior entry exists, hydrating it from the store
    fn ensure_posterior(&mut self, key: &str) -> &mut PosteriorEntry {
        let store = &self.store;
        let run_id = self.run_id;
        self.posteriors.entry(key.to_string()).or_insert_with(|| {
            let (n, mean, last_ms) = match store.find_option_stats_by_key(run_id, key) {
                Ok(Some(stats)) => (stats.n, stats.mean, stats.last_ms),
                Ok(None) => (0, 0.0, 0),
                Err(e) => {
                    tracing::warn!(key, "posterior hydration failed: {}", e);
                    (0, 0.0, 0)
                }
            };
            PosteriorEntry {
                key: key.to_string(),
                n,
                mean,
                last_ms,
            }
        })
    }

    /// Persist options and make sure each key has a posterior entry
    pub fn register_options(
        &mut self,
        options: &[CandidateOption],
        step: i64,
        ts_ms: i64,
        selected_index: Option<usize>,
    ) -> CoreResult<Vec<i64>> {
        let mut ids = Vec::with_capacity(options.len());
        for (i, opt) in options.iter().enumerate() {
            self.ensure_posterior(&opt.key);
            let id = self.store.insert_option(
                self.run_id,
                ts_ms,
                step,
                &opt.source,
                &opt.payload_json(),
                opt.confidence.clamp(0.0, 1.0),
                selected_index == Some(i),
            )?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Effective complexity weight after modulation and clamping
    pub fn effective_alpha(&self, inputs: &ReasonerInputs) -> f64 {
        let alpha = self.config.alpha;
        let alignment = inputs.coherence.clamp(0.0, 1.0);
        let trust = inputs.self_trust.clamp(0.0, 1.0);

        let mut a = alpha * (0.5 + (1.0 - alignment));
        let trust_factor = 0.9 + 0.4 * (1.0 - trust);
        let risk_factor = 1.0 + 0.1 * inputs.personality_risk.clamp(-1.0, 1.0);
        let identity_factor = 0.95 + 0.1 * (inputs.identity_confidence.clamp(0.0, 1.0) - 0.5);
        a *= trust_factor * risk_factor * identity_factor;

        if let Some(sample) = inputs.context_modulation.filter(|s| s.is_finite()) {
            a *= 1.0 + self.config.context_weight * (sample.clamp(0.0, 1.0) - 0.5);
        }

        a.clamp(0.25 * alpha, 2.0 * alpha)
    }

    /// Score options and log the autonomy modulation that was applied
    pub fn score_options(
        &mut self,
        options: &[CandidateOption],
        inputs: &ReasonerInputs,
        ts_ms: i64,
    ) -> ReasonScore {
        if options.is_empty() {
            tracing::warn!(run_id = self.run_id, "score_options called with no options");
            return ReasonScore::default();
        }

        let alpha = self.effective_alpha(inputs);
        let pre: Vec<f64> = options
            .iter()
            .map(|o| {
                let cx = if o.complexity.is_finite() { o.complexity } else { 0.0 };
                self.posterior_mean(&o.key) - alpha * cx
            })
            .collect();
        let pre_entropy = softmax_entropy(&pre);

        let trust = inputs.self_trust.clamp(0.0, 1.0);
        let autonomy = inputs.autonomy_score.clamp(0.0, 1.0);
        let (veto_reason, bias) = if inputs.ethics_hard_block {
            ("ethics_hard_block", 0.0)
        } else if autonomy <= 0.0 {
            ("no_autonomy_influence", 0.0)
        } else {
            ("", (MAX_EXPLORATION_BIAS * autonomy * trust).min(MAX_EXPLORATION_BIAS))
        };

        let mean_pre = pre.iter().sum::<f64>() / pre.len() as f64;
        let post: Vec<f64> = pre.iter().map(|s| s * (1.0 - bias) + mean_pre * bias).collect();
        let post_entropy = softmax_entropy(&post);

        let (shift_mean, shift_max) = rank_shift(&pre, &post);
        let row = NewAutonomyModulation {
            ts_ms,
            pre_entropy,
            post_entropy,
            rank_shift_mean: shift_mean,
            rank_shift_max: shift_max,
            exploration_bias: bias,
            autonomy_score: autonomy,
            veto_reason: veto_reason.to_string(),
            driver_json: json!({
                "alpha": alpha,
                "base_alpha": self.config.alpha,
                "coherence": inputs.coherence,
                "self_trust": trust,
                "personality_risk": inputs.personality_risk,
                "identity_confidence": inputs.identity_confidence,
                "context_modulation": inputs.context_modulation,
                "options": options.len(),
            })
            .to_string(),
        };
        if let Err(e) = self.store.insert_autonomy_modulation(self.run_id, &row) {
            tracing::warn!(run_id = self.run_id, "autonomy modulation not recorded: {}", e);
        }

        let best_index = argmax(&post);
        let best_score = best_index.map(|i| post[i]).unwrap_or(0.0);
        ReasonScore {
            best_index,
            best_score,
            scores: post,
            pre_scores: pre,
            alpha,
            exploration_bias: bias,
        }
    }

    /// Fold one observed reward into the posterior of `key`
    pub fn apply_option_result(
        &mut self,
        option_id: i64,
        key: &str,
        reward: f64,
        ts_ms: i64,
        emit_verification: bool,
    ) -> CoreResult<Option<OptionOutcome>> {
        if !reward.is_finite() {
            tracing::warn!(option_id, key, "non-finite reward ignored");
            return Ok(None);
        }

        let entry = self.ensure_posterior(key);
        let old_mean = entry.mean;
        entry.n += 1;
        entry.mean += (reward - entry.mean) / entry.n as f64;
        entry.last_ms = ts_ms;
        let (n, mean) = (entry.n, entry.mean);

        if let Err(e) = self.store.upsert_option_stats(option_id, n, mean, ts_ms) {
            tracing::warn!(option_id, key, "option stats not recorded: {}", e);
        }

        let mut outcome = OptionOutcome {
            option_id,
            key: key.to_string(),
            n,
            old_mean,
            mean,
            contradiction: None,
            verification_id: None,
            correction_node: None,
            resolution_node: None,
        };
        if !emit_verification {
            return Ok(Some(outcome));
        }

        let contradiction = reward < CONTRADICTION_REWARD_BELOW && old_mean > CONTRADICTION_MEAN_ABOVE;
        outcome.contradiction = Some(contradiction);
        let strength = (reward - old_mean).abs();
        let details = json!({
            "key": key,
            "reward": reward,
            "old_mean": old_mean,
            "mean": mean,
            "n": n,
        })
        .to_string();
        match self.store.insert_verification(
            ts_ms,
            option_id,
            "option_outcome",
            contradiction,
            &details,
            self.run_id,
            self.episode_id,
        ) {
            Ok(id) => outcome.verification_id = Some(id),
            Err(e) => tracing::warn!(run_id = self.run_id, key, "verification not recorded: {}", e),
        }

        let was_contradicted = self.last_contradiction.get(key).copied().unwrap_or(false);
        self.last_contradiction.insert(key.to_string(), contradiction);
        if contradiction && !was_contradicted {
            let node = self.record_intent_node(key, ts_ms, "correction", &details, strength);
            outcome.correction_node = node;
            tracing::debug!(key, node = ?node, "contradiction opened");
        } else if !contradiction && was_contradicted {
            let src = self.last_intent_node.get(key).copied();
            let node = self.record_intent_node(key, ts_ms, "resolution", &details, strength);
            if let (Some(src), Some(dst)) = (src, node) {
                if let Err(e) = self.store.insert_intent_edge(
                    self.run_id,
                    ts_ms,
                    src,
                    dst,
                    "contradiction_resolved",
                    strength,
                    &details,
                ) {
                    tracing::warn!(run_id = self.run_id, key, "resolution edge not recorded: {}", e);
                }
            }
            outcome.resolution_node = node;
            tracing::debug!(key, node = ?node, "contradiction resolved");
        }

        Ok(Some(outcome))
    }

    /// Write a correction or resolution node and make it the key's latest
    fn record_intent_node(
        &mut self,
        key: &str,
        ts_ms: i64,
        kind: &str,
        details: &str,
        strength: f64,
    ) -> Option<i64> {
        match self
            .store
            .insert_intent_node(self.run_id, ts_ms, kind, details, strength.min(1.0), "phase6")
        {
            Ok(node) => {
                self.last_intent_node.insert(key.to_string(), node);
                Some(node)
            }
            Err(e) => {
                tracing::warn!(run_id = self.run_id, key, kind, "intent node not recorded: {}", e);
                None
            }
        }
    }

    /// Update affect from the episode's average reward and maybe reflect
    pub fn on_episode_end(
        &mut self,
        metrics: &EpisodeMetrics,
        identity_confidence: Option<f64>,
        coherence: f64,
        episode_id: Option<i64>,
        ts_ms: i64,
    ) -> CoreResult<Option<ReflectionOutcome>> {
        let drift = match self.last_avg_reward {
            Some(prev) if metrics.avg_reward.is_finite() => metrics.avg_reward - prev,
            _ => 0.0,
        };
        self.affect.update_from_reward(metrics.avg_reward, drift);
        if metrics.avg_reward.is_finite() {
            self.last_avg_reward = Some(metrics.avg_reward);
        }

        let view = ReflectionView {
            affect: self.affect,
            identity_confidence,
            coherence,
            episode_id,
        };
        self.reflection.maybe_reflect(metrics, &view, ts_ms)
    }
}

// ============================================================================
// SCORE STATISTICS
// ============================================================================

/// Index of the maximum, lowest index on ties; NaN never wins
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some(b) if *s <= scores[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Shannon entropy (nats) of `softmax(scores)`
pub fn softmax_entropy(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter()
        .map(|e| e / sum)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}

fn ranks(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut rank = vec![0; scores.len()];
    for (r, &i) in order.iter().enumerate() {
        rank[i] = r;
    }
    rank
}

/// Mean and max absolute rank change between two score vectors
pub fn rank_shift(pre: &[f64], post: &[f64]) -> (f64, i64) {
    if pre.is_empty() || pre.len() != post.len() {
        return (0.0, 0);
    }
    let a = ranks(pre);
    let b = ranks(post);
    let shifts: Vec<i64> = a.iter().zip(&b).map(|(x, y)| (*x as i64 - *y as i64).abs()).collect();
    let max = shifts.iter().copied().max().unwrap_or(0);
    let mean = shifts.iter().sum::<i64>() as f64 / shifts.len() as f64;
    (mean, max)
}
