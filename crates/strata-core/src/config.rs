//! Runtime configuration
//!
//! One sub-config per stage, aggregated by [`RuntimeConfig`]. Every struct is
//! `#[serde(default)]`, so a JSON file only needs the keys it overrides.
//! Loading order: defaults, then the file, then `STRATA_*` environment
//! variables, then [`RuntimeConfig::validate`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cognition::ReasonerMode;
use crate::error::{CoreError, CoreResult};
use crate::governance::AutonomyTier;

// ============================================================================
// STAGE CONFIGS
// ============================================================================

/// Named peer stream created at run start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSpec {
    pub name: String,
    pub gain: f64,
    pub update_ms: i64,
    pub window: i64,
}

/// Coupling edge created at run start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingSpec {
    pub src: String,
    pub dst: String,
    pub weight: f64,
}

/// Context streams (global plus peers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Gain of the global stream
    pub gain: f64,
    /// Nominal refresh period, recorded with each sample
    pub update_ms: i64,
    /// Ring size of the global stream (`<= 0` means 1)
    pub window: i64,
    pub peers: Vec<PeerSpec>,
    pub couplings: Vec<CouplingSpec>,
    /// Label used when the step loop samples every peer
    pub step_label: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            gain: 1.0,
            update_ms: 200,
            window: 16,
            peers: Vec::new(),
            couplings: Vec::new(),
            step_label: "step".to_string(),
        }
    }
}

/// Phase 6 option scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    pub mode: ReasonerMode,
    /// Complexity penalty weight before modulation
    pub alpha: f64,
    /// Peer stream whose last sample modulates alpha, if registered
    pub context_peer: String,
    /// Strength of that modulation around a neutral 0.5 sample
    pub context_weight: f64,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            mode: ReasonerMode::On,
            alpha: 0.1,
            context_peer: "phase6".to_string(),
            context_weight: 0.2,
        }
    }
}

/// Phase 7b reflection gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    /// Minimum episode gap between two reflections
    pub min_gap: i64,
    /// Minimum trigger value `0.6*contradiction_rate + 0.4*|avg_reward|`
    pub trigger_threshold: f64,
    /// A narrative summary follows every N reflections
    pub narrative_every: u32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            min_gap: 2,
            trigger_threshold: 0.3,
            narrative_every: 10,
        }
    }
}

/// Phase 8 goal hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    /// Description of the structural root every new goal hangs under
    pub root_description: String,
    /// Edge weight from the root to an ingested goal
    pub link_weight: f64,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            root_description: "root".to_string(),
            link_weight: 1.0,
        }
    }
}

/// Phase 9 self-trust calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetacognitionConfig {
    /// Capacity of the pending-prediction queue
    pub pending_limit: usize,
    pub initial_trust: f64,
    /// First-order filter coefficient (at most 0.5)
    pub trust_rate: f64,
    /// Confidence bins for the expected calibration error
    pub ece_bins: usize,
}

impl Default for MetacognitionConfig {
    fn default() -> Self {
        Self {
            pending_limit: 64,
            initial_trust: 0.5,
            trust_rate: 0.3,
            ece_bins: 5,
        }
    }
}

/// Phase 11 personality revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfRevisionConfig {
    pub enabled: bool,
    /// Propose a revision when self-trust drops below this
    pub revise_below: f64,
    /// Amount risk tolerance is lowered per proposal
    pub risk_step: f64,
}

impl Default for SelfRevisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            revise_below: 0.4,
            risk_step: 0.1,
        }
    }
}

/// Phase 12 windowed consistency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Number of metacognition rows considered
    pub window: i64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self { window: 10 }
    }
}

/// Phase 13 envelope thresholds and hysteresis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub start_tier: AutonomyTier,
    pub trust_tighten: f64,
    pub consistency_tighten: f64,
    pub trust_expand: f64,
    pub consistency_expand: f64,
    pub contraction_hysteresis_ms: i64,
    pub expansion_hysteresis_ms: i64,
    pub min_log_interval_ms: i64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            start_tier: AutonomyTier::Conditional,
            trust_tighten: 0.35,
            consistency_tighten: 0.5,
            trust_expand: 0.75,
            consistency_expand: 0.8,
            contraction_hysteresis_ms: 60_000,
            expansion_hysteresis_ms: 120_000,
            min_log_interval_ms: 1_000,
        }
    }
}

/// Phase 14 degraded-calibration monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaReasonerConfig {
    pub window: i64,
    pub trust_degraded: f64,
    pub rmse_degraded: f64,
}

impl Default for MetaReasonerConfig {
    fn default() -> Self {
        Self {
            window: 10,
            trust_degraded: 0.4,
            rmse_degraded: 0.35,
        }
    }
}

/// Phase 15 risk thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthicsConfig {
    pub risk_threshold: f64,
    pub margin: f64,
    /// Context label used when reviewing personality proposals
    pub review_label: String,
}

impl Default for EthicsConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 0.6,
            margin: 0.05,
            review_label: "personality_review".to_string(),
        }
    }
}

/// Action gate switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    pub web_actions_enabled: bool,
    /// Any value above zero blocks every action
    pub simulate_blocked: u32,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            web_actions_enabled: false,
            simulate_blocked: 0,
        }
    }
}

/// Optional JSON-lines sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// `phase:event` pairs to keep; empty keeps everything
    pub allowlist: Vec<String>,
    /// Keep one line out of every N
    pub sample_every: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowlist: Vec::new(),
            sample_every: 1,
        }
    }
}

// ============================================================================
// RUNTIME CONFIG
// ============================================================================

/// Complete configuration of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Store location; `None` uses the platform data directory
    pub db_path: Option<PathBuf>,
    /// Sleep between steps
    pub step_ms: u64,
    /// Stop after this many steps; `None` runs until aborted
    pub max_steps: Option<u64>,
    /// Heartbeat run event every N steps (0 disables)
    pub heartbeat_every: u64,
    /// Steps slower than this are recorded as budget overruns
    pub step_budget_ms: i64,
    /// Base of the shutdown drain window
    pub outcome_eval_window_ms: i64,
    pub context: ContextConfig,
    pub reasoner: ReasonerConfig,
    pub reflection: ReflectionConfig,
    pub goals: GoalConfig,
    pub metacognition: MetacognitionConfig,
    pub self_revision: SelfRevisionConfig,
    pub consistency: ConsistencyConfig,
    pub envelope: EnvelopeConfig,
    pub meta_reasoner: MetaReasonerConfig,
    pub ethics: EthicsConfig,
    pub actions: ActionConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            step_ms: 50,
            max_steps: None,
            heartbeat_every: 100,
            step_budget_ms: 250,
            outcome_eval_window_ms: 1_000,
            context: ContextConfig::default(),
            reasoner: ReasonerConfig::default(),
            reflection: ReflectionConfig::default(),
            goals: GoalConfig::default(),
            metacognition: MetacognitionConfig::default(),
            self_revision: SelfRevisionConfig::default(),
            consistency: ConsistencyConfig::default(),
            envelope: EnvelopeConfig::default(),
            meta_reasoner: MetaReasonerConfig::default(),
            ethics: EthicsConfig::default(),
            actions: ActionConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Config(format!("invalid config: {}", e)))
    }

    /// Read and parse a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Apply `STRATA_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> CoreResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `STRATA_*` overrides from any key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STRATA_DB_PATH").filter(|p| !p.is_empty()) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(v) = lookup("STRATA_STEP_MS") {
            self.step_ms = parse_env("STRATA_STEP_MS", &v)?;
        }
        if let Some(v) = lookup("STRATA_MAX_STEPS") {
            let steps: u64 = parse_env("STRATA_MAX_STEPS", &v)?;
            self.max_steps = if steps == 0 { None } else { Some(steps) };
        }
        if let Some(v) = lookup("STRATA_WEB_ACTIONS") {
            self.actions.web_actions_enabled = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(CoreError::Config(format!(
                        "STRATA_WEB_ACTIONS: expected a boolean, got {:?}",
                        other
                    )))
                }
            };
        }
        Ok(())
    }

    /// Reject out-of-range parameters
    pub fn validate(&self) -> CoreResult<()> {
        let unit = |name: &str, v: f64| -> CoreResult<()> {
            if v.is_finite() && (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(CoreError::Config(format!("{} must be in [0, 1], got {}", name, v)))
            }
        };
        let non_negative = |name: &str, v: i64| -> CoreResult<()> {
            if v >= 0 {
                Ok(())
            } else {
                Err(CoreError::Config(format!("{} must be >= 0, got {}", name, v)))
            }
        };

        unit("context.gain", self.context.gain)?;
        non_negative("context.update_ms", self.context.update_ms)?;
        non_negative("context.window", self.context.window)?;
        for peer in &self.context.peers {
            if peer.name.is_empty() {
                return Err(CoreError::Config("context peer name must not be empty".into()));
            }
            unit(&format!("context.peers[{}].gain", peer.name), peer.gain)?;
            non_negative(&format!("context.peers[{}].window", peer.name), peer.window)?;
        }
        for c in &self.context.couplings {
            unit(&format!("coupling {}->{}", c.src, c.dst), c.weight)?;
        }

        if !self.reasoner.alpha.is_finite() || self.reasoner.alpha < 0.0 {
            return Err(CoreError::Config(format!(
                "reasoner.alpha must be >= 0, got {}",
                self.reasoner.alpha
            )));
        }
        unit("reasoner.context_weight", self.reasoner.context_weight)?;

        non_negative("reflection.min_gap", self.reflection.min_gap)?;
        unit("reflection.trigger_threshold", self.reflection.trigger_threshold)?;
        if self.reflection.narrative_every == 0 {
            return Err(CoreError::Config("reflection.narrative_every must be > 0".into()));
        }

        unit("goals.link_weight", self.goals.link_weight)?;

        if self.metacognition.pending_limit == 0 {
            return Err(CoreError::Config("metacognition.pending_limit must be > 0".into()));
        }
        unit("metacognition.initial_trust", self.metacognition.initial_trust)?;
        if !(0.0..=0.5).contains(&self.metacognition.trust_rate) {
            return Err(CoreError::Config(format!(
                "metacognition.trust_rate must be in [0, 0.5], got {}",
                self.metacognition.trust_rate
            )));
        }
        if self.metacognition.ece_bins == 0 {
            return Err(CoreError::Config("metacognition.ece_bins must be > 0".into()));
        }

        unit("self_revision.revise_below", self.self_revision.revise_below)?;
        unit("self_revision.risk_step", self.self_revision.risk_step)?;

        non_negative("consistency.window", self.consistency.window)?;

        unit("envelope.trust_tighten", self.envelope.trust_tighten)?;
        unit("envelope.consistency_tighten", self.envelope.consistency_tighten)?;
        unit("envelope.trust_expand", self.envelope.trust_expand)?;
        unit("envelope.consistency_expand", self.envelope.consistency_expand)?;
        non_negative("envelope.contraction_hysteresis_ms", self.envelope.contraction_hysteresis_ms)?;
        non_negative("envelope.expansion_hysteresis_ms", self.envelope.expansion_hysteresis_ms)?;
        non_negative("envelope.min_log_interval_ms", self.envelope.min_log_interval_ms)?;

        non_negative("meta_reasoner.window", self.meta_reasoner.window)?;
        unit("meta_reasoner.trust_degraded", self.meta_reasoner.trust_degraded)?;
        if !self.meta_reasoner.rmse_degraded.is_finite() || self.meta_reasoner.rmse_degraded < 0.0 {
            return Err(CoreError::Config("meta_reasoner.rmse_degraded must be >= 0".into()));
        }

        unit("ethics.risk_threshold", self.ethics.risk_threshold)?;
        unit("ethics.margin", self.ethics.margin)?;

        if self.telemetry.sample_every == 0 {
            return Err(CoreError::Config("telemetry.sample_every must be > 0".into()));
        }
        non_negative("step_budget_ms", self.step_budget_ms)?;
        non_negative("outcome_eval_window_ms", self.outcome_eval_window_ms)?;

        Ok(())
    }

    /// How long the shutdown drain may wait for due predictions
    pub fn drain_window_ms(&self) -> i64 {
        2_000.max(self.outcome_eval_window_ms.saturating_mul(3))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> CoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::Config(format!("{}: cannot parse {:?}", key, value)))
}
