//! Row types
//!
//! One struct per persisted entity. Timestamps are monotonic milliseconds;
//! JSON columns are kept as strings so callers decide when to parse them.

use serde::{Deserialize, Serialize};

/// Kind of a run lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    /// Run started
    Start,
    /// Clean exit
    Exit,
    /// Fatal failure, the run is over
    Fatal,
    /// Process signal received
    Signal,
    /// Periodic liveness marker
    Heartbeat,
    /// Non-fatal stage failure
    Warning,
    /// Error that did not stop the loop
    Error,
}

impl RunEventKind {
    /// Column value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Exit => "exit",
            Self::Fatal => "fatal",
            Self::Signal => "signal",
            Self::Heartbeat => "heartbeat",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Parse a column value
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "exit" => Some(Self::Exit),
            "fatal" => Some(Self::Fatal),
            "signal" => Some(Self::Signal),
            "heartbeat" => Some(Self::Heartbeat),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RUN LIFECYCLE
// ============================================================================

/// A run groups every other record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_ms: i64,
    pub ended_ms: Option<i64>,
    pub metadata_json: String,
}

/// Lifecycle event attached to a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEventRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub kind: String,
    pub message: String,
    pub exit_code: Option<i64>,
    pub rss_mb: Option<f64>,
    pub gpu_mb: Option<f64>,
}

/// Episode row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub id: i64,
    pub run_id: i64,
    pub name: String,
    pub start_ms: i64,
    pub end_ms: Option<i64>,
    pub steps: i64,
    pub success: Option<bool>,
    #[serde(rename = "return")]
    pub episode_return: f64,
}

/// Experience row (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceRecord {
    pub id: i64,
    pub run_id: i64,
    pub episode_id: Option<i64>,
    pub ts_ms: i64,
    pub step: i64,
    pub tag: String,
    pub input_json: String,
    pub output_json: String,
    pub significant: bool,
}

/// Reward row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub reward: f64,
    pub source: String,
    pub context_json: String,
}

/// Episode totals over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Episodes with `end_ms` set
    pub finished_episodes: i64,
    pub successes: i64,
    pub failures: i64,
    pub total_return: f64,
    pub total_steps: i64,
}

// ============================================================================
// DECISION LAYER
// ============================================================================

/// Persisted candidate option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub source: String,
    pub payload_json: String,
    pub confidence: f64,
    pub selected: bool,
}

/// Running-mean statistics for one option row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionStatsRecord {
    pub option_id: i64,
    pub n: i64,
    pub mean: f64,
    pub last_ms: i64,
}

/// Intent graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentNodeRecord {
    pub id: i64,
    pub ts_ms: i64,
    pub kind: String,
    pub payload_json: String,
    pub confidence: f64,
    pub source: String,
    pub run_id: i64,
}

/// Intent graph edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentEdgeRecord {
    pub id: i64,
    pub ts_ms: i64,
    pub src_node: i64,
    pub dst_node: i64,
    pub kind: String,
    pub strength: f64,
    pub payload_json: String,
    pub run_id: i64,
}

/// Outcome verification row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: i64,
    pub ts_ms: i64,
    pub fact_id: i64,
    pub kind: String,
    pub contradiction: bool,
    pub details_json: String,
    pub run_id: i64,
    /// Episode open when the outcome was observed
    pub episode_id: Option<i64>,
}

/// Pre/post statistics of one autonomy-modulated scoring pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyModulationRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub pre_entropy: f64,
    pub post_entropy: f64,
    pub rank_shift_mean: f64,
    pub rank_shift_max: i64,
    pub exploration_bias: f64,
    pub autonomy_score: f64,
    pub veto_reason: String,
    pub driver_json: String,
}

// ============================================================================
// REFLECTION LAYER
// ============================================================================

/// Reflection row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub title: String,
    pub rationale_json: String,
    pub impact: f64,
    pub episode_id: Option<i64>,
}

/// Narrative prediction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativePredictionRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub reflection_id: i64,
    pub predicted_coherence_delta: f64,
    pub confidence: f64,
    pub horizon_ms: i64,
    pub targets_json: String,
    pub resolved: bool,
    pub metacognition_id: Option<i64>,
}

/// Metacognition row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetacognitionRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub self_trust: f64,
    pub narrative_rmse: f64,
    pub goal_mae: f64,
    pub ece: Option<f64>,
    pub notes: String,
    pub delta_trust: Option<f64>,
    pub delta_coherence: Option<f64>,
    pub delta_goal_accuracy: Option<f64>,
}

/// Input for a new metacognition row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMetacognition {
    pub ts_ms: i64,
    pub self_trust: f64,
    pub narrative_rmse: f64,
    pub goal_mae: f64,
    pub ece: Option<f64>,
    pub notes: String,
    pub delta_trust: Option<f64>,
    pub delta_coherence: Option<f64>,
    pub delta_goal_accuracy: Option<f64>,
}

/// Goal node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalNodeRecord {
    pub id: i64,
    pub run_id: i64,
    pub description: String,
    pub priority: f64,
    pub stability: f64,
    pub origin_reflection_id: Option<i64>,
}

/// Motivation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotivationRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub motivation: f64,
    pub coherence: f64,
    pub notes: String,
}

/// Self-explanation row (phase 10)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfExplanationRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub metacognition_id: i64,
    pub text: String,
    pub drivers_json: String,
}

/// Self-revision row (phase 11)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfRevisionRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub metacognition_id: Option<i64>,
    pub personality_id: Option<i64>,
    pub revision_json: String,
    pub trust_before: f64,
    pub evaluated: bool,
    pub evaluated_ms: Option<i64>,
    pub trust_delta: Option<f64>,
}

// ============================================================================
// GOVERNANCE
// ============================================================================

/// Ethics regulator decision row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthicsRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub decision: String,
    pub driver_json: String,
}

/// Autonomy envelope row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonomyEnvelopeRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub decision: String,
    pub tier: String,
    pub autonomy_score: f64,
    pub valid: bool,
    pub driver_json: String,
}

/// Consistency row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub self_consistency: f64,
    pub samples: i64,
    pub driver_json: String,
}

/// Meta-reasoner row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaReasonerRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub decision: String,
    pub mean_trust: f64,
    pub mean_rmse: f64,
    pub driver_json: String,
}

/// Attempted external action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub kind: String,
    pub success: bool,
    pub reason: String,
    pub payload_json: String,
}

/// Global context stream sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLogRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub sample: f64,
    pub gain: f64,
    pub update_ms: i64,
    pub window: i64,
    pub label: String,
}

/// Peer context stream sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPeerLogRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub peer: String,
    pub sample: f64,
    pub gain: f64,
    pub update_ms: i64,
    pub window: i64,
    pub label: String,
    pub mode: String,
    pub lambda: f64,
    pub kappa: f64,
}

/// Input for a peer context log row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewContextPeerLog {
    pub ts_ms: i64,
    pub peer: String,
    pub sample: f64,
    pub gain: f64,
    pub update_ms: i64,
    pub window: i64,
    pub label: String,
    pub mode: String,
    pub lambda: f64,
    pub kappa: f64,
}

// ============================================================================
// SELF MODEL
// ============================================================================

/// Identity snapshot row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfConceptRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub identity_vector_json: String,
    pub confidence: Option<f64>,
    pub notes: String,
}

/// Personality row (approved snapshot or pending proposal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub trait_json: String,
    pub approved: bool,
    pub source: String,
    pub notes: String,
    pub approved_ms: Option<i64>,
}

/// Social self row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialSelfRecord {
    pub id: i64,
    pub run_id: i64,
    pub ts_ms: i64,
    pub step: i64,
    pub role: String,
    pub norm_json: String,
    pub reputation: Option<f64>,
    pub confidence: Option<f64>,
    pub notes: String,
}
