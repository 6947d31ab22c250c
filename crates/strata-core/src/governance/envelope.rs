//! Autonomy envelope (Phase 13)
//!
//! A four-tier ladder that moves one step at a time: down when trust or
//! consistency falls below its tighten threshold, up when both clear their
//! expand thresholds. Each direction has its own hysteresis so the tier cannot
//! oscillate faster than the configured interval.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cognition::{MetacogEvent, MetacogObserver};
use crate::config::EnvelopeConfig;
use crate::error::CoreResult;
use crate::storage::Storage;

/// Linearly ordered autonomy tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyTier {
    None,
    Shadow,
    Conditional,
    Full,
}

impl AutonomyTier {
    const LADDER: [AutonomyTier; 4] = [Self::None, Self::Shadow, Self::Conditional, Self::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Shadow => "shadow",
            Self::Conditional => "conditional",
            Self::Full => "full",
        }
    }

    /// Position on the ladder, `0` for `None`
    pub fn index(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Shadow => 1,
            Self::Conditional => 2,
            Self::Full => 3,
        }
    }

    /// `index / 3`
    pub fn score(&self) -> f64 {
        self.index() as f64 / 3.0
    }

    pub fn lower(&self) -> Self {
        Self::LADDER[self.index().saturating_sub(1)]
    }

    pub fn raise(&self) -> Self {
        Self::LADDER[(self.index() + 1).min(3)]
    }
}

/// What the envelope decided on its last evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeDecision {
    /// Tier is at the bottom; nothing may act
    Freeze,
    Tighten,
    Hold,
    Expand,
}

impl EnvelopeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Freeze => "freeze",
            Self::Tighten => "tighten",
            Self::Hold => "hold",
            Self::Expand => "expand",
        }
    }
}

/// Envelope state after one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeState {
    pub decision: EnvelopeDecision,
    pub tier: AutonomyTier,
    pub autonomy_score: f64,
    pub valid: bool,
    /// Row written for this evaluation, if the log interval allowed one
    pub logged: Option<i64>,
}

/// Phase 13 autonomy envelope
pub struct AutonomyEnvelope {
    store: Arc<Storage>,
    run_id: i64,
    config: EnvelopeConfig,
    tier: AutonomyTier,
    decision: EnvelopeDecision,
    valid: bool,
    last_tighten_ms: Option<i64>,
    last_expand_ms: Option<i64>,
    last_log_ms: Option<i64>,
}

impl AutonomyEnvelope {
    pub fn new(store: Arc<Storage>, run_id: i64, config: EnvelopeConfig) -> Self {
        let tier = config.start_tier;
        Self {
            store,
            run_id,
            config,
            tier,
            decision: EnvelopeDecision::Hold,
            valid: false,
            last_tighten_ms: None,
            last_expand_ms: None,
            last_log_ms: None,
        }
    }

    pub fn tier(&self) -> AutonomyTier {
        self.tier
    }

    /// True once the envelope has been evaluated at least once
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Tier score while valid, zero before the first evaluation
    pub fn autonomy_score(&self) -> f64 {
        if self.valid { self.tier.score() } else { 0.0 }
    }

    /// Tier index while valid
    pub fn valid_tier_index(&self) -> Option<usize> {
        self.valid.then(|| self.tier.index())
    }

    /// Decision the action gate should apply right now
    pub fn gate_decision(&self) -> EnvelopeDecision {
        if self.tier == AutonomyTier::None {
            EnvelopeDecision::Freeze
        } else {
            self.decision
        }
    }

    fn elapsed(since: Option<i64>, now_ms: i64, hysteresis_ms: i64) -> bool {
        since.is_none_or(|t| now_ms - t >= hysteresis_ms)
    }

    /// Move at most one tier given current trust and consistency
    pub fn evaluate(&mut self, self_trust: f64, consistency: f64, now_ms: i64) -> CoreResult<EnvelopeState> {
        let trust = if self_trust.is_finite() { self_trust.clamp(0.0, 1.0) } else { 0.0 };
        let cons = if consistency.is_finite() { consistency.clamp(0.0, 1.0) } else { 0.0 };
        let prev_tier = self.tier;

        let wants_tighten = trust < self.config.trust_tighten || cons < self.config.consistency_tighten;
        let wants_expand = trust >= self.config.trust_expand && cons >= self.config.consistency_expand;

        let decision = if wants_tighten {
            if self.tier == AutonomyTier::None {
                EnvelopeDecision::Freeze
            } else if Self::elapsed(self.last_tighten_ms, now_ms, self.config.contraction_hysteresis_ms) {
                self.tier = self.tier.lower();
                self.last_tighten_ms = Some(now_ms);
                EnvelopeDecision::Tighten
            } else {
                EnvelopeDecision::Hold
            }
        } else if wants_expand
            && self.tier < AutonomyTier::Full
            && Self::elapsed(self.last_expand_ms, now_ms, self.config.expansion_hysteresis_ms)
        {
            self.tier = self.tier.raise();
            self.last_expand_ms = Some(now_ms);
            EnvelopeDecision::Expand
        } else {
            EnvelopeDecision::Hold
        };
        self.decision = decision;
        self.valid = true;

        if decision != EnvelopeDecision::Hold {
            tracing::info!(
                run_id = self.run_id,
                decision = decision.as_str(),
                from = prev_tier.as_str(),
                to = self.tier.as_str(),
                "autonomy envelope moved"
            );
        }

        let logged = if Self::elapsed(self.last_log_ms, now_ms, self.config.min_log_interval_ms) {
            let driver = json!({
                "self_trust": trust,
                "self_consistency": cons,
                "prev_tier": prev_tier.as_str(),
                "trust_tighten": self.config.trust_tighten,
                "consistency_tighten": self.config.consistency_tighten,
                "trust_expand": self.config.trust_expand,
                "consistency_expand": self.config.consistency_expand,
            })
            .to_string();
            let id = self.store.insert_autonomy_envelope(
                self.run_id,
                now_ms,
                decision.as_str(),
                self.tier.as_str(),
                self.tier.score(),
                true,
                &driver,
            )?;
            self.last_log_ms = Some(now_ms);
            Some(id)
        } else {
            None
        };

        Ok(EnvelopeState {
            decision,
            tier: self.tier,
            autonomy_score: self.tier.score(),
            valid: true,
            logged,
        })
    }
}

impl MetacogObserver for AutonomyEnvelope {
    fn stage(&self) -> &'static str {
        "phase13"
    }

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()> {
        // Consistency runs first in the dispatch order; without a row, assume consistent
        let consistency = self
            .store
            .get_recent_consistency(self.run_id, 1)?
            .first()
            .map(|r| r.self_consistency)
            .unwrap_or(1.0);
        self.evaluate(event.self_trust, consistency, event.ts_ms)?;
        Ok(())
    }
}
