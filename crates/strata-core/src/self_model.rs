//! Self model
//!
//! Read-only snapshot of identity, approved personality and social state for
//! one run. Personality traits are parsed once at load time; stages read the
//! structured fields instead of searching the raw JSON.

use std::sync::Arc;

use serde_json::Value;

use crate::storage::{PersonalityRecord, SelfConceptRecord, SocialSelfRecord, Storage, StorageError};

/// Identity snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentitySnapshot {
    pub ts_ms: i64,
    pub step: i64,
    pub identity_vector_json: String,
    pub confidence: Option<f64>,
    pub notes: String,
}

/// Approved personality
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonalityTraits {
    pub id: Option<i64>,
    pub ts_ms: i64,
    pub step: i64,
    pub trait_json: String,
    /// Validated to `[-1, 1]`; out-of-range or non-numeric values are dropped
    pub risk_tolerance: Option<f64>,
    pub source: String,
    pub notes: String,
}

/// Social state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocialState {
    pub ts_ms: i64,
    pub step: i64,
    pub role: String,
    pub norm_json: String,
    pub reputation: Option<f64>,
    pub confidence: Option<f64>,
    pub notes: String,
}

impl From<SelfConceptRecord> for IdentitySnapshot {
    fn from(r: SelfConceptRecord) -> Self {
        Self {
            ts_ms: r.ts_ms,
            step: r.step,
            identity_vector_json: r.identity_vector_json,
            confidence: r.confidence,
            notes: r.notes,
        }
    }
}

impl From<PersonalityRecord> for PersonalityTraits {
    fn from(r: PersonalityRecord) -> Self {
        let risk_tolerance = parse_risk_tolerance(&r.trait_json);
        Self {
            id: Some(r.id),
            ts_ms: r.ts_ms,
            step: r.step,
            trait_json: r.trait_json,
            risk_tolerance,
            source: r.source,
            notes: r.notes,
        }
    }
}

impl From<SocialSelfRecord> for SocialState {
    fn from(r: SocialSelfRecord) -> Self {
        Self {
            ts_ms: r.ts_ms,
            step: r.step,
            role: r.role,
            norm_json: r.norm_json,
            reputation: r.reputation,
            confidence: r.confidence,
            notes: r.notes,
        }
    }
}

/// Extract `risk_tolerance` from a trait document
pub fn parse_risk_tolerance(trait_json: &str) -> Option<f64> {
    let value: Value = match serde_json::from_str(trait_json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("personality trait_json is not valid JSON: {}", e);
            return None;
        }
    };
    let risk = value.get("risk_tolerance")?.as_f64()?;
    if (-1.0..=1.0).contains(&risk) {
        Some(risk)
    } else {
        tracing::warn!(risk, "risk_tolerance outside [-1, 1], ignored");
        None
    }
}

/// Loaded self model of one run
pub struct SelfModel {
    store: Arc<Storage>,
    run_id: Option<i64>,
    loaded: bool,
    identity: IdentitySnapshot,
    personality: PersonalityTraits,
    social: SocialState,
}

impl SelfModel {
    pub fn new(store: Arc<Storage>) -> Self {
        Self {
            store,
            run_id: None,
            loaded: false,
            identity: IdentitySnapshot::default(),
            personality: PersonalityTraits::default(),
            social: SocialState::default(),
        }
    }

    /// Read the latest identity, approved personality and social rows
    ///
    /// Missing rows leave default snapshots behind; the model still counts
    /// as loaded.
    pub fn load_for_run(&mut self, run_id: i64) -> Result<(), StorageError> {
        let identity = self.store.get_latest_self_concept(run_id)?;
        let personality = self.store.get_latest_approved_personality(run_id)?;
        let social = self.store.get_latest_social_self(run_id)?;

        self.identity = identity.map(Into::into).unwrap_or_default();
        self.personality = personality.map(Into::into).unwrap_or_default();
        self.social = social.map(Into::into).unwrap_or_default();
        self.run_id = Some(run_id);
        self.loaded = true;

        tracing::debug!(
            run_id,
            identity_confidence = ?self.identity.confidence,
            risk_tolerance = ?self.personality.risk_tolerance,
            reputation = ?self.social.reputation,
            "self model loaded"
        );
        Ok(())
    }

    pub fn identity(&self) -> &IdentitySnapshot {
        &self.identity
    }

    pub fn personality(&self) -> &PersonalityTraits {
        &self.personality
    }

    pub fn social(&self) -> &SocialState {
        &self.social
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    /// Identity confidence, neutral 0.5 when unknown
    pub fn identity_confidence(&self) -> f64 {
        self.identity.confidence.map(|c| c.clamp(0.0, 1.0)).unwrap_or(0.5)
    }

    /// Reputation, neutral 0.5 when unknown
    pub fn reputation(&self) -> f64 {
        self.social.reputation.map(|r| r.clamp(0.0, 1.0)).unwrap_or(0.5)
    }

    /// Risk tolerance, neutral 0 when unknown
    pub fn risk_tolerance(&self) -> f64 {
        self.personality.risk_tolerance.unwrap_or(0.0)
    }
}
