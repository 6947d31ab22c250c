//! Ethics regulator (Phase 15)
//!
//! Turns a context sample into allow/review/deny against a risk threshold with
//! a symmetric margin, and uses the same decision to gate personality
//! proposals.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cognition::{MetacogEvent, MetacogObserver};
use crate::config::EthicsConfig;
use crate::context::ContextService;
use crate::error::CoreResult;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EthicsDecision {
    Allow,
    Review,
    Deny,
}

impl EthicsDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Review => "review",
            Self::Deny => "deny",
        }
    }

    /// Classify a sample against `threshold ± margin`
    pub fn from_sample(sample: f64, threshold: f64, margin: f64) -> Self {
        if sample >= threshold + margin {
            Self::Deny
        } else if sample >= threshold - margin {
            Self::Review
        } else {
            Self::Allow
        }
    }
}

/// A persisted ethics decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EthicsVerdict {
    pub id: i64,
    pub decision: EthicsDecision,
    pub sample: f64,
}

/// Result of reviewing a personality proposal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalReview {
    pub personality_id: i64,
    pub verdict: EthicsVerdict,
    pub approved: bool,
}

pub struct EthicsRegulator {
    store: Arc<Storage>,
    run_id: i64,
    config: EthicsConfig,
    context: Arc<ContextService>,
    last: Option<EthicsDecision>,
}

impl EthicsRegulator {
    pub fn new(store: Arc<Storage>, run_id: i64, config: EthicsConfig, context: Arc<ContextService>) -> Self {
        Self {
            store,
            run_id,
            config,
            context,
            last: None,
        }
    }

    pub fn last_decision(&self) -> Option<EthicsDecision> {
        self.last
    }

    /// The latest decision was a deny
    pub fn hard_block(&self) -> bool {
        self.last == Some(EthicsDecision::Deny)
    }

    /// Sample context for `label`, decide and persist
    pub fn run_for_latest(&mut self, label: &str, now_ms: i64) -> CoreResult<EthicsVerdict> {
        let sample = self.context.sample_context(label);
        let params = self.context.context_params();
        if let Err(e) = self.store.insert_context_log(
            self.run_id,
            now_ms,
            sample,
            params.gain,
            params.update_ms,
            params.window as i64,
            label,
        ) {
            tracing::warn!(run_id = self.run_id, label, "context sample not recorded: {}", e);
        }

        let decision = EthicsDecision::from_sample(sample, self.config.risk_threshold, self.config.margin);

        let envelope = match self.store.get_recent_autonomy_envelope(self.run_id, 1) {
            Ok(rows) => rows.into_iter().find(|r| r.valid).map(|r| {
                json!({
                    "tier": r.tier,
                    "decision": r.decision,
                    "autonomy_score": r.autonomy_score,
                    "ts_ms": r.ts_ms,
                })
            }),
            Err(e) => {
                tracing::warn!(run_id = self.run_id, "envelope summary unavailable: {}", e);
                None
            }
        };
        let mut driver = json!({
            "label": label,
            "sample": sample,
            "risk_threshold": self.config.risk_threshold,
            "margin": self.config.margin,
            "context": {
                "gain": params.gain,
                "update_ms": params.update_ms,
                "window": params.window,
            },
        });
        if let Some(summary) = envelope {
            driver["autonomy_envelope"] = summary;
        }

        let id = self
            .store
            .insert_ethics_regulator(self.run_id, now_ms, decision.as_str(), &driver.to_string())?;
        self.last = Some(decision);
        if decision != EthicsDecision::Allow {
            tracing::debug!(run_id = self.run_id, label, sample, decision = decision.as_str(), "ethics gate");
        }
        Ok(EthicsVerdict { id, decision, sample })
    }

    /// Decide on a personality proposal; approves it only on allow
    pub fn review_personality_proposal(
        &mut self,
        personality_id: i64,
        label: &str,
        rationale: &str,
        now_ms: i64,
    ) -> CoreResult<ProposalReview> {
        let verdict = self.run_for_latest(label, now_ms)?;
        let approved = verdict.decision == EthicsDecision::Allow;
        if approved {
            self.store
                .approve_personality_proposal(personality_id, "phase15", rationale, now_ms)?;
            tracing::info!(run_id = self.run_id, personality_id, "personality proposal approved");
        }
        Ok(ProposalReview {
            personality_id,
            verdict,
            approved,
        })
    }
}

impl MetacogObserver for EthicsRegulator {
    fn stage(&self) -> &'static str {
        "phase15"
    }

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()> {
        let Some(proposal) = self.store.get_latest_pending_personality_proposal(self.run_id)? else {
            return Ok(());
        };
        let label = self.config.review_label.clone();
        let rationale = format!("reviewed at self-trust {:.3}", event.self_trust);
        self.review_personality_proposal(proposal.id, &label, &rationale, event.ts_ms)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::context::FixedSource;
    use tempfile::TempDir;

    fn setup(sample: f64) -> (TempDir, Arc<Storage>, EthicsRegulator, i64) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
        let run_id = store.begin_run(0, "{}").unwrap();
        let context = Arc::new(ContextService::with_source(
            Arc::new(ManualClock::new(0)),
            Box::new(FixedSource(sample)),
        ));
        let ethics = EthicsRegulator::new(Arc::clone(&store), run_id, EthicsConfig::default(), context);
        (dir, store, ethics, run_id)
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(EthicsDecision::from_sample(0.70, 0.6, 0.05), EthicsDecision::Deny);
        assert_eq!(EthicsDecision::from_sample(0.60, 0.6, 0.05), EthicsDecision::Review);
        assert_eq!(EthicsDecision::from_sample(0.50, 0.6, 0.05), EthicsDecision::Allow);
    }

    #[test]
    fn test_deny_logs_context_and_decision() {
        let (_dir, store, mut ethics, run_id) = setup(0.70);
        let v = ethics.run_for_latest("click", 5).unwrap();
        assert_eq!(v.decision, EthicsDecision::Deny);
        assert!(ethics.hard_block());

        let logs = store.list_context_logs(run_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].label, "click");
        let rows = store.get_recent_ethics_regulator(run_id, 5).unwrap();
        assert_eq!(rows[0].decision, "deny");
        let driver: serde_json::Value = serde_json::from_str(&rows[0].driver_json).unwrap();
        assert_eq!(driver["sample"], 0.70);
        assert!(driver.get("autonomy_envelope").is_none());
    }

    #[test]
    fn test_review_approves_only_on_allow() {
        let (_dir, store, mut ethics, run_id) = setup(0.1);
        let pid = store
            .insert_personality_proposal(run_id, 1, 0, r#"{"risk_tolerance": 0.0}"#, "phase11", "")
            .unwrap();
        let review = ethics.review_personality_proposal(pid, "personality_review", "ok", 2).unwrap();
        assert!(review.approved);
        let row = store.get_personality(pid).unwrap().unwrap();
        assert!(row.approved);
        assert_eq!(row.source, "phase15");

        let (_dir2, store2, mut strict, run2) = setup(0.9);
        let pid2 = store2
            .insert_personality_proposal(run2, 1, 0, "{}", "phase11", "")
            .unwrap();
        assert!(!strict.review_personality_proposal(pid2, "personality_review", "", 2).unwrap().approved);
        assert!(store2.get_latest_pending_personality_proposal(run2).unwrap().is_some());
    }
}
