//! Self-revision (Phase 11)
//!
//! Evaluates the previous revision against the trust observed since, then,
//! when trust is low and nothing is awaiting review, proposes a more cautious
//! personality. Proposals are written unapproved; the ethics regulator decides
//! whether they take effect.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::cognition::{MetacogEvent, MetacogObserver};
use crate::config::SelfRevisionConfig;
use crate::error::CoreResult;
use crate::self_model::parse_risk_tolerance;
use crate::storage::Storage;

/// What one observation did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RevisionOutcome {
    /// Revision closed on this call with its trust delta
    pub evaluated: Option<(i64, f64)>,
    /// `(self_revision_id, personality_id)` of a new proposal
    pub proposed: Option<(i64, i64)>,
}

pub struct SelfRevision {
    store: Arc<Storage>,
    run_id: i64,
    config: SelfRevisionConfig,
    /// Risk tolerance from the self model, used when no personality is approved
    fallback_risk: f64,
}

impl SelfRevision {
    pub fn new(store: Arc<Storage>, run_id: i64, config: SelfRevisionConfig, fallback_risk: f64) -> Self {
        Self {
            store,
            run_id,
            config,
            fallback_risk,
        }
    }

    pub fn revise(&mut self, event: &MetacogEvent) -> CoreResult<RevisionOutcome> {
        let mut outcome = RevisionOutcome::default();

        if let Some(id) = self
            .store
            .get_latest_unevaluated_self_revision_id(self.run_id, event.ts_ms)?
        {
            if let Some(rev) = self.store.get_self_revision(id)? {
                let delta = event.self_trust - rev.trust_before;
                self.store.mark_self_revision_evaluated(id, event.ts_ms, delta)?;
                tracing::info!(run_id = self.run_id, revision_id = id, trust_delta = delta, "self revision evaluated");
                outcome.evaluated = Some((id, delta));
            }
        }

        if !self.config.enabled || event.self_trust >= self.config.revise_below {
            return Ok(outcome);
        }
        if self.store.get_latest_pending_personality_proposal(self.run_id)?.is_some() {
            tracing::debug!(run_id = self.run_id, "personality proposal already pending");
            return Ok(outcome);
        }

        let approved = self.store.get_latest_approved_personality(self.run_id)?;
        let (mut traits, base_risk) = match &approved {
            Some(p) => {
                let traits = serde_json::from_str::<Value>(&p.trait_json)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| json!({}));
                let risk = parse_risk_tolerance(&p.trait_json).unwrap_or(self.fallback_risk);
                (traits, risk)
            }
            None => (json!({}), self.fallback_risk),
        };
        let new_risk = (base_risk - self.config.risk_step).clamp(-1.0, 1.0);
        traits["risk_tolerance"] = json!(new_risk);

        let notes = format!("self-trust {:.3} below {:.3}", event.self_trust, self.config.revise_below);
        let personality_id = self.store.insert_personality_proposal(
            self.run_id,
            event.ts_ms,
            event.step,
            &traits.to_string(),
            "phase11",
            &notes,
        )?;
        let revision_json = json!({
            "field": "risk_tolerance",
            "from": base_risk,
            "to": new_risk,
            "based_on": approved.as_ref().map(|p| p.id),
        })
        .to_string();
        let revision_id = self.store.insert_self_revision(
            self.run_id,
            event.ts_ms,
            Some(event.metacognition_id),
            Some(personality_id),
            &revision_json,
            event.self_trust,
        )?;
        tracing::info!(
            run_id = self.run_id,
            revision_id,
            personality_id,
            from = base_risk,
            to = new_risk,
            "personality revision proposed"
        );
        outcome.proposed = Some((revision_id, personality_id));
        Ok(outcome)
    }
}

impl MetacogObserver for SelfRevision {
    fn stage(&self) -> &'static str {
        "phase11"
    }

    fn observe(&mut self, event: &MetacogEvent) -> CoreResult<()> {
        self.revise(event).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewMetacognition;
    use tempfile::TempDir;

    fn event(store: &Storage, run_id: i64, ts_ms: i64, self_trust: f64) -> MetacogEvent {
        let metacognition_id = store
            .insert_metacognition(
                run_id,
                &NewMetacognition {
                    ts_ms,
                    self_trust,
                    ..Default::default()
                },
            )
            .unwrap();
        MetacogEvent {
            metacognition_id,
            ts_ms,
            step: 3,
            self_trust,
            prev_trust: 0.5,
            narrative_rmse: 0.5,
            goal_mae: 0.0,
            ece: None,
            actual_coherence: 0.5,
            resolved: 1,
            notes: String::new(),
        }
    }

    #[test]
    fn test_propose_then_evaluate() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
        let run_id = store.begin_run(0, "{}").unwrap();
        let seed = store
            .insert_personality_proposal(run_id, 0, 0, r#"{"risk_tolerance": 0.2, "openness": 0.5}"#, "seed", "")
            .unwrap();
        store.approve_personality_proposal(seed, "seed", "", 0).unwrap();

        let mut rev = SelfRevision::new(Arc::clone(&store), run_id, SelfRevisionConfig::default(), 0.0);
        let out = rev.revise(&event(&store, run_id, 10, 0.3)).unwrap();
        assert!(out.evaluated.is_none());
        let (revision_id, personality_id) = out.proposed.unwrap();

        let proposal = store.get_personality(personality_id).unwrap().unwrap();
        assert!(!proposal.approved);
        assert_eq!(proposal.source, "phase11");
        assert_eq!(proposal.step, 3);
        assert!((parse_risk_tolerance(&proposal.trait_json).unwrap() - 0.1).abs() < 1e-12);
        assert!(proposal.trait_json.contains("openness"));

        // Still pending: no second proposal, but the first revision gets evaluated
        let out = rev.revise(&event(&store, run_id, 20, 0.35)).unwrap();
        assert!(out.proposed.is_none());
        let (evaluated, delta) = out.evaluated.unwrap();
        assert_eq!(evaluated, revision_id);
        assert!((delta - 0.05).abs() < 1e-12);
        assert!(store.get_self_revision(revision_id).unwrap().unwrap().evaluated);
    }

    #[test]
    fn test_no_proposal_when_trust_ok() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
        let run_id = store.begin_run(0, "{}").unwrap();
        let mut rev = SelfRevision::new(Arc::clone(&store), run_id, SelfRevisionConfig::default(), 0.0);
        let out = rev.revise(&event(&store, run_id, 10, 0.8)).unwrap();
        assert_eq!(out, RevisionOutcome::default());
        assert!(store.list_self_revisions(run_id).unwrap().is_empty());
    }
}
