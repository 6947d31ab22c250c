//! Goal system (Phase 8)
//!
//! Reflections become goal nodes hanging off a per-run root goal. Stabilities
//! decay with time (faster when coherence and trust are low) and their
//! distribution yields the coherence scalar fed back into the reasoner on the
//! next step.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::GoalConfig;
use crate::error::CoreResult;
use crate::storage::Storage;

use super::reflection::ReflectionRecordOut;

/// Coherence bonus per autonomy tier step while the envelope is valid
const TIER_COHERENCE_BONUS: f64 = 0.02;

/// Result of ingesting one reflection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalIngest {
    pub goal_id: i64,
    pub created: bool,
    pub priority: f64,
    pub stability: f64,
}

/// What one motivation update did to the goal graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotivationUpdate {
    pub decay_rate: f64,
    /// Seconds since the previous update, zero on the first
    pub dt_s: f64,
    /// Stability removed from every goal (`decay_rate * dt_s`)
    pub goal_shift: f64,
}

/// Phase 8 goal system
pub struct GoalSystem {
    store: Arc<Storage>,
    run_id: i64,
    config: GoalConfig,
    root_id: Option<i64>,
    stability: BTreeMap<i64, f64>,
    last_coherence: f64,
    last_update_ms: Option<i64>,
}

impl GoalSystem {
    pub fn new(store: Arc<Storage>, run_id: i64, config: GoalConfig) -> Self {
        Self {
            store,
            run_id,
            config,
            root_id: None,
            stability: BTreeMap::new(),
            last_coherence: 0.0,
            last_update_ms: None,
        }
    }

    /// Coherence passed to the latest motivation update
    pub fn last_coherence(&self) -> f64 {
        self.last_coherence
    }

    pub fn root_id(&self) -> Option<i64> {
        self.root_id
    }

    /// Cached stability of a non-root goal
    pub fn stability_of(&self, goal_id: i64) -> Option<f64> {
        self.stability.get(&goal_id).copied()
    }

    /// Number of cached (non-root) goals
    pub fn goal_count(&self) -> usize {
        self.stability.len()
    }

    fn ensure_root(&mut self) -> CoreResult<i64> {
        if let Some(id) = self.root_id {
            return Ok(id);
        }
        let id = match self
            .store
            .find_goal_by_description(&self.config.root_description, self.run_id)?
        {
            Some(goal) => goal.id,
            None => self
                .store
                .insert_goal_node(self.run_id, &self.config.root_description, 1.0, 1.0, None)?,
        };
        self.root_id = Some(id);
        Ok(id)
    }

    /// Turn a reflection into a new goal or reinforce the goal with its title
    pub fn ingest_reflection(
        &mut self,
        reflection: &ReflectionRecordOut,
        identity_confidence: f64,
        reputation: f64,
    ) -> CoreResult<GoalIngest> {
        let impact = if reflection.impact.is_finite() {
            reflection.impact.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let stability_bias = 1.0 + 0.1 * (identity_confidence.clamp(0.0, 1.0) - 0.5);
        let priority_bias = 1.0 + 0.1 * (reputation.clamp(0.0, 1.0) - 0.5);

        if let Some(goal) = self.store.find_goal_by_description(&reflection.title, self.run_id)? {
            let stability = ((0.5 + 0.5 * impact) * stability_bias).clamp(0.0, 1.0);
            self.update_goal_stability(goal.id, stability)?;
            tracing::debug!(goal_id = goal.id, stability, "goal reinforced by reflection");
            return Ok(GoalIngest {
                goal_id: goal.id,
                created: false,
                priority: goal.priority,
                stability,
            });
        }

        let priority = (impact * priority_bias).clamp(0.0, 1.0);
        let stability = ((0.4 + 0.4 * impact) * stability_bias).clamp(0.0, 1.0);
        let goal_id = self.create_goal(&reflection.title, priority, stability, Some(reflection.id))?;
        let root = self.ensure_root()?;
        self.link_goals(root, goal_id, self.config.link_weight)?;
        tracing::info!(run_id = self.run_id, goal_id, title = %reflection.title, "goal created");

        Ok(GoalIngest {
            goal_id,
            created: true,
            priority,
            stability,
        })
    }

    /// Persist a new goal and cache its stability
    pub fn create_goal(
        &mut self,
        description: &str,
        priority: f64,
        stability: f64,
        origin_reflection_id: Option<i64>,
    ) -> CoreResult<i64> {
        let priority = priority.clamp(0.0, 1.0);
        let stability = stability.clamp(0.0, 1.0);
        let id = self
            .store
            .insert_goal_node(self.run_id, description, priority, stability, origin_reflection_id)?;
        self.stability.insert(id, stability);
        Ok(id)
    }

    pub fn link_goals(&mut self, parent_id: i64, child_id: i64, weight: f64) -> CoreResult<i64> {
        Ok(self.store.insert_goal_edge(self.run_id, parent_id, child_id, weight)?)
    }

    pub fn update_goal_stability(&mut self, goal_id: i64, stability: f64) -> CoreResult<()> {
        let stability = stability.clamp(0.0, 1.0);
        self.store.update_goal_stability(goal_id, stability)?;
        if Some(goal_id) != self.root_id {
            self.stability.insert(goal_id, stability);
        }
        Ok(())
    }

    /// Persist a motivation row and decay stabilities by the elapsed time
    ///
    /// `decay_rate = (0.01 + 0.02 * (1 - coherence)) * (0.8 + 0.4 * (1 - trust))`
    /// per second. Store failures are logged; the cache is still decayed.
    pub fn update_motivation_state(
        &mut self,
        motivation: f64,
        coherence: f64,
        notes: &str,
        self_trust: f64,
        now_ms: i64,
    ) -> MotivationUpdate {
        let motivation = finite_or(motivation, 0.0).clamp(0.0, 1.0);
        let coherence = finite_or(coherence, 0.0).clamp(0.0, 1.0);
        let trust = finite_or(self_trust, 0.5).clamp(0.0, 1.0);

        if let Err(e) = self
            .store
            .insert_motivation_state(self.run_id, now_ms, motivation, coherence, notes)
        {
            tracing::warn!(run_id = self.run_id, "motivation row not recorded: {}", e);
        }
        self.last_coherence = coherence;

        let decay_rate = (0.01 + 0.02 * (1.0 - coherence)) * (0.8 + 0.4 * (1.0 - trust));
        let dt_s = match self.last_update_ms {
            Some(prev) => (now_ms - prev).max(0) as f64 / 1000.0,
            None => 0.0,
        };
        self.last_update_ms = Some(now_ms);

        let goal_shift = decay_rate * dt_s;
        if goal_shift > 0.0 {
            self.decay_stability(goal_shift);
        }
        MotivationUpdate {
            decay_rate,
            dt_s,
            goal_shift,
        }
    }

    /// Lower every cached stability by `d`
    pub fn decay_stability(&mut self, d: f64) {
        if !d.is_finite() || d <= 0.0 {
            return;
        }
        for (id, s) in self.stability.iter_mut() {
            *s = (*s - d).clamp(0.0, 1.0);
            if let Err(e) = self.store.update_goal_stability(*id, *s) {
                tracing::warn!(goal_id = *id, "stability decay not persisted: {}", e);
            }
        }
    }

    /// `mean * (1 - 0.5 * mean_abs_dev)` plus a tier bonus, in `[0, 1]`
    ///
    /// `envelope_tier` is the tier index while the envelope is valid. No goals
    /// means no coherence.
    pub fn calculate_goal_coherence(&self, envelope_tier: Option<usize>) -> f64 {
        if self.stability.is_empty() {
            return 0.0;
        }
        let n = self.stability.len() as f64;
        let mean = self.stability.values().sum::<f64>() / n;
        let dev = self.stability.values().map(|s| (s - mean).abs()).sum::<f64>() / n;
        let mut coh = mean * (1.0 - 0.5 * dev);
        if let Some(tier) = envelope_tier {
            coh += TIER_COHERENCE_BONUS * tier as f64;
        }
        coh.clamp(0.0, 1.0)
    }
}

fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() { v } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Storage>, GoalSystem, i64) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
        let run_id = store.begin_run(0, "{}").unwrap();
        let goals = GoalSystem::new(Arc::clone(&store), run_id, GoalConfig::default());
        (dir, store, goals, run_id)
    }

    fn reflection(store: &Storage, run_id: i64, title: &str, impact: f64) -> ReflectionRecordOut {
        let id = store.insert_reflection(run_id, 0, title, "{}", impact, None).unwrap();
        ReflectionRecordOut {
            id,
            title: title.to_string(),
            rationale_json: "{}".to_string(),
            impact,
        }
    }

    #[test]
    fn test_ingest_creates_then_reinforces() {
        let (_dir, store, mut goals, run_id) = setup();
        let r = reflection(&store, run_id, "reduce contradictions", 0.5);

        let first = goals.ingest_reflection(&r, 0.5, 0.5).unwrap();
        assert!(first.created);
        assert!((first.priority - 0.5).abs() < 1e-12);
        assert!((first.stability - 0.6).abs() < 1e-12);

        let root = goals.root_id().unwrap();
        let children = store.get_child_goals_with_descriptions(root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].2, "reduce contradictions");

        let again = goals.ingest_reflection(&r, 0.5, 0.5).unwrap();
        assert!(!again.created);
        assert_eq!(again.goal_id, first.goal_id);
        assert!((again.stability - 0.75).abs() < 1e-12);
        assert_eq!(store.list_goal_nodes(run_id).unwrap().len(), 2);
    }

    #[test]
    fn test_decay_and_first_update() {
        let (_dir, store, mut goals, run_id) = setup();
        let id = goals.create_goal("g", 0.5, 0.5, None).unwrap();

        let first = goals.update_motivation_state(0.5, 1.0, "", 1.0, 1_000);
        assert_eq!(first.dt_s, 0.0);
        assert_eq!(goals.stability_of(id), Some(0.5));

        let second = goals.update_motivation_state(0.5, 1.0, "", 1.0, 11_000);
        assert_eq!(second.dt_s, 10.0);
        assert!((second.decay_rate - 0.008).abs() < 1e-12);
        assert!((goals.stability_of(id).unwrap() - 0.42).abs() < 1e-12);
        let persisted = store.get_goal_node(id).unwrap().unwrap();
        assert!((persisted.stability - 0.42).abs() < 1e-12);
        assert_eq!(store.get_recent_motivation(run_id, 10).unwrap().len(), 2);
        assert_eq!(goals.last_coherence(), 1.0);
    }

    #[test]
    fn test_coherence() {
        let (_dir, _store, mut goals, _) = setup();
        assert_eq!(goals.calculate_goal_coherence(Some(3)), 0.0);
        goals.create_goal("a", 0.5, 0.4, None).unwrap();
        goals.create_goal("b", 0.5, 0.8, None).unwrap();
        // mean 0.6, mean abs dev 0.2
        assert!((goals.calculate_goal_coherence(None) - 0.54).abs() < 1e-12);
        assert!((goals.calculate_goal_coherence(Some(2)) - 0.58).abs() < 1e-12);
    }
}
