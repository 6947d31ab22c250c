//! Reflection-layer records: reflections, narrative predictions, metacognition,
//! goals, motivation, self explanations and self revisions.

use rusqlite::{params, OptionalExtension};

use super::records::{
    GoalNodeRecord, MetacognitionRecord, MotivationRecord, NarrativePredictionRecord,
    NewMetacognition, ReflectionRecord, SelfExplanationRecord, SelfRevisionRecord,
};
use super::sqlite::{Result, Storage, StorageError};

impl Storage {
    // ========================================================================
    // REFLECTIONS & NARRATIVE PREDICTIONS
    // ========================================================================

    /// Append a reflection
    pub fn insert_reflection(
        &self,
        run_id: i64,
        ts_ms: i64,
        title: &str,
        rationale_json: &str,
        impact: f64,
        episode_id: Option<i64>,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO reflections (run_id, ts_ms, title, rationale_json, impact, episode_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, ts_ms, title, rationale_json, impact, episode_id],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Reflections of a run in insertion order
    pub fn list_reflections(&self, run_id: i64) -> Result<Vec<ReflectionRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, title, rationale_json, impact, episode_id
             FROM reflections WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ReflectionRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    title: row.get(3)?,
                    rationale_json: row.get(4)?,
                    impact: row.get(5)?,
                    episode_id: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a narrative prediction
    #[allow(clippy::too_many_arguments)]
    pub fn insert_narrative_prediction(
        &self,
        run_id: i64,
        ts_ms: i64,
        reflection_id: i64,
        predicted_coherence_delta: f64,
        confidence: f64,
        horizon_ms: i64,
        targets_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO narrative_predictions (run_id, ts_ms, reflection_id, predicted_coherence_delta,
                 confidence, horizon_ms, targets_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                ts_ms,
                reflection_id,
                predicted_coherence_delta,
                confidence,
                horizon_ms,
                targets_json
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Mark predictions resolved by one metacognition row
    pub fn mark_narrative_predictions_resolved(&self, ids: &[i64], metacognition_id: i64) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE narrative_predictions SET resolved = 1, metacognition_id = ?1
                 WHERE id = ?2 AND resolved = 0",
            )?;
            for id in ids {
                stmt.execute(params![metacognition_id, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Narrative predictions of a run in insertion order
    pub fn list_narrative_predictions(&self, run_id: i64) -> Result<Vec<NarrativePredictionRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, reflection_id, predicted_coherence_delta, confidence,
                    horizon_ms, targets_json, resolved, metacognition_id
             FROM narrative_predictions WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(NarrativePredictionRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    reflection_id: row.get(3)?,
                    predicted_coherence_delta: row.get(4)?,
                    confidence: row.get(5)?,
                    horizon_ms: row.get(6)?,
                    targets_json: row.get(7)?,
                    resolved: row.get(8)?,
                    metacognition_id: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // METACOGNITION
    // ========================================================================

    /// Append a metacognition row
    pub fn insert_metacognition(&self, run_id: i64, row: &NewMetacognition) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO metacognition (run_id, ts_ms, self_trust, narrative_rmse, goal_mae, ece, notes,
                 delta_trust, delta_coherence, delta_goal_accuracy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                row.ts_ms,
                row.self_trust,
                row.narrative_rmse,
                row.goal_mae,
                row.ece,
                row.notes,
                row.delta_trust,
                row.delta_coherence,
                row.delta_goal_accuracy,
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Newest metacognition rows first, at most `limit`
    pub fn get_recent_metacognition(&self, run_id: i64, limit: usize) -> Result<Vec<MetacognitionRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, self_trust, narrative_rmse, goal_mae, ece, notes,
                    delta_trust, delta_coherence, delta_goal_accuracy
             FROM metacognition WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(MetacognitionRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    self_trust: row.get(3)?,
                    narrative_rmse: row.get(4)?,
                    goal_mae: row.get(5)?,
                    ece: row.get(6)?,
                    notes: row.get(7)?,
                    delta_trust: row.get(8)?,
                    delta_coherence: row.get(9)?,
                    delta_goal_accuracy: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // SELF EXPLANATION & SELF REVISION
    // ========================================================================

    /// Append a self explanation
    pub fn insert_self_explanation(
        &self,
        run_id: i64,
        ts_ms: i64,
        metacognition_id: i64,
        text: &str,
        drivers_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO self_explanations (run_id, ts_ms, metacognition_id, text, drivers_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, ts_ms, metacognition_id, text, drivers_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Self explanations of a run in insertion order
    pub fn list_self_explanations(&self, run_id: i64) -> Result<Vec<SelfExplanationRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, metacognition_id, text, drivers_json
             FROM self_explanations WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(SelfExplanationRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    metacognition_id: row.get(3)?,
                    text: row.get(4)?,
                    drivers_json: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a proposed self revision
    #[allow(clippy::too_many_arguments)]
    pub fn insert_self_revision(
        &self,
        run_id: i64,
        ts_ms: i64,
        metacognition_id: Option<i64>,
        personality_id: Option<i64>,
        revision_json: &str,
        trust_before: f64,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO self_revisions (run_id, ts_ms, metacognition_id, personality_id, revision_json, trust_before)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, ts_ms, metacognition_id, personality_id, revision_json, trust_before],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Latest revision written before `before_ts` that has not been evaluated
    pub fn get_latest_unevaluated_self_revision_id(&self, run_id: i64, before_ts: i64) -> Result<Option<i64>> {
        let reader = self.reader()?;
        let id = reader
            .query_row(
                "SELECT id FROM self_revisions
                 WHERE run_id = ?1 AND evaluated = 0 AND ts_ms < ?2
                 ORDER BY ts_ms DESC, id DESC LIMIT 1",
                params![run_id, before_ts],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Close a revision with the trust change observed since it was proposed
    pub fn mark_self_revision_evaluated(&self, revision_id: i64, evaluated_ms: i64, trust_delta: f64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE self_revisions SET evaluated = 1, evaluated_ms = ?1, trust_delta = ?2
             WHERE id = ?3 AND evaluated = 0",
            params![evaluated_ms, trust_delta, revision_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("unevaluated self revision {}", revision_id)));
        }
        Ok(())
    }

    /// Fetch one self revision
    pub fn get_self_revision(&self, revision_id: i64) -> Result<Option<SelfRevisionRecord>> {
        let reader = self.reader()?;
        let rev = reader
            .query_row(
                "SELECT id, run_id, ts_ms, metacognition_id, personality_id, revision_json,
                        trust_before, evaluated, evaluated_ms, trust_delta
                 FROM self_revisions WHERE id = ?1",
                params![revision_id],
                Self::row_to_self_revision,
            )
            .optional()?;
        Ok(rev)
    }

    /// Self revisions of a run in insertion order
    pub fn list_self_revisions(&self, run_id: i64) -> Result<Vec<SelfRevisionRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, metacognition_id, personality_id, revision_json,
                    trust_before, evaluated, evaluated_ms, trust_delta
             FROM self_revisions WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], Self::row_to_self_revision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_self_revision(row: &rusqlite::Row) -> rusqlite::Result<SelfRevisionRecord> {
        Ok(SelfRevisionRecord {
            id: row.get(0)?,
            run_id: row.get(1)?,
            ts_ms: row.get(2)?,
            metacognition_id: row.get(3)?,
            personality_id: row.get(4)?,
            revision_json: row.get(5)?,
            trust_before: row.get(6)?,
            evaluated: row.get(7)?,
            evaluated_ms: row.get(8)?,
            trust_delta: row.get(9)?,
        })
    }

    // ========================================================================
    // GOALS
    // ========================================================================

    /// Create a goal node; descriptions are unique within a run
    pub fn insert_goal_node(
        &self,
        run_id: i64,
        description: &str,
        priority: f64,
        stability: f64,
        origin_reflection_id: Option<i64>,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO goal_nodes (run_id, description, priority, stability, origin_reflection_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, description, priority, stability, origin_reflection_id],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Link a parent goal to a child goal
    pub fn insert_goal_edge(&self, run_id: i64, parent_id: i64, child_id: i64, weight: f64) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO goal_edges (run_id, parent_id, child_id, weight) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, parent_id, child_id, weight],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Overwrite a goal's stability
    pub fn update_goal_stability(&self, goal_id: i64, stability: f64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE goal_nodes SET stability = ?1 WHERE id = ?2",
            params![stability, goal_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("goal {}", goal_id)));
        }
        Ok(())
    }

    /// Look a goal up by its description within a run
    pub fn find_goal_by_description(&self, description: &str, run_id: i64) -> Result<Option<GoalNodeRecord>> {
        let reader = self.reader()?;
        let goal = reader
            .query_row(
                "SELECT id, run_id, description, priority, stability, origin_reflection_id
                 FROM goal_nodes WHERE run_id = ?1 AND description = ?2",
                params![run_id, description],
                Self::row_to_goal,
            )
            .optional()?;
        Ok(goal)
    }

    /// Fetch one goal
    pub fn get_goal_node(&self, goal_id: i64) -> Result<Option<GoalNodeRecord>> {
        let reader = self.reader()?;
        let goal = reader
            .query_row(
                "SELECT id, run_id, description, priority, stability, origin_reflection_id
                 FROM goal_nodes WHERE id = ?1",
                params![goal_id],
                Self::row_to_goal,
            )
            .optional()?;
        Ok(goal)
    }

    /// Goals of a run in insertion order
    pub fn list_goal_nodes(&self, run_id: i64) -> Result<Vec<GoalNodeRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, description, priority, stability, origin_reflection_id
             FROM goal_nodes WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], Self::row_to_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_goal(row: &rusqlite::Row) -> rusqlite::Result<GoalNodeRecord> {
        Ok(GoalNodeRecord {
            id: row.get(0)?,
            run_id: row.get(1)?,
            description: row.get(2)?,
            priority: row.get(3)?,
            stability: row.get(4)?,
            origin_reflection_id: row.get(5)?,
        })
    }

    /// `(child_id, weight)` pairs under a parent goal
    pub fn get_child_goals(&self, parent_id: i64) -> Result<Vec<(i64, f64)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT child_id, weight FROM goal_edges WHERE parent_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `(child_id, weight, description)` triples under a parent goal
    pub fn get_child_goals_with_descriptions(&self, parent_id: i64) -> Result<Vec<(i64, f64, String)>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT e.child_id, e.weight, g.description
             FROM goal_edges e JOIN goal_nodes g ON g.id = e.child_id
             WHERE e.parent_id = ?1 ORDER BY e.id ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a motivation row
    pub fn insert_motivation_state(
        &self,
        run_id: i64,
        ts_ms: i64,
        motivation: f64,
        coherence: f64,
        notes: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO motivation_state (run_id, ts_ms, motivation, coherence, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, ts_ms, motivation, coherence, notes],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Newest motivation rows first, at most `limit`
    pub fn get_recent_motivation(&self, run_id: i64, limit: usize) -> Result<Vec<MotivationRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, motivation, coherence, notes
             FROM motivation_state WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(MotivationRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    motivation: row.get(3)?,
                    coherence: row.get(4)?,
                    notes: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
