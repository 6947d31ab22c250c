//! Decision-layer records: options, option stats, intents, verifications and
//! autonomy modulation.

use rusqlite::{params, OptionalExtension};

use super::records::{
    AutonomyModulationRecord, IntentEdgeRecord, IntentNodeRecord, OptionRecord,
    OptionStatsRecord, VerificationRecord,
};
use super::sqlite::{Result, Storage};

/// Input for an autonomy modulation row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAutonomyModulation {
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

impl Storage {
    // ========================================================================
    // OPTIONS
    // ========================================================================

    /// Persist a candidate option
    #[allow(clippy::too_many_arguments)]
    pub fn insert_option(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        source: &str,
        payload_json: &str,
        confidence: f64,
        selected: bool,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO options (run_id, ts_ms, step, source, payload_json, confidence, selected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![run_id, ts_ms, step, source, payload_json, confidence, selected],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Options of a run in insertion order
    pub fn list_options(&self, run_id: i64) -> Result<Vec<OptionRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, step, source, payload_json, confidence, selected
             FROM options WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(OptionRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    step: row.get(3)?,
                    source: row.get(4)?,
                    payload_json: row.get(5)?,
                    confidence: row.get(6)?,
                    selected: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert or replace the running-mean stats of an option
    pub fn upsert_option_stats(&self, option_id: i64, n: i64, mean: f64, last_ms: i64) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO option_stats (option_id, n, mean, last_ms) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(option_id) DO UPDATE SET n = excluded.n, mean = excluded.mean, last_ms = excluded.last_ms",
            params![option_id, n, mean, last_ms],
        )?;
        Ok(())
    }

    /// Stats of one option row
    pub fn get_option_stats(&self, option_id: i64) -> Result<Option<OptionStatsRecord>> {
        let reader = self.reader()?;
        let stats = reader
            .query_row(
                "SELECT option_id, n, mean, last_ms FROM option_stats WHERE option_id = ?1",
                params![option_id],
                Self::row_to_option_stats,
            )
            .optional()?;
        Ok(stats)
    }

    /// Freshest stats written for any option of the run carrying `key`
    pub fn find_option_stats_by_key(&self, run_id: i64, key: &str) -> Result<Option<OptionStatsRecord>> {
        let reader = self.reader()?;
        let stats = reader
            .query_row(
                "SELECT s.option_id, s.n, s.mean, s.last_ms
                 FROM option_stats s JOIN options o ON o.id = s.option_id
                 WHERE o.run_id = ?1 AND json_extract(o.payload_json, '$.key') = ?2
                 ORDER BY s.n DESC, s.last_ms DESC LIMIT 1",
                params![run_id, key],
                Self::row_to_option_stats,
            )
            .optional()?;
        Ok(stats)
    }

    fn row_to_option_stats(row: &rusqlite::Row) -> rusqlite::Result<OptionStatsRecord> {
        Ok(OptionStatsRecord {
            option_id: row.get(0)?,
            n: row.get(1)?,
            mean: row.get(2)?,
            last_ms: row.get(3)?,
        })
    }

    // ========================================================================
    // INTENTS & VERIFICATION
    // ========================================================================

    /// Append an intent node
    pub fn insert_intent_node(
        &self,
        run_id: i64,
        ts_ms: i64,
        kind: &str,
        payload_json: &str,
        confidence: f64,
        source: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO intent_nodes (ts_ms, kind, payload_json, confidence, source, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![ts_ms, kind, payload_json, confidence, source, run_id],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Append an intent edge
    #[allow(clippy::too_many_arguments)]
    pub fn insert_intent_edge(
        &self,
        run_id: i64,
        ts_ms: i64,
        src_node: i64,
        dst_node: i64,
        kind: &str,
        strength: f64,
        payload_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO intent_edges (ts_ms, src_node, dst_node, kind, strength, payload_json, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![ts_ms, src_node, dst_node, kind, strength, payload_json, run_id],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Intent nodes of a run in insertion order
    pub fn list_intent_nodes(&self, run_id: i64) -> Result<Vec<IntentNodeRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, ts_ms, kind, payload_json, confidence, source, run_id
             FROM intent_nodes WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(IntentNodeRecord {
                    id: row.get(0)?,
                    ts_ms: row.get(1)?,
                    kind: row.get(2)?,
                    payload_json: row.get(3)?,
                    confidence: row.get(4)?,
                    source: row.get(5)?,
                    run_id: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Intent edges of a run in insertion order
    pub fn list_intent_edges(&self, run_id: i64) -> Result<Vec<IntentEdgeRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, ts_ms, src_node, dst_node, kind, strength, payload_json, run_id
             FROM intent_edges WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(IntentEdgeRecord {
                    id: row.get(0)?,
                    ts_ms: row.get(1)?,
                    src_node: row.get(2)?,
                    dst_node: row.get(3)?,
                    kind: row.get(4)?,
                    strength: row.get(5)?,
                    payload_json: row.get(6)?,
                    run_id: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a verification
    pub fn insert_verification(
        &self,
        ts_ms: i64,
        fact_id: i64,
        kind: &str,
        contradiction: bool,
        details_json: &str,
        run_id: i64,
        episode_id: Option<i64>,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO verifications
             (ts_ms, fact_id, kind, contradiction, details_json, run_id, episode_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![ts_ms, fact_id, kind, contradiction, details_json, run_id, episode_id],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Verifications of a run in insertion order
    pub fn list_verifications(&self, run_id: i64) -> Result<Vec<VerificationRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, ts_ms, fact_id, kind, contradiction, details_json, run_id, episode_id
             FROM verifications WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(VerificationRecord {
                    id: row.get(0)?,
                    ts_ms: row.get(1)?,
                    fact_id: row.get(2)?,
                    kind: row.get(3)?,
                    contradiction: row.get(4)?,
                    details_json: row.get(5)?,
                    run_id: row.get(6)?,
                    episode_id: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // AUTONOMY MODULATION
    // ========================================================================

    /// Record pre/post statistics of one scoring pass
    pub fn insert_autonomy_modulation(&self, run_id: i64, row: &NewAutonomyModulation) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO autonomy_modulation (run_id, ts_ms, pre_entropy, post_entropy, rank_shift_mean,
                 rank_shift_max, exploration_bias, autonomy_score, veto_reason, driver_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                row.ts_ms,
                row.pre_entropy,
                row.post_entropy,
                row.rank_shift_mean,
                row.rank_shift_max,
                row.exploration_bias,
                row.autonomy_score,
                row.veto_reason,
                row.driver_json,
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Modulation rows of a run in insertion order
    pub fn list_autonomy_modulation(&self, run_id: i64) -> Result<Vec<AutonomyModulationRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, pre_entropy, post_entropy, rank_shift_mean, rank_shift_max,
                    exploration_bias, autonomy_score, veto_reason, driver_json
             FROM autonomy_modulation WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(AutonomyModulationRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    pre_entropy: row.get(3)?,
                    post_entropy: row.get(4)?,
                    rank_shift_mean: row.get(5)?,
                    rank_shift_max: row.get(6)?,
                    exploration_bias: row.get(7)?,
                    autonomy_score: row.get(8)?,
                    veto_reason: row.get(9)?,
                    driver_json: row.get(10)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, Storage, i64) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(Some(dir.path().join("test.db"))).unwrap();
        let run_id = storage.begin_run(0, "{}").unwrap();
        (dir, storage, run_id)
    }

    #[test]
    fn test_option_stats_upsert() {
        let (_dir, storage, run_id) = create_test_storage();
        let id = storage
            .insert_option(run_id, 1, 1, "test", r#"{"key":"a","complexity":0.0}"#, 0.5, true)
            .unwrap();
        storage.upsert_option_stats(id, 1, 0.5, 2).unwrap();
        storage.upsert_option_stats(id, 2, 0.75, 3).unwrap();

        let stats = storage.get_option_stats(id).unwrap().unwrap();
        assert_eq!(stats.n, 2);
        assert!((stats.mean - 0.75).abs() < 1e-12);

        let by_key = storage.find_option_stats_by_key(run_id, "a").unwrap().unwrap();
        assert_eq!(by_key.option_id, id);
        assert!(storage.find_option_stats_by_key(run_id, "b").unwrap().is_none());
    }

    #[test]
    fn test_intent_edge_requires_nodes() {
        let (_dir, storage, run_id) = create_test_storage();
        let a = storage.insert_intent_node(run_id, 1, "correction", "{}", 0.5, "phase6").unwrap();
        let b = storage.insert_intent_node(run_id, 2, "resolution", "{}", 0.5, "phase6").unwrap();
        storage
            .insert_intent_edge(run_id, 2, a, b, "contradiction_resolved", 0.3, "{}")
            .unwrap();
        assert!(storage
            .insert_intent_edge(run_id, 2, a, 9_999, "contradiction_resolved", 0.3, "{}")
            .is_err());
        assert_eq!(storage.list_intent_edges(run_id).unwrap().len(), 1);
    }
}
