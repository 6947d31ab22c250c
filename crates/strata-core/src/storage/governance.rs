//! Governance records: ethics decisions, envelope state, consistency,
//! meta-reasoner flags, attempted actions and context logs.

use rusqlite::params;

use super::records::{
    ActionRecord, AutonomyEnvelopeRecord, ConsistencyRecord, ContextLogRecord,
    ContextPeerLogRecord, EthicsRecord, MetaReasonerRecord, NewContextPeerLog,
};
use super::sqlite::{Result, Storage};

impl Storage {
    // ========================================================================
    // ETHICS REGULATOR
    // ========================================================================

    /// Append an ethics decision
    pub fn insert_ethics_regulator(
        &self,
        run_id: i64,
        ts_ms: i64,
        decision: &str,
        driver_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO ethics_regulator (run_id, ts_ms, decision, driver_json)
             VALUES (?1, ?2, ?3, ?4)",
            params![run_id, ts_ms, decision, driver_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Newest ethics decisions first, at most `limit`
    pub fn get_recent_ethics_regulator(&self, run_id: i64, limit: usize) -> Result<Vec<EthicsRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, decision, driver_json
             FROM ethics_regulator WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(EthicsRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    decision: row.get(3)?,
                    driver_json: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // AUTONOMY ENVELOPE
    // ========================================================================

    /// Append an envelope decision
    #[allow(clippy::too_many_arguments)]
    pub fn insert_autonomy_envelope(
        &self,
        run_id: i64,
        ts_ms: i64,
        decision: &str,
        tier: &str,
        autonomy_score: f64,
        valid: bool,
        driver_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO autonomy_envelope (run_id, ts_ms, decision, tier, autonomy_score, valid, driver_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![run_id, ts_ms, decision, tier, autonomy_score, valid, driver_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Newest envelope rows first, at most `limit`
    pub fn get_recent_autonomy_envelope(
        &self,
        run_id: i64,
        limit: usize,
    ) -> Result<Vec<AutonomyEnvelopeRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, decision, tier, autonomy_score, valid, driver_json
             FROM autonomy_envelope WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(AutonomyEnvelopeRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    decision: row.get(3)?,
                    tier: row.get(4)?,
                    autonomy_score: row.get(5)?,
                    valid: row.get(6)?,
                    driver_json: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // CONSISTENCY & META REASONER
    // ========================================================================

    /// Append a consistency observation
    pub fn insert_consistency(
        &self,
        run_id: i64,
        ts_ms: i64,
        self_consistency: f64,
        samples: i64,
        driver_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO consistency (run_id, ts_ms, self_consistency, samples, driver_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, ts_ms, self_consistency, samples, driver_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Newest consistency rows first, at most `limit`
    pub fn get_recent_consistency(&self, run_id: i64, limit: usize) -> Result<Vec<ConsistencyRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, self_consistency, samples, driver_json
             FROM consistency WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(ConsistencyRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    self_consistency: row.get(3)?,
                    samples: row.get(4)?,
                    driver_json: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a meta-reasoner observation
    pub fn insert_meta_reasoner(
        &self,
        run_id: i64,
        ts_ms: i64,
        decision: &str,
        mean_trust: f64,
        mean_rmse: f64,
        driver_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO meta_reasoner (run_id, ts_ms, decision, mean_trust, mean_rmse, driver_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, ts_ms, decision, mean_trust, mean_rmse, driver_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Newest meta-reasoner rows first, at most `limit`
    pub fn get_recent_meta_reasoner(&self, run_id: i64, limit: usize) -> Result<Vec<MetaReasonerRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, decision, mean_trust, mean_rmse, driver_json
             FROM meta_reasoner WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(MetaReasonerRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    decision: row.get(3)?,
                    mean_trust: row.get(4)?,
                    mean_rmse: row.get(5)?,
                    driver_json: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // ACTIONS
    // ========================================================================

    /// Record an attempted action, allowed or not
    #[allow(clippy::too_many_arguments)]
    pub fn insert_action(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        kind: &str,
        success: bool,
        reason: &str,
        payload_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO actions (run_id, ts_ms, step, kind, success, reason, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![run_id, ts_ms, step, kind, success, reason, payload_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Actions of a run in insertion order
    pub fn list_actions(&self, run_id: i64) -> Result<Vec<ActionRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, step, kind, success, reason, payload_json
             FROM actions WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ActionRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    step: row.get(3)?,
                    kind: row.get(4)?,
                    success: row.get(5)?,
                    reason: row.get(6)?,
                    payload_json: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // CONTEXT LOGS
    // ========================================================================

    /// Append a global context sample
    #[allow(clippy::too_many_arguments)]
    pub fn insert_context_log(
        &self,
        run_id: i64,
        ts_ms: i64,
        sample: f64,
        gain: f64,
        update_ms: i64,
        window: i64,
        label: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            r#"INSERT INTO context_log (run_id, ts_ms, sample, gain, update_ms, "window", label)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![run_id, ts_ms, sample, gain, update_ms, window, label],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Append a peer context sample
    pub fn insert_context_peer_log(&self, run_id: i64, row: &NewContextPeerLog) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            r#"INSERT INTO context_peer_log (run_id, ts_ms, peer, sample, gain, update_ms, "window",
                   label, mode, lambda, kappa)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                run_id,
                row.ts_ms,
                row.peer,
                row.sample,
                row.gain,
                row.update_ms,
                row.window,
                row.label,
                row.mode,
                row.lambda,
                row.kappa,
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Global context samples of a run in insertion order
    pub fn list_context_logs(&self, run_id: i64) -> Result<Vec<ContextLogRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            r#"SELECT id, run_id, ts_ms, sample, gain, update_ms, "window", label
               FROM context_log WHERE run_id = ?1 ORDER BY id ASC"#,
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ContextLogRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    sample: row.get(3)?,
                    gain: row.get(4)?,
                    update_ms: row.get(5)?,
                    window: row.get(6)?,
                    label: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Peer context samples of a run in insertion order
    pub fn list_context_peer_logs(&self, run_id: i64) -> Result<Vec<ContextPeerLogRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            r#"SELECT id, run_id, ts_ms, peer, sample, gain, update_ms, "window", label, mode, lambda, kappa
               FROM context_peer_log WHERE run_id = ?1 ORDER BY id ASC"#,
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ContextPeerLogRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    peer: row.get(3)?,
                    sample: row.get(4)?,
                    gain: row.get(5)?,
                    update_ms: row.get(6)?,
                    window: row.get(7)?,
                    label: row.get(8)?,
                    mode: row.get(9)?,
                    lambda: row.get(10)?,
                    kappa: row.get(11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn create_test_storage() -> (TempDir, Storage, i64) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(Some(dir.path().join("test.db"))).unwrap();
        let run_id = storage.begin_run(0, "{}").unwrap();
        (dir, storage, run_id)
    }

    #[test]
    fn test_recent_queries_strictly_decreasing() {
        let (_dir, storage, run_id) = create_test_storage();
        for ts in [5, 1, 9, 3] {
            storage.insert_ethics_regulator(run_id, ts, "allow", "{}").unwrap();
            storage.insert_consistency(run_id, ts, 0.8, 3, "{}").unwrap();
        }

        let ethics = storage.get_recent_ethics_regulator(run_id, 3).unwrap();
        let ts: Vec<i64> = ethics.iter().map(|r| r.ts_ms).collect();
        assert_eq!(ts, vec![9, 5, 3]);

        let consistency = storage.get_recent_consistency(run_id, 10).unwrap();
        assert_eq!(consistency.len(), 4);
        assert_eq!(consistency[0].ts_ms, 9);
    }

    #[test]
    fn test_envelope_score_checked() {
        let (_dir, storage, run_id) = create_test_storage();
        let err = storage
            .insert_autonomy_envelope(run_id, 0, "hold", "full", 1.2, true, "{}")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_context_logs_round_trip() {
        let (_dir, storage, run_id) = create_test_storage();
        storage.insert_context_log(run_id, 10, 0.4, 1.0, 200, 16, "click").unwrap();
        storage
            .insert_context_peer_log(
                run_id,
                &NewContextPeerLog {
                    ts_ms: 11,
                    peer: "phase6".into(),
                    sample: 0.5,
                    gain: 0.8,
                    update_ms: 100,
                    window: 8,
                    label: "score".into(),
                    mode: "coupled".into(),
                    lambda: 0.3,
                    kappa: 0.12,
                },
            )
            .unwrap();

        let logs = storage.list_context_logs(run_id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].window, 16);
        assert_eq!(logs[0].label, "click");

        let peers = storage.list_context_peer_logs(run_id).unwrap();
        assert_eq!(peers[0].peer, "phase6");
        assert_eq!(peers[0].mode, "coupled");
    }

    #[test]
    fn test_action_foreign_key() {
        let (_dir, storage, _run_id) = create_test_storage();
        let err = storage
            .insert_action(999, 0, 0, "click", false, "phase15_deny", "{}")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }
}
