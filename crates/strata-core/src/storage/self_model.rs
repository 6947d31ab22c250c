//! Self model snapshots: identity, personality (approved and proposed) and
//! social state.

use rusqlite::{params, OptionalExtension};

use super::records::{PersonalityRecord, SelfConceptRecord, SocialSelfRecord};
use super::sqlite::{Result, Storage, StorageError};

impl Storage {
    /// Append an identity snapshot
    #[allow(clippy::too_many_arguments)]
    pub fn insert_self_concept(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        identity_vector_json: &str,
        confidence: Option<f64>,
        notes: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO self_concept (run_id, ts_ms, step, identity_vector_json, confidence, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, ts_ms, step, identity_vector_json, confidence, notes],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Latest identity snapshot of a run
    pub fn get_latest_self_concept(&self, run_id: i64) -> Result<Option<SelfConceptRecord>> {
        let reader = self.reader()?;
        let row = reader
            .query_row(
                "SELECT id, run_id, ts_ms, step, identity_vector_json, confidence, notes
                 FROM self_concept WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT 1",
                params![run_id],
                |row| {
                    Ok(SelfConceptRecord {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        ts_ms: row.get(2)?,
                        step: row.get(3)?,
                        identity_vector_json: row.get(4)?,
                        confidence: row.get(5)?,
                        notes: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Append an unapproved personality row
    #[allow(clippy::too_many_arguments)]
    pub fn insert_personality_proposal(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        trait_json: &str,
        source: &str,
        notes: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO personality_traits (run_id, ts_ms, step, trait_json, approved, source, notes)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)",
            params![run_id, ts_ms, step, trait_json, source, notes],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Approve a pending proposal; approving twice is `NotFound`
    pub fn approve_personality_proposal(
        &self,
        personality_id: i64,
        source: &str,
        notes: &str,
        approved_ms: i64,
    ) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE personality_traits SET approved = 1, source = ?1, notes = ?2, approved_ms = ?3
             WHERE id = ?4 AND approved = 0",
            params![source, notes, approved_ms, personality_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!(
                "pending personality proposal {}",
                personality_id
            )));
        }
        Ok(())
    }

    /// Latest approved personality of a run
    pub fn get_latest_approved_personality(&self, run_id: i64) -> Result<Option<PersonalityRecord>> {
        self.latest_personality(run_id, true)
    }

    /// Latest proposal still waiting for review
    pub fn get_latest_pending_personality_proposal(
        &self,
        run_id: i64,
    ) -> Result<Option<PersonalityRecord>> {
        self.latest_personality(run_id, false)
    }

    /// Fetch one personality row
    pub fn get_personality(&self, personality_id: i64) -> Result<Option<PersonalityRecord>> {
        let reader = self.reader()?;
        let row = reader
            .query_row(
                "SELECT id, run_id, ts_ms, step, trait_json, approved, source, notes, approved_ms
                 FROM personality_traits WHERE id = ?1",
                params![personality_id],
                Self::row_to_personality,
            )
            .optional()?;
        Ok(row)
    }

    fn latest_personality(&self, run_id: i64, approved: bool) -> Result<Option<PersonalityRecord>> {
        let reader = self.reader()?;
        let row = reader
            .query_row(
                "SELECT id, run_id, ts_ms, step, trait_json, approved, source, notes, approved_ms
                 FROM personality_traits WHERE run_id = ?1 AND approved = ?2
                 ORDER BY ts_ms DESC, id DESC LIMIT 1",
                params![run_id, approved],
                Self::row_to_personality,
            )
            .optional()?;
        Ok(row)
    }

    fn row_to_personality(row: &rusqlite::Row) -> rusqlite::Result<PersonalityRecord> {
        Ok(PersonalityRecord {
            id: row.get(0)?,
            run_id: row.get(1)?,
            ts_ms: row.get(2)?,
            step: row.get(3)?,
            trait_json: row.get(4)?,
            approved: row.get(5)?,
            source: row.get(6)?,
            notes: row.get(7)?,
            approved_ms: row.get(8)?,
        })
    }

    /// Append a social snapshot
    #[allow(clippy::too_many_arguments)]
    pub fn insert_social_self(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        role: &str,
        norm_json: &str,
        reputation: Option<f64>,
        confidence: Option<f64>,
        notes: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO social_self (run_id, ts_ms, step, role, norm_json, reputation, confidence, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![run_id, ts_ms, step, role, norm_json, reputation, confidence, notes],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Latest social snapshot of a run
    pub fn get_latest_social_self(&self, run_id: i64) -> Result<Option<SocialSelfRecord>> {
        let reader = self.reader()?;
        let row = reader
            .query_row(
                "SELECT id, run_id, ts_ms, step, role, norm_json, reputation, confidence, notes
                 FROM social_self WHERE run_id = ?1 ORDER BY ts_ms DESC, id DESC LIMIT 1",
                params![run_id],
                |row| {
                    Ok(SocialSelfRecord {
                        id: row.get(0)?,
                        run_id: row.get(1)?,
                        ts_ms: row.get(2)?,
                        step: row.get(3)?,
                        role: row.get(4)?,
                        norm_json: row.get(5)?,
                        reputation: row.get(6)?,
                        confidence: row.get(7)?,
                        notes: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
