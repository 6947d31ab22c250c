//! SQLite Storage Implementation
//!
//! Core storage layer: connection management, run lifecycle, episodes,
//! experiences and rewards. The other record families live in sibling
//! modules as further `impl Storage` blocks.

use directories::ProjectDirs;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::migrations;
use super::records::{
    EpisodeRecord, ExperienceRecord, RewardRecord, RunEventKind, RunEventRecord, RunRecord,
    RunSummary,
};
use crate::error::ErrorKind;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Store cannot be opened, begun or queried
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Existing store is incompatible
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Uniqueness or foreign-key violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    /// Required row not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Any other database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, msg) = &e {
            let detail = msg.clone().unwrap_or_else(|| err.to_string());
            match err.code {
                ErrorCode::ConstraintViolation => return Self::ConstraintViolation(detail),
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::ReadOnly
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied
                | ErrorCode::DiskFull => return Self::Unavailable(detail),
                _ => {}
            }
        }
        Self::Database(e)
    }
}

impl StorageError {
    /// Classify into the shared error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unavailable(_) | Self::Database(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::StoreUnavailable
            }
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// STORAGE
// ============================================================================

/// Telemetry store
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self`, making Storage `Send + Sync` so components can
/// share an `Arc<Storage>` handle instead of an `Arc<Mutex<Storage>>`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    read_only: bool,
    path: PathBuf,
}

impl Storage {
    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection, read_only: bool) -> Result<()> {
        // Apply encryption key if SQLCipher is enabled and key is provided
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("STRATA_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        if read_only {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA query_only = ON;",
            )?;
            return Ok(());
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(())
    }

    /// Default database location under the platform data directory
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "strata", "strata").ok_or_else(|| {
            StorageError::Unavailable("Could not determine project directories".to_string())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join("strata.db"))
    }

    /// Open (or create) the store and bring its schema up to date
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_path()?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn, false)?;

        // Apply migrations on writer only
        migrations::apply_migrations(&writer_conn)?;
        migrations::verify_schema(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn, false)?;

        tracing::debug!(path = %path.display(), "telemetry store opened");

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            read_only: false,
            path,
        })
    }

    /// Open an existing store for listing; every write fails with `Unavailable`
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI;

        let writer_conn = Connection::open_with_flags(&path, flags)?;
        Self::configure_connection(&writer_conn, true)?;
        migrations::verify_schema(&writer_conn)?;

        let reader_conn = Connection::open_with_flags(&path, flags)?;
        Self::configure_connection(&reader_conn, true)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            read_only: true,
            path,
        })
    }

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle refuses writes
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        if self.read_only {
            return Err(StorageError::Unavailable("read-only store handle".into()));
        }
        self.writer
            .lock()
            .map_err(|_| StorageError::Unavailable("Writer lock poisoned".into()))
    }

    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Unavailable("Reader lock poisoned".into()))
    }

    /// Schema version currently applied
    pub fn schema_version(&self) -> Result<u32> {
        let reader = self.reader()?;
        Ok(migrations::get_current_version(&reader)?)
    }

    // ========================================================================
    // RUN LIFECYCLE
    // ========================================================================

    /// Create a run and return its id
    pub fn begin_run(&self, started_ms: i64, metadata_json: &str) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO runs (started_ms, metadata_json) VALUES (?1, ?2)",
            params![started_ms, metadata_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Stamp the run's end time
    pub fn end_run(&self, run_id: i64, ended_ms: i64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE runs SET ended_ms = ?1 WHERE id = ?2",
            params![ended_ms, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("run {}", run_id)));
        }
        Ok(())
    }

    /// Close a run that cannot continue: a fatal event with exit code 1,
    /// then the end stamp. Both writes are attempted; the first error wins.
    pub fn record_fatal(&self, run_id: i64, ts_ms: i64, step: i64, message: &str) -> Result<()> {
        let event = self.insert_run_event(
            run_id,
            ts_ms,
            step,
            RunEventKind::Fatal,
            message,
            Some(1),
            None,
            None,
        );
        let ended = self.end_run(run_id, ts_ms);
        event.map(|_| ()).and(ended)
    }

    /// Fetch one run
    pub fn get_run(&self, run_id: i64) -> Result<Option<RunRecord>> {
        let reader = self.reader()?;
        let run = reader
            .query_row(
                "SELECT id, started_ms, ended_ms, metadata_json FROM runs WHERE id = ?1",
                params![run_id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Most recent runs first
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, started_ms, ended_ms, metadata_json FROM runs
             ORDER BY started_ms DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_ms: row.get(1)?,
            ended_ms: row.get(2)?,
            metadata_json: row.get(3)?,
        })
    }

    /// Append a lifecycle event
    #[allow(clippy::too_many_arguments)]
    pub fn insert_run_event(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        kind: RunEventKind,
        message: &str,
        exit_code: Option<i64>,
        rss_mb: Option<f64>,
        gpu_mb: Option<f64>,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO run_events (run_id, ts_ms, step, kind, message, exit_code, rss_mb, gpu_mb)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![run_id, ts_ms, step, kind.as_str(), message, exit_code, rss_mb, gpu_mb],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Events of a run in insertion order
    pub fn list_run_events(&self, run_id: i64) -> Result<Vec<RunEventRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, step, kind, message, exit_code, rss_mb, gpu_mb
             FROM run_events WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(RunEventRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    step: row.get(3)?,
                    kind: row.get(4)?,
                    message: row.get(5)?,
                    exit_code: row.get(6)?,
                    rss_mb: row.get(7)?,
                    gpu_mb: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // EPISODES
    // ========================================================================

    /// Open a new episode
    pub fn start_episode(&self, run_id: i64, name: &str, start_ms: i64) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO episodes (run_id, name, start_ms) VALUES (?1, ?2, ?3)",
            params![run_id, name, start_ms],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Close an episode. Closing twice keeps the first end time.
    pub fn end_episode(&self, episode_id: i64, end_ms: i64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE episodes SET end_ms = COALESCE(end_ms, ?1) WHERE id = ?2",
            params![end_ms, episode_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("episode {}", episode_id)));
        }
        Ok(())
    }

    /// Overwrite an episode's counters
    pub fn upsert_episode_stats(
        &self,
        episode_id: i64,
        steps: i64,
        success: Option<bool>,
        episode_return: f64,
    ) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            r#"UPDATE episodes SET steps = ?1, success = ?2, "return" = ?3 WHERE id = ?4"#,
            params![steps, success, episode_return, episode_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("episode {}", episode_id)));
        }
        Ok(())
    }

    /// Close an episode and write its counters in one transaction
    pub fn finish_episode(
        &self,
        episode_id: i64,
        end_ms: i64,
        steps: i64,
        success: Option<bool>,
        episode_return: f64,
    ) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let changed = tx.execute(
            r#"UPDATE episodes SET end_ms = COALESCE(end_ms, ?1), steps = ?2, success = ?3, "return" = ?4
               WHERE id = ?5"#,
            params![end_ms, steps, success, episode_return, episode_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("episode {}", episode_id)));
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch one episode
    pub fn get_episode(&self, episode_id: i64) -> Result<Option<EpisodeRecord>> {
        let reader = self.reader()?;
        let ep = reader
            .query_row(
                r#"SELECT id, run_id, name, start_ms, end_ms, steps, success, "return"
                   FROM episodes WHERE id = ?1"#,
                params![episode_id],
                Self::row_to_episode,
            )
            .optional()?;
        Ok(ep)
    }

    /// Episodes of a run in insertion order
    pub fn list_episodes(&self, run_id: i64) -> Result<Vec<EpisodeRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            r#"SELECT id, run_id, name, start_ms, end_ms, steps, success, "return"
               FROM episodes WHERE run_id = ?1 ORDER BY id ASC"#,
        )?;
        let rows = stmt
            .query_map(params![run_id], Self::row_to_episode)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<EpisodeRecord> {
        Ok(EpisodeRecord {
            id: row.get(0)?,
            run_id: row.get(1)?,
            name: row.get(2)?,
            start_ms: row.get(3)?,
            end_ms: row.get(4)?,
            steps: row.get(5)?,
            success: row.get(6)?,
            episode_return: row.get(7)?,
        })
    }

    /// Share of contradicting verifications written in the episode
    ///
    /// Rows without an episode link fall back to the half-open window
    /// `[start_ms, end_ms)`, so a row on a boundary belongs to one episode only.
    pub fn get_episode_contradiction_rate(&self, run_id: i64, episode_id: i64) -> Result<f64> {
        let reader = self.reader()?;
        let span: Option<(i64, Option<i64>)> = reader
            .query_row(
                "SELECT start_ms, end_ms FROM episodes WHERE id = ?1 AND run_id = ?2",
                params![episode_id, run_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (start_ms, end_ms) = span
            .ok_or_else(|| StorageError::NotFound(format!("episode {} in run {}", episode_id, run_id)))?;

        let (total, contradictions): (i64, i64) = reader.query_row(
            "SELECT COUNT(*), COALESCE(SUM(contradiction), 0) FROM verifications
             WHERE run_id = ?1
               AND (episode_id = ?2
                    OR (episode_id IS NULL AND ts_ms >= ?3 AND ts_ms < ?4))",
            params![run_id, episode_id, start_ms, end_ms.unwrap_or(i64::MAX)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok((contradictions as f64 / total as f64).clamp(0.0, 1.0))
    }

    /// Totals over every finished episode of a run
    pub fn get_run_summary(&self, run_id: i64) -> Result<RunSummary> {
        let reader = self.reader()?;
        let summary = reader.query_row(
            r#"SELECT COUNT(*),
                      COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                      COALESCE(SUM(CASE WHEN success = 1 THEN 0 ELSE 1 END), 0),
                      COALESCE(SUM("return"), 0.0),
                      COALESCE(SUM(steps), 0)
               FROM episodes WHERE run_id = ?1 AND end_ms IS NOT NULL"#,
            params![run_id],
            |row| {
                Ok(RunSummary {
                    finished_episodes: row.get(0)?,
                    successes: row.get(1)?,
                    failures: row.get(2)?,
                    total_return: row.get(3)?,
                    total_steps: row.get(4)?,
                })
            },
        )?;
        Ok(summary)
    }

    // ========================================================================
    // EXPERIENCE & REWARD
    // ========================================================================

    /// Append an experience
    #[allow(clippy::too_many_arguments)]
    pub fn insert_experience(
        &self,
        run_id: i64,
        episode_id: Option<i64>,
        ts_ms: i64,
        step: i64,
        tag: &str,
        input_json: &str,
        output_json: &str,
        significant: bool,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO experiences (run_id, episode_id, ts_ms, step, tag, input_json, output_json, significant)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![run_id, episode_id, ts_ms, step, tag, input_json, output_json, significant],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Attach an experience to an episode after the fact
    pub fn link_experience_to_episode(&self, experience_id: i64, episode_id: i64) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE experiences SET episode_id = ?1 WHERE id = ?2",
            params![episode_id, experience_id],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("experience {}", experience_id)));
        }
        Ok(())
    }

    /// Experiences of a run in insertion order
    pub fn list_experiences(&self, run_id: i64) -> Result<Vec<ExperienceRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, episode_id, ts_ms, step, tag, input_json, output_json, significant
             FROM experiences WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ExperienceRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    episode_id: row.get(2)?,
                    ts_ms: row.get(3)?,
                    step: row.get(4)?,
                    tag: row.get(5)?,
                    input_json: row.get(6)?,
                    output_json: row.get(7)?,
                    significant: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a reward
    pub fn insert_reward(
        &self,
        run_id: i64,
        ts_ms: i64,
        step: i64,
        reward: f64,
        source: &str,
        context_json: &str,
    ) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO rewards (run_id, ts_ms, step, reward, source, context_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, ts_ms, step, reward, source, context_json],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Rewards of a run in insertion order
    pub fn list_rewards(&self, run_id: i64) -> Result<Vec<RewardRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT id, run_id, ts_ms, step, reward, source, context_json
             FROM rewards WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(RewardRecord {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    ts_ms: row.get(2)?,
                    step: row.get(3)?,
                    reward: row.get(4)?,
                    source: row.get(5)?,
                    context_json: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
