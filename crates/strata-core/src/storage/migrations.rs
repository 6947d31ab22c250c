//! Database Migrations
//!
//! Schema migration definitions for the telemetry store. Tables are created in
//! dependency order, so any store written by an older binary holds a prefix of
//! the current schema and can be upgraded in place.

use super::sqlite::StorageError;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Run lifecycle: runs, run events, episodes, experiences, rewards",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Decision layer: options, option stats, intents, verifications, modulation",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Reflection layer: reflections, narrative predictions, metacognition, goals",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Governance: ethics, envelope, consistency, meta reasoner, actions, context logs",
        up: MIGRATION_V4_UP,
    },
    Migration {
        version: 5,
        description: "Self model snapshots, self explanations and self revisions",
        up: MIGRATION_V5_UP,
    },
    Migration {
        version: 6,
        description: "Link verifications to the episode they were written in",
        up: MIGRATION_V6_UP,
    },
];

/// Latest schema version known to this binary
pub const LATEST_VERSION: u32 = 6;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Run lifecycle
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_ms INTEGER NOT NULL,
    ended_ms INTEGER,
    metadata_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS run_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL DEFAULT 0,
    kind TEXT NOT NULL,  -- 'start', 'exit', 'fatal', 'signal', 'heartbeat', 'warning', 'error'
    message TEXT NOT NULL DEFAULT '',
    exit_code INTEGER,
    rss_mb REAL,
    gpu_mb REAL
);

CREATE INDEX IF NOT EXISTS idx_run_events_run ON run_events(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS episodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    name TEXT NOT NULL,
    start_ms INTEGER NOT NULL,
    end_ms INTEGER,
    steps INTEGER NOT NULL DEFAULT 0,
    success INTEGER,
    "return" REAL NOT NULL DEFAULT 0.0
);

CREATE INDEX IF NOT EXISTS idx_episodes_run ON episodes(run_id, start_ms);

CREATE TABLE IF NOT EXISTS experiences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    episode_id INTEGER REFERENCES episodes(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL,
    tag TEXT NOT NULL,
    input_json TEXT NOT NULL DEFAULT '{}',
    output_json TEXT NOT NULL DEFAULT '{}',
    significant INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_experiences_run ON experiences(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS rewards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL,
    reward REAL NOT NULL,
    source TEXT NOT NULL,  -- 'shaped', 'survival', 'merged', 'engine_init', 'action', 'simulated'
    context_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_rewards_run ON rewards(run_id, ts_ms);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Decision layer
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS options (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL,
    source TEXT NOT NULL,
    payload_json TEXT NOT NULL DEFAULT '{}',  -- carries the option key and complexity
    confidence REAL NOT NULL DEFAULT 0.0,
    selected INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_options_run ON options(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS option_stats (
    option_id INTEGER PRIMARY KEY REFERENCES options(id),
    n INTEGER NOT NULL,
    mean REAL NOT NULL,
    last_ms INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS intent_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts_ms INTEGER NOT NULL,
    kind TEXT NOT NULL,  -- 'correction', 'resolution'
    payload_json TEXT NOT NULL DEFAULT '{}',
    confidence REAL NOT NULL DEFAULT 0.0,
    source TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES runs(id)
);

CREATE TABLE IF NOT EXISTS intent_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts_ms INTEGER NOT NULL,
    src_node INTEGER NOT NULL REFERENCES intent_nodes(id),
    dst_node INTEGER NOT NULL REFERENCES intent_nodes(id),
    kind TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.0,
    payload_json TEXT NOT NULL DEFAULT '{}',
    run_id INTEGER NOT NULL REFERENCES runs(id)
);

CREATE TABLE IF NOT EXISTS verifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts_ms INTEGER NOT NULL,
    fact_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    contradiction INTEGER NOT NULL DEFAULT 0,
    details_json TEXT NOT NULL DEFAULT '{}',
    run_id INTEGER NOT NULL REFERENCES runs(id)
);

CREATE INDEX IF NOT EXISTS idx_verifications_run ON verifications(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS autonomy_modulation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    pre_entropy REAL NOT NULL,
    post_entropy REAL NOT NULL,
    rank_shift_mean REAL NOT NULL,
    rank_shift_max INTEGER NOT NULL,
    exploration_bias REAL NOT NULL,
    autonomy_score REAL NOT NULL,
    veto_reason TEXT NOT NULL DEFAULT '',
    driver_json TEXT NOT NULL DEFAULT '{}'
);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Reflection layer
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS reflections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    title TEXT NOT NULL,
    rationale_json TEXT NOT NULL DEFAULT '{}',
    impact REAL NOT NULL DEFAULT 0.0,
    episode_id INTEGER REFERENCES episodes(id)
);

CREATE INDEX IF NOT EXISTS idx_reflections_run ON reflections(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS narrative_predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    reflection_id INTEGER NOT NULL REFERENCES reflections(id),
    predicted_coherence_delta REAL NOT NULL,
    confidence REAL NOT NULL,
    horizon_ms INTEGER NOT NULL,
    targets_json TEXT NOT NULL DEFAULT '{}',
    resolved INTEGER NOT NULL DEFAULT 0,
    metacognition_id INTEGER
);

CREATE TABLE IF NOT EXISTS metacognition (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    self_trust REAL NOT NULL,
    narrative_rmse REAL NOT NULL,
    goal_mae REAL NOT NULL,
    ece REAL,
    notes TEXT NOT NULL DEFAULT '',
    delta_trust REAL,
    delta_coherence REAL,
    delta_goal_accuracy REAL
);

CREATE INDEX IF NOT EXISTS idx_metacognition_run ON metacognition(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS goal_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    description TEXT NOT NULL,
    priority REAL NOT NULL CHECK (priority >= 0.0 AND priority <= 1.0),
    stability REAL NOT NULL CHECK (stability >= 0.0 AND stability <= 1.0),
    origin_reflection_id INTEGER REFERENCES reflections(id),
    UNIQUE (run_id, description)
);

CREATE TABLE IF NOT EXISTS goal_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    parent_id INTEGER NOT NULL REFERENCES goal_nodes(id),
    child_id INTEGER NOT NULL REFERENCES goal_nodes(id),
    weight REAL NOT NULL DEFAULT 1.0
);

CREATE INDEX IF NOT EXISTS idx_goal_edges_parent ON goal_edges(parent_id);

CREATE TABLE IF NOT EXISTS motivation_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    motivation REAL NOT NULL CHECK (motivation >= 0.0 AND motivation <= 1.0),
    coherence REAL NOT NULL CHECK (coherence >= 0.0 AND coherence <= 1.0),
    notes TEXT NOT NULL DEFAULT ''
);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// V4: Governance
const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS ethics_regulator (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    decision TEXT NOT NULL,  -- 'allow', 'review', 'deny'
    driver_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_ethics_run ON ethics_regulator(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS autonomy_envelope (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    decision TEXT NOT NULL,  -- 'tighten', 'hold', 'expand'
    tier TEXT NOT NULL,      -- 'none', 'shadow', 'conditional', 'full'
    autonomy_score REAL NOT NULL CHECK (autonomy_score >= 0.0 AND autonomy_score <= 1.0),
    valid INTEGER NOT NULL DEFAULT 1,
    driver_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS consistency (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    self_consistency REAL NOT NULL CHECK (self_consistency >= 0.0 AND self_consistency <= 1.0),
    samples INTEGER NOT NULL,
    driver_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS meta_reasoner (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    decision TEXT NOT NULL,  -- 'nominal', 'degraded'
    mean_trust REAL NOT NULL,
    mean_rmse REAL NOT NULL,
    driver_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL,
    kind TEXT NOT NULL,
    success INTEGER NOT NULL,
    reason TEXT NOT NULL DEFAULT '',
    payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_actions_run ON actions(run_id, ts_ms);

CREATE TABLE IF NOT EXISTS context_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    sample REAL NOT NULL,
    gain REAL NOT NULL,
    update_ms INTEGER NOT NULL,
    "window" INTEGER NOT NULL,
    label TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS context_peer_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    peer TEXT NOT NULL,
    sample REAL NOT NULL,
    gain REAL NOT NULL,
    update_ms INTEGER NOT NULL,
    "window" INTEGER NOT NULL,
    label TEXT NOT NULL,
    mode TEXT NOT NULL,  -- 'independent', 'coupled'
    lambda REAL NOT NULL,
    kappa REAL NOT NULL
);

UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

/// V5: Self model snapshots and the self-revision loop
const MIGRATION_V5_UP: &str = r#"
CREATE TABLE IF NOT EXISTS self_concept (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL DEFAULT 0,
    identity_vector_json TEXT NOT NULL DEFAULT '[]',
    confidence REAL,
    notes TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS personality_traits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL DEFAULT 0,
    trait_json TEXT NOT NULL DEFAULT '{}',
    approved INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    approved_ms INTEGER
);

CREATE INDEX IF NOT EXISTS idx_personality_run ON personality_traits(run_id, approved, ts_ms);

CREATE TABLE IF NOT EXISTS social_self (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    step INTEGER NOT NULL DEFAULT 0,
    role TEXT NOT NULL DEFAULT '',
    norm_json TEXT NOT NULL DEFAULT '{}',
    reputation REAL,
    confidence REAL,
    notes TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS self_explanations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    metacognition_id INTEGER NOT NULL REFERENCES metacognition(id),
    text TEXT NOT NULL,
    drivers_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS self_revisions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    ts_ms INTEGER NOT NULL,
    metacognition_id INTEGER REFERENCES metacognition(id),
    personality_id INTEGER REFERENCES personality_traits(id),
    revision_json TEXT NOT NULL DEFAULT '{}',
    trust_before REAL NOT NULL,
    evaluated INTEGER NOT NULL DEFAULT 0,
    evaluated_ms INTEGER,
    trust_delta REAL
);

UPDATE schema_version SET version = 5, applied_at = datetime('now');
"#;

/// V6: Episode link on verifications
///
/// Rows written before this version keep a NULL episode and are matched by
/// time window instead.
const MIGRATION_V6_UP: &str = r#"
ALTER TABLE verifications ADD COLUMN episode_id INTEGER REFERENCES episodes(id);

CREATE INDEX IF NOT EXISTS idx_verifications_episode ON verifications(episode_id);

UPDATE schema_version SET version = 6, applied_at = datetime('now');
"#;

/// Columns each table may carry. A known table holding any other column was
/// written by an incompatible binary.
pub const TABLE_COLUMNS: &[(&str, &[&str])] = &[
    ("runs", &["id", "started_ms", "ended_ms", "metadata_json"]),
    (
        "run_events",
        &["id", "run_id", "ts_ms", "step", "kind", "message", "exit_code", "rss_mb", "gpu_mb"],
    ),
    (
        "episodes",
        &["id", "run_id", "name", "start_ms", "end_ms", "steps", "success", "return"],
    ),
    (
        "experiences",
        &[
            "id", "run_id", "episode_id", "ts_ms", "step", "tag", "input_json", "output_json",
            "significant",
        ],
    ),
    (
        "rewards",
        &["id", "run_id", "ts_ms", "step", "reward", "source", "context_json"],
    ),
    ("schema_version", &["version", "applied_at"]),
    (
        "options",
        &["id", "run_id", "ts_ms", "step", "source", "payload_json", "confidence", "selected"],
    ),
    ("option_stats", &["option_id", "n", "mean", "last_ms"]),
    (
        "intent_nodes",
        &["id", "ts_ms", "kind", "payload_json", "confidence", "source", "run_id"],
    ),
    (
        "intent_edges",
        &[
            "id", "ts_ms", "src_node", "dst_node", "kind", "strength", "payload_json", "run_id",
        ],
    ),
    (
        "verifications",
        &[
            "id", "ts_ms", "fact_id", "kind", "contradiction", "details_json", "run_id",
            "episode_id",
        ],
    ),
    (
        "autonomy_modulation",
        &[
            "id", "run_id", "ts_ms", "pre_entropy", "post_entropy", "rank_shift_mean",
            "rank_shift_max", "exploration_bias", "autonomy_score", "veto_reason", "driver_json",
        ],
    ),
    (
        "reflections",
        &["id", "run_id", "ts_ms", "title", "rationale_json", "impact", "episode_id"],
    ),
    (
        "narrative_predictions",
        &[
            "id", "run_id", "ts_ms", "reflection_id", "predicted_coherence_delta", "confidence",
            "horizon_ms", "targets_json", "resolved", "metacognition_id",
        ],
    ),
    (
        "metacognition",
        &[
            "id", "run_id", "ts_ms", "self_trust", "narrative_rmse", "goal_mae", "ece", "notes",
            "delta_trust", "delta_coherence", "delta_goal_accuracy",
        ],
    ),
    (
        "goal_nodes",
        &["id", "run_id", "description", "priority", "stability", "origin_reflection_id"],
    ),
    ("goal_edges", &["id", "run_id", "parent_id", "child_id", "weight"]),
    (
        "motivation_state",
        &["id", "run_id", "ts_ms", "motivation", "coherence", "notes"],
    ),
    ("ethics_regulator", &["id", "run_id", "ts_ms", "decision", "driver_json"]),
    (
        "autonomy_envelope",
        &["id", "run_id", "ts_ms", "decision", "tier", "autonomy_score", "valid", "driver_json"],
    ),
    (
        "consistency",
        &["id", "run_id", "ts_ms", "self_consistency", "samples", "driver_json"],
    ),
    (
        "meta_reasoner",
        &["id", "run_id", "ts_ms", "decision", "mean_trust", "mean_rmse", "driver_json"],
    ),
    (
        "actions",
        &["id", "run_id", "ts_ms", "step", "kind", "success", "reason", "payload_json"],
    ),
    (
        "context_log",
        &["id", "run_id", "ts_ms", "sample", "gain", "update_ms", "window", "label"],
    ),
    (
        "context_peer_log",
        &[
            "id", "run_id", "ts_ms", "peer", "sample", "gain", "update_ms", "window", "label",
            "mode", "lambda", "kappa",
        ],
    ),
    (
        "self_concept",
        &["id", "run_id", "ts_ms", "step", "identity_vector_json", "confidence", "notes"],
    ),
    (
        "personality_traits",
        &[
            "id", "run_id", "ts_ms", "step", "trait_json", "approved", "source", "notes",
            "approved_ms",
        ],
    ),
    (
        "social_self",
        &[
            "id", "run_id", "ts_ms", "step", "role", "norm_json", "reputation", "confidence",
            "notes",
        ],
    ),
    (
        "self_explanations",
        &["id", "run_id", "ts_ms", "metacognition_id", "text", "drivers_json"],
    ),
    (
        "self_revisions",
        &[
            "id", "run_id", "ts_ms", "metacognition_id", "personality_id", "revision_json",
            "trust_before", "evaluated", "evaluated_ms", "trust_delta",
        ],
    ),
];

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
///
/// Each migration runs inside its own transaction, so a crash mid-upgrade
/// leaves the store at the previous version.
pub fn apply_migrations(conn: &rusqlite::Connection) -> Result<u32, StorageError> {
    let current_version = get_current_version(conn)?;
    if current_version > LATEST_VERSION {
        return Err(StorageError::SchemaMismatch(format!(
            "store is at schema v{}, this binary knows up to v{}",
            current_version, LATEST_VERSION
        )));
    }

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(migration.up)?;
            tx.commit()?;

            applied += 1;
        }
    }

    Ok(applied)
}

/// Check every known table against [`TABLE_COLUMNS`]
pub fn verify_schema(conn: &rusqlite::Connection) -> Result<(), StorageError> {
    let version = get_current_version(conn)?;
    if version > LATEST_VERSION {
        return Err(StorageError::SchemaMismatch(format!(
            "store is at schema v{}, this binary knows up to v{}",
            version, LATEST_VERSION
        )));
    }

    for (table, expected) in TABLE_COLUMNS {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<_>>()?;

        // Table not created yet (read-only handle on an older store)
        if columns.is_empty() {
            continue;
        }

        if let Some(unknown) = columns.iter().find(|c| !expected.contains(&c.as_str())) {
            return Err(StorageError::SchemaMismatch(format!(
                "table {} has unknown column {}",
                table, unknown
            )));
        }
    }

    Ok(())
}
