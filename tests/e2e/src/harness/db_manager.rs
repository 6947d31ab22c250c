//! Test Store Manager
//!
//! Provides isolated telemetry stores for testing:
//! - Temporary databases that are automatically cleaned up
//! - A shared manual clock so tests control every timestamp
//! - Engines started against the store with a fixed context source
//! - Reopening the same file to check persistence

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use strata_core::{Clock, Engine, FixedSource, ManualClock, RuntimeConfig, Storage, TelemetrySink};
use tempfile::TempDir;

/// Clock value every test store starts at
pub const START_MS: i64 = 1_000_000;

/// Manager for test stores
///
/// Creates an isolated database per test. The temporary directory lives as
/// long as the manager.
///
/// # Example
///
/// ```rust,ignore
/// let ts = TestStore::new_temp();
/// let mut engine = ts.start_engine(RuntimeConfig::default());
/// engine.on_step_begin(0, ts.now())?;
/// ```
pub struct TestStore {
    /// The shared store handle
    pub storage: Arc<Storage>,
    /// Clock handed to every engine started from this manager
    pub clock: Arc<ManualClock>,
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestStore {
    /// Create a new store in a temporary directory
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_strata.db");
        let storage = Storage::new(Some(db_path.clone())).expect("Failed to create test storage");

        Self {
            storage: Arc::new(storage),
            clock: Arc::new(ManualClock::new(START_MS)),
            _temp_dir: temp_dir,
            db_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn advance(&self, ms: i64) {
        self.clock.advance(ms);
    }

    /// Open a second handle on the same file
    pub fn reopen(&self) -> Storage {
        Storage::new(Some(self.db_path.clone())).expect("Failed to reopen test storage")
    }

    /// Begin a bare run for stage-level tests
    pub fn begin_run(&self) -> i64 {
        self.storage
            .begin_run(self.now(), r#"{"driver":"e2e"}"#)
            .expect("Failed to begin run")
    }

    /// Start an engine whose context streams always sample `context_value`
    pub fn start_engine_with_context(&self, config: RuntimeConfig, context_value: f64) -> Engine {
        Engine::start_run(
            Arc::clone(&self.storage),
            self.clock.clone(),
            config,
            &json!({ "driver": "e2e" }),
            TelemetrySink::disabled(),
            Box::new(FixedSource(context_value)),
        )
        .expect("Failed to start engine")
    }

    /// Start an engine with a low, always-allowed context value
    pub fn start_engine(&self, config: RuntimeConfig) -> Engine {
        self.start_engine_with_context(config, 0.1)
    }
}
