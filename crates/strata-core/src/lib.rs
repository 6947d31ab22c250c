//! # Strata Core
//!
//! Staged cognition engine over a durable telemetry store. Each step runs a
//! fixed pipeline of stages; every stage reads earlier stages' state and
//! appends what it decided to SQLite, so a run can be inspected or replayed
//! after the fact.
//!
//! ## Stages
//!
//! - **Context** (hooks): bounded scalar streams with peer coupling
//! - **Phase 6** (reasoner): option scoring, posterior means, contradiction intents
//! - **Phase 7** (reflection): gated episode reflections and narrative summaries
//! - **Phase 8** (goals): goal graph, stability decay, motivation, coherence
//! - **Phase 9** (metacognition): narrative predictions resolved into self-trust
//! - **Phases 10 to 15** (governance): self-explanation, self-revision,
//!   consistency, autonomy envelope, meta-reasoner, ethics regulator
//! - **Action gate**: every external action is checked and recorded
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_core::{
//!     AbortFlag, Engine, HashedTimeSource, MonotonicClock, RuntimeConfig, StepLoop, Storage,
//!     TelemetrySink,
//! };
//!
//! let config = RuntimeConfig::default();
//! let store = Arc::new(Storage::new(config.db_path.clone())?);
//! let engine = Engine::start_run(
//!     store,
//!     Arc::new(MonotonicClock::new()),
//!     config,
//!     &serde_json::json!({"driver": "example"}),
//!     TelemetrySink::disabled(),
//!     Box::new(HashedTimeSource::new(50)),
//! )?;
//! let report = StepLoop::new(engine, my_environment, AbortFlag::new()).run()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundled SQLite
//! - `encryption`: SQLCipher, keyed by `STRATA_ENCRYPTION_KEY`

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod feeds;
pub mod self_model;
pub mod shutdown;
pub mod storage;
pub mod telemetry;

/// Decision and reflection layers (Phases 6 to 9)
pub mod cognition;

/// Governance layers (Phases 10 to 15 and the action gate)
pub mod governance;

pub mod engine;
pub mod runtime;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::RuntimeConfig;
pub use context::{ContextService, FixedSource, HashedTimeSource, RawSource};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use feeds::{FeedQueue, FeedSample, FeedSender};
pub use self_model::SelfModel;
pub use shutdown::AbortFlag;
pub use storage::{RunEventKind, RunSummary, Storage, StorageError};
pub use telemetry::TelemetrySink;

pub use cognition::{CandidateOption, ReasonScore, ReasonerMode};
pub use governance::{ActionKind, ActionVerdict, AutonomyTier, EnvelopeDecision, EthicsDecision};

pub use engine::{Engine, EpisodeEnd, EpisodeInfo, MotivationOutcome, StepContext};
pub use runtime::{Environment, LoopReport, StepLoop, StepOutcome};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Telemetry line format version
pub const TELEMETRY_LINE_VERSION: u32 = 1;
