//! Error taxonomy
//!
//! Two layers: [`StorageError`](crate::storage::StorageError) for the telemetry
//! store and [`CoreError`] for everything the engine does on top of it. Both map
//! onto the same closed set of [`ErrorKind`]s so the step loop can decide what is
//! fatal without matching on concrete variants.

use crate::storage::StorageError;

/// Closed set of error kinds shared by every layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A parameter is out of range
    ConfigInvalid,
    /// The telemetry store cannot be opened, begun or queried
    StoreUnavailable,
    /// An existing store is incompatible with this binary
    SchemaMismatch,
    /// Uniqueness or foreign-key violation on insert
    ConstraintViolation,
    /// A required row does not exist
    NotFound,
    /// Aborted because shutdown was requested
    Preempted,
    /// A step overran its budget (recorded, never fatal)
    BudgetExceeded,
}

impl ErrorKind {
    /// Stable lowercase name used in run events and telemetry lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigInvalid => "config_invalid",
            Self::StoreUnavailable => "store_unavailable",
            Self::SchemaMismatch => "schema_mismatch",
            Self::ConstraintViolation => "constraint_violation",
            Self::NotFound => "not_found",
            Self::Preempted => "preempted",
            Self::BudgetExceeded => "budget_exceeded",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-level error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Telemetry store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Shutdown was requested while the operation was in flight
    #[error("Preempted by shutdown request")]
    Preempted,
    /// A step took longer than its budget
    #[error("Step budget exceeded: {elapsed_ms}ms > {budget_ms}ms")]
    BudgetExceeded {
        /// Measured step duration
        elapsed_ms: i64,
        /// Configured budget
        budget_ms: i64,
    },
    /// A stage failed for a reason of its own
    #[error("Stage {stage} failed ({kind}): {message}")]
    Stage {
        /// Component name
        stage: &'static str,
        /// Classification chosen by the failing stage
        kind: ErrorKind,
        /// What went wrong
        message: String,
    },
}

impl CoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::ConfigInvalid,
            Self::Storage(e) => e.kind(),
            Self::Preempted => ErrorKind::Preempted,
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::Stage { kind, .. } => *kind,
        }
    }

    /// Convenience constructor for stage failures
    pub fn stage(stage: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            kind,
            message: message.into(),
        }
    }
}

/// Engine result type
pub type CoreResult<T> = std::result::Result<T, CoreError>;
