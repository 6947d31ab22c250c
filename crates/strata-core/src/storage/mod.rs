//! Storage Module
//!
//! SQLite-backed telemetry store with:
//! - Versioned, prefix-compatible migrations
//! - Separate reader/writer connections behind `&self` methods
//! - One `impl Storage` block per record family

mod decision;
mod governance;
mod migrations;
mod records;
mod reflective;
mod self_model;
mod sqlite;

pub use decision::NewAutonomyModulation;
pub use migrations::{LATEST_VERSION, MIGRATIONS};
pub use records::*;
pub use sqlite::{Result, Storage, StorageError};
