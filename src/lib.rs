#![forbid(unsafe_code)]

//! Resumable agent execution runtime.
//!
//! Drives an agent task through a bounded step loop, snapshots progress into
//! versioned checkpoints (JSON files plus an optional `SQLite` store), and
//! suspends at pause points until an operator intervenes.

pub mod config;
pub mod errors;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::AgentConfig;
pub use errors::{AppError, Result};
pub use events::{AgentEvent, EventBus, EventKind};
pub use orchestrator::engine::{Engine, RunOptions, RunOutcome, RunStatus};

/// Checkpoint schema version written by this crate.
pub const VERSION: &str = models::checkpoint::SCHEMA_VERSION;
