//! Execution orchestration modules.
//!
//! Covers the step-loop engine, its pluggable phase collaborators, the
//! volatile step history, checkpoint save/restore across backends, and
//! pause point management.

pub mod checkpoint_manager;
pub mod engine;
pub mod history;
pub mod pause_manager;
pub mod phases;
