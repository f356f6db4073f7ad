//! Persistence layer modules.

pub mod checkpoint_repo;
pub mod db;
pub mod file_store;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
