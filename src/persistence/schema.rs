//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so bootstrapping
//! is safe to repeat on every start.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the checkpoint, thought, and tool-call tables.
///
/// Thought and tool-call rows are keyed by `(checkpoint_id, id)`: the same
/// step or call is recorded once per checkpoint that contains it.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    id                    TEXT PRIMARY KEY NOT NULL,
    version               TEXT NOT NULL,
    timestamp             TEXT NOT NULL,
    execution_id          TEXT NOT NULL,
    agent_id              TEXT NOT NULL,
    snapshot_json         TEXT NOT NULL,
    step_number           INTEGER NOT NULL,
    total_steps_estimate  INTEGER,
    tokens_used           INTEGER NOT NULL,
    duration_ms           INTEGER NOT NULL,
    checkpoint_reason     TEXT NOT NULL CHECK(checkpoint_reason IN ('step_complete','manual','low_confidence','tool_error','auto','decision','branch')),
    agent_name            TEXT,
    diff_json             TEXT,
    parent_checkpoint_id  TEXT,
    is_branch             INTEGER NOT NULL DEFAULT 0,
    branch_reason         TEXT,
    name                  TEXT,
    description           TEXT
);

CREATE TABLE IF NOT EXISTS thoughts (
    checkpoint_id   TEXT NOT NULL,
    id              TEXT NOT NULL,
    type            TEXT NOT NULL CHECK(type IN ('planning','reasoning','tool_selection','tool_execution','reflection','decision','observation','correction')),
    content         TEXT NOT NULL,
    reasoning       TEXT,
    confidence      REAL NOT NULL,
    parent_id       TEXT,
    children_json   TEXT NOT NULL,
    metadata_json   TEXT,
    created_at      TEXT NOT NULL,
    PRIMARY KEY (checkpoint_id, id)
);

CREATE TABLE IF NOT EXISTS tool_calls (
    checkpoint_id   TEXT NOT NULL,
    id              TEXT NOT NULL,
    tool_id         TEXT NOT NULL,
    arguments_json  TEXT NOT NULL,
    result_json     TEXT,
    success         INTEGER NOT NULL,
    duration_ms     INTEGER,
    timestamp       TEXT NOT NULL,
    PRIMARY KEY (checkpoint_id, id)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_execution ON checkpoints(execution_id);
CREATE INDEX IF NOT EXISTS idx_checkpoints_parent ON checkpoints(parent_checkpoint_id);
CREATE INDEX IF NOT EXISTS idx_thoughts_checkpoint ON thoughts(checkpoint_id);
CREATE INDEX IF NOT EXISTS idx_tool_calls_checkpoint ON tool_calls(checkpoint_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
