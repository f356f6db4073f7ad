//! Checkpoint repository for `SQLite` persistence.
//!
//! A checkpoint is written as one `checkpoints` row carrying the full
//! snapshot JSON, plus one `thoughts` row per thought step and one
//! `tool_calls` row per completed tool call. The normalized rows exist so
//! step and tool history can be queried without decoding whole snapshots.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::checkpoint::{
    Checkpoint, CheckpointDiff, CheckpointMetadata, CheckpointParent, CheckpointReason,
};
use crate::models::state::RuntimeState;
use crate::models::thought::{ThoughtCategory, ThoughtStep};
use crate::models::tool::{ToolCall, ToolCallStatus};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for checkpoint records.
#[derive(Clone)]
pub struct CheckpointRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CheckpointRow {
    id: String,
    version: String,
    timestamp: String,
    execution_id: String,
    agent_id: String,
    snapshot_json: String,
    step_number: i64,
    total_steps_estimate: Option<i64>,
    tokens_used: i64,
    duration_ms: i64,
    checkpoint_reason: String,
    agent_name: Option<String>,
    diff_json: Option<String>,
    parent_checkpoint_id: Option<String>,
    is_branch: i64,
    branch_reason: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

impl CheckpointRow {
    /// Convert a database row into a validated checkpoint.
    fn into_checkpoint(self) -> Result<Checkpoint> {
        let snapshot: RuntimeState = serde_json::from_str(&self.snapshot_json).map_err(|e| {
            AppError::Validation(format!("stored snapshot for {} is malformed: {e}", self.id))
        })?;
        let diff: Option<CheckpointDiff> = self
            .diff_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid diff_json: {e}")))?;
        let parent = self.parent_checkpoint_id.map(|checkpoint_id| CheckpointParent {
            checkpoint_id,
            is_branch: self.is_branch != 0,
            branch_reason: self.branch_reason,
        });

        let checkpoint = Checkpoint {
            version: self.version,
            id: self.id,
            timestamp: parse_timestamp("timestamp", &self.timestamp)?,
            execution_id: self.execution_id,
            agent_id: self.agent_id.clone(),
            snapshot,
            metadata: CheckpointMetadata {
                step_number: from_i64("step_number", self.step_number)?,
                total_steps_estimate: self
                    .total_steps_estimate
                    .map(|v| from_i64("total_steps_estimate", v))
                    .transpose()?,
                tokens_used: from_i64("tokens_used", self.tokens_used)?,
                duration_ms: from_i64("duration_ms", self.duration_ms)?,
                checkpoint_reason: CheckpointReason::parse(&self.checkpoint_reason)?,
                agent_name: self.agent_name,
                agent_id: self.agent_id,
            },
            diff,
            parent,
            name: self.name,
            description: self.description,
        };
        checkpoint.validate()?;
        Ok(checkpoint)
    }
}

#[derive(sqlx::FromRow)]
struct ThoughtRow {
    id: String,
    #[sqlx(rename = "type")]
    category: String,
    content: String,
    reasoning: Option<String>,
    confidence: f64,
    parent_id: Option<String>,
    children_json: String,
    metadata_json: Option<String>,
    created_at: String,
}

impl ThoughtRow {
    fn into_step(self) -> Result<ThoughtStep> {
        let children: Vec<String> = serde_json::from_str(&self.children_json)
            .map_err(|e| AppError::Db(format!("invalid children_json: {e}")))?;
        let metadata = self
            .metadata_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid metadata_json: {e}")))?;
        Ok(ThoughtStep {
            id: self.id,
            category: ThoughtCategory::parse(&self.category)?,
            content: self.content,
            reasoning: self.reasoning,
            confidence: self.confidence,
            alternatives: None,
            parent_id: self.parent_id,
            children,
            metadata,
            timestamp: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ToolCallRow {
    id: String,
    tool_id: String,
    arguments_json: String,
    result_json: Option<String>,
    success: i64,
    duration_ms: Option<i64>,
    timestamp: String,
}

impl ToolCallRow {
    fn into_call(self) -> Result<ToolCall> {
        let arguments = serde_json::from_str(&self.arguments_json)
            .map_err(|e| AppError::Db(format!("invalid arguments_json: {e}")))?;
        let result = self
            .result_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid result_json: {e}")))?;
        Ok(ToolCall {
            id: self.id,
            tool_id: self.tool_id,
            arguments,
            status: if self.success != 0 {
                ToolCallStatus::Completed
            } else {
                ToolCallStatus::Failed
            },
            result,
            error: None,
            duration_ms: self
                .duration_ms
                .map(|v| from_i64("duration_ms", v))
                .transpose()?,
            timestamp: parse_timestamp("timestamp", &self.timestamp)?,
        })
    }
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

fn to_i64(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| AppError::Db(format!("{field} out of range: {value}")))
}

fn from_i64(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| AppError::Db(format!("{field} is negative: {value}")))
}

impl CheckpointRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a checkpoint with its thought and completed tool-call rows.
    ///
    /// All rows are written in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any insert fails, or
    /// `AppError::Serialization` if a payload cannot be encoded.
    pub async fn create(&self, checkpoint: &Checkpoint) -> Result<()> {
        let snapshot_json = serde_json::to_string(&checkpoint.snapshot)?;
        let diff_json = checkpoint
            .diff
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let meta = &checkpoint.metadata;
        let total_steps_estimate = meta
            .total_steps_estimate
            .map(|v| to_i64("total_steps_estimate", v))
            .transpose()?;
        let parent = checkpoint.parent.as_ref();

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO checkpoints (id, version, timestamp, execution_id, agent_id,
             snapshot_json, step_number, total_steps_estimate, tokens_used, duration_ms,
             checkpoint_reason, agent_name, diff_json, parent_checkpoint_id, is_branch,
             branch_reason, name, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.version)
        .bind(checkpoint.timestamp.to_rfc3339())
        .bind(&checkpoint.execution_id)
        .bind(&checkpoint.agent_id)
        .bind(&snapshot_json)
        .bind(to_i64("step_number", meta.step_number)?)
        .bind(total_steps_estimate)
        .bind(to_i64("tokens_used", meta.tokens_used)?)
        .bind(to_i64("duration_ms", meta.duration_ms)?)
        .bind(meta.checkpoint_reason.as_str())
        .bind(&meta.agent_name)
        .bind(&diff_json)
        .bind(parent.map(|p| p.checkpoint_id.as_str()))
        .bind(i64::from(parent.is_some_and(|p| p.is_branch)))
        .bind(parent.and_then(|p| p.branch_reason.as_deref()))
        .bind(&checkpoint.name)
        .bind(&checkpoint.description)
        .execute(&mut *tx)
        .await?;

        for step in &checkpoint.snapshot.thought_chain.steps {
            let children_json = serde_json::to_string(&step.children)?;
            let metadata_json = step
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                "INSERT INTO thoughts (checkpoint_id, id, type, content, reasoning, confidence,
                 parent_id, children_json, metadata_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .bind(&checkpoint.id)
            .bind(&step.id)
            .bind(step.category.as_str())
            .bind(&step.content)
            .bind(&step.reasoning)
            .bind(step.confidence)
            .bind(&step.parent_id)
            .bind(&children_json)
            .bind(&metadata_json)
            .bind(step.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        for call in &checkpoint.snapshot.tool_state.completed {
            let arguments_json = serde_json::to_string(&call.arguments)?;
            let result_json = call.result.as_ref().map(serde_json::to_string).transpose()?;
            let duration_ms = call
                .duration_ms
                .map(|v| to_i64("duration_ms", v))
                .transpose()?;
            sqlx::query(
                "INSERT INTO tool_calls (checkpoint_id, id, tool_id, arguments_json, result_json,
                 success, duration_ms, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&checkpoint.id)
            .bind(&call.id)
            .bind(&call.tool_id)
            .bind(&arguments_json)
            .bind(&result_json)
            .bind(i64::from(call.status == ToolCallStatus::Completed))
            .bind(duration_ms)
            .bind(call.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieve a checkpoint by identifier.
    ///
    /// Returns `Ok(None)` if the checkpoint does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails, or `AppError::Validation`
    /// if the stored record fails schema validation.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Checkpoint>> {
        let row: Option<CheckpointRow> = sqlx::query_as("SELECT * FROM checkpoints WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(CheckpointRow::into_checkpoint).transpose()
    }

    /// List all checkpoints of one execution, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_execution(&self, execution_id: &str) -> Result<Vec<Checkpoint>> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            "SELECT * FROM checkpoints WHERE execution_id = ?1 ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(execution_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }

    /// Thought steps recorded with a checkpoint, in chain order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn thoughts_for_checkpoint(&self, checkpoint_id: &str) -> Result<Vec<ThoughtStep>> {
        let rows: Vec<ThoughtRow> = sqlx::query_as(
            "SELECT id, type, content, reasoning, confidence, parent_id, children_json,
             metadata_json, created_at
             FROM thoughts WHERE checkpoint_id = ?1 ORDER BY rowid ASC",
        )
        .bind(checkpoint_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ThoughtRow::into_step).collect()
    }

    /// Completed tool calls recorded with a checkpoint, in completion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn tool_calls_for_checkpoint(&self, checkpoint_id: &str) -> Result<Vec<ToolCall>> {
        let rows: Vec<ToolCallRow> = sqlx::query_as(
            "SELECT id, tool_id, arguments_json, result_json, success, duration_ms, timestamp
             FROM tool_calls WHERE checkpoint_id = ?1 ORDER BY rowid ASC",
        )
        .bind(checkpoint_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ToolCallRow::into_call).collect()
    }
}
