//! Checkpoint model: an immutable, versioned snapshot of runtime state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ensure_id;
use super::state::RuntimeState;
use crate::{AppError, Result};

/// Schema version every checkpoint must carry.
pub const SCHEMA_VERSION: &str = "0.0.1";

/// Why a checkpoint was taken.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointReason {
    /// An execution finished a unit of work.
    StepComplete,
    /// Requested explicitly.
    Manual,
    /// A thought fell below the confidence threshold.
    LowConfidence,
    /// A tool call failed.
    ToolError,
    /// Taken automatically by policy.
    Auto,
    /// Taken before a human decision.
    Decision,
    /// Forked from another checkpoint.
    Branch,
}

impl CheckpointReason {
    /// Wire representation used in storage rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepComplete => "step_complete",
            Self::Manual => "manual",
            Self::LowConfidence => "low_confidence",
            Self::ToolError => "tool_error",
            Self::Auto => "auto",
            Self::Decision => "decision",
            Self::Branch => "branch",
        }
    }

    /// Parse the wire representation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an unknown reason.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "step_complete" => Ok(Self::StepComplete),
            "manual" => Ok(Self::Manual),
            "low_confidence" => Ok(Self::LowConfidence),
            "tool_error" => Ok(Self::ToolError),
            "auto" => Ok(Self::Auto),
            "decision" => Ok(Self::Decision),
            "branch" => Ok(Self::Branch),
            other => Err(AppError::Validation(format!(
                "invalid checkpoint reason: {other}"
            ))),
        }
    }
}

/// Progress and provenance captured alongside the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    /// Step counter at save time.
    pub step_number: u64,
    /// Optional estimate of total steps; positive when set.
    pub total_steps_estimate: Option<u64>,
    /// Tokens consumed at save time.
    pub tokens_used: u64,
    /// Elapsed time since execution start.
    pub duration_ms: u64,
    /// Why the checkpoint was taken.
    pub checkpoint_reason: CheckpointReason,
    /// Human-readable agent name.
    pub agent_name: Option<String>,
    /// Owning agent identifier.
    pub agent_id: String,
}

/// Before/after values of one changed field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    /// Value in the parent checkpoint.
    pub before: serde_json::Value,
    /// Value in this checkpoint.
    pub after: serde_json::Value,
}

/// Field-level difference against a parent checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointDiff {
    /// Parent checkpoint the diff is computed from.
    pub from_checkpoint_id: String,
    /// Changed fields keyed by dotted path.
    pub changes: BTreeMap<String, FieldChange>,
    /// Human summary.
    pub summary: String,
}

/// Link to the checkpoint this one follows or branches from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointParent {
    /// Parent checkpoint identifier.
    pub checkpoint_id: String,
    /// Whether this checkpoint forks rather than linearly follows.
    #[serde(default)]
    pub is_branch: bool,
    /// Why the fork was taken.
    pub branch_reason: Option<String>,
}

/// An immutable, self-contained snapshot of one execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Schema version literal.
    pub version: String,
    /// Unique checkpoint identifier.
    pub id: String,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Owning execution.
    pub execution_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Embedded runtime state.
    pub snapshot: RuntimeState,
    /// Progress and provenance.
    pub metadata: CheckpointMetadata,
    /// Difference against the parent checkpoint.
    pub diff: Option<CheckpointDiff>,
    /// Parent link.
    pub parent: Option<CheckpointParent>,
    /// Optional display name.
    pub name: Option<String>,
    /// Optional description.
    pub description: Option<String>,
}

impl Checkpoint {
    /// Construct a checkpoint at the current schema version.
    #[must_use]
    pub fn new(
        execution_id: String,
        agent_id: String,
        snapshot: RuntimeState,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            version: SCHEMA_VERSION.to_owned(),
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            execution_id,
            agent_id,
            snapshot,
            metadata,
            diff: None,
            parent: None,
            name: None,
            description: None,
        }
    }

    /// Decode a JSON document and validate it end-to-end.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the document does not match the
    /// schema or violates an invariant.
    pub fn from_json(raw: &str) -> Result<Self> {
        let checkpoint: Self = serde_json::from_str(raw).map_err(|err| {
            AppError::Validation(format!("checkpoint does not match schema: {err}"))
        })?;
        checkpoint.validate()?;
        Ok(checkpoint)
    }

    /// Validate the full checkpoint schema, failing closed on version mismatch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(AppError::Validation(format!(
                "unsupported checkpoint version {} (expected {SCHEMA_VERSION})",
                self.version
            )));
        }
        ensure_id("checkpoint id", &self.id)?;
        ensure_id("execution id", &self.execution_id)?;
        ensure_id("agent id", &self.agent_id)?;
        ensure_id("metadata agent id", &self.metadata.agent_id)?;
        if self.metadata.total_steps_estimate == Some(0) {
            return Err(AppError::Validation(
                "metadata total_steps_estimate must be positive".into(),
            ));
        }
        if let Some(parent) = &self.parent {
            ensure_id("parent checkpoint id", &parent.checkpoint_id)?;
        }
        if let Some(diff) = &self.diff {
            ensure_id("diff source checkpoint id", &diff.from_checkpoint_id)?;
        }
        self.snapshot.validate()
    }
}
