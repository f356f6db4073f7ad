//! Runtime state: the unit of resumable progress for one execution.

use serde::{Deserialize, Serialize};

use super::context::Context;
use super::progress::ExecutionProgress;
use super::thought::ThoughtChain;
use super::tool::ToolState;
use crate::Result;

/// Canonical in-memory representation of one execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeState {
    /// Reasoning trace.
    pub thought_chain: ThoughtChain,
    /// Conversational context.
    pub context: Context,
    /// Tool-call ledger.
    pub tool_state: ToolState,
    /// Progress counters.
    pub progress: ExecutionProgress,
}

impl RuntimeState {
    /// Build a fresh state for `task`.
    ///
    /// Without a context seed the `task` variable is set to the task string.
    #[must_use]
    pub fn create_empty(task: &str, context: Option<Context>) -> Self {
        Self {
            thought_chain: ThoughtChain::default(),
            context: context.unwrap_or_else(|| Context::seeded(task)),
            tool_state: ToolState::default(),
            progress: ExecutionProgress::default(),
        }
    }

    /// Accept a snapshot only if every structural invariant holds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` describing the first violation.
    pub fn load_from_snapshot(snapshot: Self) -> Result<Self> {
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Decode and validate a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the JSON does not match the schema
    /// or violates an invariant.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let snapshot: Self = serde_json::from_value(value).map_err(|err| {
            crate::AppError::Validation(format!("runtime state does not match schema: {err}"))
        })?;
        Self::load_from_snapshot(snapshot)
    }

    /// Order-preserving JSON representation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Serialization` if a value cannot be encoded.
    pub fn serialize(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Validate every component.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        self.thought_chain.validate()?;
        self.context.validate()?;
        self.tool_state.validate()?;
        self.progress.validate()
    }
}
