//! Tool-call ledger: call records and the four disjoint lifecycle queues.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ensure_id;
use crate::{AppError, Result};

/// Argument mapping passed to a tool.
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Queued, not yet dispatched.
    Pending,
    /// Dispatched and awaiting a result.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Abandoned before dispatch.
    Cancelled,
}

/// A single tool invocation record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique call identifier.
    pub id: String,
    /// Tool definition identifier.
    pub tool_id: String,
    /// Call arguments.
    pub arguments: ToolArguments,
    /// Current status.
    pub status: ToolCallStatus,
    /// Result payload on success.
    pub result: Option<serde_json::Value>,
    /// Error string on failure.
    pub error: Option<String>,
    /// Execution duration.
    pub duration_ms: Option<u64>,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    /// Construct a pending call with a generated identifier.
    #[must_use]
    pub fn new(tool_id: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_id: tool_id.into(),
            arguments,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    fn validate(&self) -> Result<()> {
        ensure_id("tool call id", &self.id)?;
        ensure_id("tool id", &self.tool_id)
    }
}

/// Which queue a tool call currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolQueue {
    /// `pending` id queue.
    Pending,
    /// `running` id queue.
    Running,
    /// `completed` record queue.
    Completed,
    /// `failed` record queue.
    Failed,
}

/// Ledger of tool-call requests and their lifecycle.
///
/// A call id appears in at most one of the four queues at any time; every
/// mutator here moves an id rather than copying it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolState {
    /// Most recently dispatched call.
    pub last_tool_call_id: Option<String>,
    /// Queued call ids.
    pub pending: Vec<String>,
    /// Dispatched call ids.
    pub running: Vec<String>,
    /// Successful call records.
    pub completed: Vec<ToolCall>,
    /// Failed or cancelled call records.
    pub failed: Vec<ToolCall>,
}

impl ToolState {
    /// Locate a call id across the four queues.
    #[must_use]
    pub fn location(&self, id: &str) -> Option<ToolQueue> {
        if self.pending.iter().any(|p| p == id) {
            Some(ToolQueue::Pending)
        } else if self.running.iter().any(|r| r == id) {
            Some(ToolQueue::Running)
        } else if self.completed.iter().any(|c| c.id == id) {
            Some(ToolQueue::Completed)
        } else if self.failed.iter().any(|f| f.id == id) {
            Some(ToolQueue::Failed)
        } else {
            None
        }
    }

    /// Queue a new call id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the id is empty or already tracked.
    pub fn enqueue(&mut self, id: &str) -> Result<()> {
        ensure_id("tool call id", id)?;
        if let Some(queue) = self.location(id) {
            return Err(AppError::Validation(format!(
                "tool call {id} already tracked in {queue:?} queue"
            )));
        }
        self.pending.push(id.to_owned());
        Ok(())
    }

    /// Move a pending call to running and mark it as the last dispatched call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the id is not pending.
    pub fn start(&mut self, id: &str) -> Result<()> {
        let index = self
            .pending
            .iter()
            .position(|p| p == id)
            .ok_or_else(|| AppError::Validation(format!("tool call {id} is not pending")))?;
        let id = self.pending.remove(index);
        self.last_tool_call_id = Some(id.clone());
        self.running.push(id);
        Ok(())
    }

    /// Record the outcome of a call that is pending or running.
    ///
    /// The record lands in `completed` when its status is `Completed`, and in
    /// `failed` when it is `Failed` or `Cancelled`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the call is not in flight or its
    /// status is not terminal.
    pub fn finish(&mut self, call: ToolCall) -> Result<()> {
        let terminal_failure = matches!(
            call.status,
            ToolCallStatus::Failed | ToolCallStatus::Cancelled
        );
        if call.status != ToolCallStatus::Completed && !terminal_failure {
            return Err(AppError::Validation(format!(
                "tool call {} finished with non-terminal status {:?}",
                call.id, call.status
            )));
        }

        if let Some(index) = self.running.iter().position(|r| *r == call.id) {
            self.running.remove(index);
        } else if let Some(index) = self.pending.iter().position(|p| *p == call.id) {
            self.pending.remove(index);
        } else {
            return Err(AppError::Validation(format!(
                "tool call {} is not in flight",
                call.id
            )));
        }

        if terminal_failure {
            self.failed.push(call);
        } else {
            self.completed.push(call);
        }
        Ok(())
    }

    /// Validate record fields, queue disjointness, and status/queue agreement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` on the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let ids = self
            .pending
            .iter()
            .chain(self.running.iter())
            .chain(self.completed.iter().map(|c| &c.id))
            .chain(self.failed.iter().map(|f| &f.id));
        for id in ids {
            ensure_id("tool call id", id)?;
            if !seen.insert(id.as_str()) {
                return Err(AppError::Validation(format!(
                    "tool call {id} appears in more than one queue position"
                )));
            }
        }

        for call in &self.completed {
            call.validate()?;
            if call.status != ToolCallStatus::Completed {
                return Err(AppError::Validation(format!(
                    "completed queue holds call {} with status {:?}",
                    call.id, call.status
                )));
            }
        }
        for call in &self.failed {
            call.validate()?;
            if !matches!(
                call.status,
                ToolCallStatus::Failed | ToolCallStatus::Cancelled
            ) {
                return Err(AppError::Validation(format!(
                    "failed queue holds call {} with status {:?}",
                    call.id, call.status
                )));
            }
        }

        if let Some(last) = &self.last_tool_call_id {
            ensure_id("last_tool_call_id", last)?;
        }
        Ok(())
    }
}
