//! Pause points and the interventions that resolve them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ensure_id;
use crate::{AppError, Result};

/// Checkpoint id recorded when no checkpoint exists yet.
pub const NO_CHECKPOINT: &str = "none";

/// Condition that raised a pause point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PauseTrigger {
    /// A tool call needs confirmation before dispatch.
    ToolConfirmation,
    /// A tool call failed.
    ToolError,
    /// A step needs human review.
    HumanReview,
    /// A deadline elapsed.
    Timeout,
    /// A thought fell below the confidence threshold.
    ConfidenceLow,
    /// Requested explicitly.
    Manual,
    /// Execution may fork.
    BranchPoint,
    /// The agent needs clarification.
    ClarificationNeeded,
}

/// Kind of action an operator may choose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PauseAction {
    /// Approve the pending step.
    Approve,
    /// Reject the pending step.
    Reject,
    /// Continue with modified state.
    Modify,
    /// Continue unchanged.
    Continue,
    /// Hand off to a higher authority.
    Escalate,
    /// Stop the execution.
    Cancel,
    /// Redo the current iteration.
    Retry,
}

impl PauseAction {
    /// Whether choosing this action lets the execution proceed.
    #[must_use]
    pub fn proceeds(self) -> bool {
        matches!(
            self,
            Self::Approve | Self::Modify | Self::Continue | Self::Retry
        )
    }
}

/// Trigger-specific details; the variant determines the pause trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerDetails {
    /// A tool call awaits confirmation.
    ToolConfirmation {
        /// Call awaiting confirmation.
        tool_call_id: String,
        /// Tool being called.
        tool_id: String,
    },
    /// A tool call failed.
    ToolError {
        /// Failed call.
        tool_call_id: String,
        /// Error reported by the tool.
        error: String,
    },
    /// A step needs review.
    HumanReview {
        /// Step under review.
        step_id: Option<String>,
        /// Why review is needed.
        reason: String,
    },
    /// A deadline elapsed.
    Timeout {
        /// Elapsed time when the deadline fired.
        elapsed_ms: u64,
    },
    /// A thought fell below threshold.
    ConfidenceLow {
        /// Low-confidence step.
        step_id: String,
        /// Its confidence.
        confidence: f64,
        /// Configured threshold.
        threshold: f64,
    },
    /// Requested explicitly.
    Manual {
        /// Who asked for the pause.
        requested_by: Option<String>,
    },
    /// Execution may fork.
    BranchPoint {
        /// Candidate branches.
        options: Vec<String>,
    },
    /// The agent needs clarification.
    ClarificationNeeded {
        /// Question for the operator.
        question: String,
    },
}

impl TriggerDetails {
    /// The trigger these details describe.
    #[must_use]
    pub fn trigger(&self) -> PauseTrigger {
        match self {
            Self::ToolConfirmation { .. } => PauseTrigger::ToolConfirmation,
            Self::ToolError { .. } => PauseTrigger::ToolError,
            Self::HumanReview { .. } => PauseTrigger::HumanReview,
            Self::Timeout { .. } => PauseTrigger::Timeout,
            Self::ConfidenceLow { .. } => PauseTrigger::ConfidenceLow,
            Self::Manual { .. } => PauseTrigger::Manual,
            Self::BranchPoint { .. } => PauseTrigger::BranchPoint,
            Self::ClarificationNeeded { .. } => PauseTrigger::ClarificationNeeded,
        }
    }
}

/// Typed parameter accepted by an available action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionParameter {
    /// Parameter value type (e.g. `string`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the parameter must be supplied.
    pub required: bool,
    /// Parameter description.
    pub description: String,
}

/// One action offered to the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableAction {
    /// Action identifier.
    pub id: String,
    /// Button label.
    pub label: String,
    /// Longer description.
    pub description: String,
    /// Action kind.
    #[serde(rename = "type")]
    pub kind: PauseAction,
    /// Typed parameters keyed by name.
    pub parameters: Option<BTreeMap<String, ActionParameter>>,
}

impl AvailableAction {
    /// An action without parameters.
    #[must_use]
    pub fn new(id: &str, label: &str, description: &str, kind: PauseAction) -> Self {
        Self {
            id: id.to_owned(),
            label: label.to_owned(),
            description: description.to_owned(),
            kind,
            parameters: None,
        }
    }

    /// The default `{continue, cancel}` action set.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("continue", "Continue", "Resume execution", PauseAction::Continue),
            Self::new("cancel", "Cancel", "Cancel execution", PauseAction::Cancel),
        ]
    }
}

/// A suspension request raised by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PausePoint {
    /// Unique pause point identifier.
    pub id: String,
    /// Owning execution.
    pub execution_id: String,
    /// Checkpoint active when the pause was raised, or [`NO_CHECKPOINT`].
    pub checkpoint_id: String,
    /// Raising condition.
    pub trigger: PauseTrigger,
    /// Condition details.
    pub trigger_details: TriggerDetails,
    /// Human-readable status.
    pub status_summary: String,
    /// Questions for the operator.
    pub pending_questions: Vec<String>,
    /// Actions the operator may choose.
    pub available_actions: Vec<AvailableAction>,
    /// Wait deadline.
    pub timeout_ms: Option<u64>,
    /// Action taken when the deadline elapses.
    pub on_timeout: Option<PauseAction>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PausePoint {
    /// Construct an unresolved pause point with the default action set.
    #[must_use]
    pub fn new(execution_id: String, checkpoint_id: Option<String>, details: TriggerDetails) -> Self {
        let trigger = details.trigger();
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id,
            checkpoint_id: checkpoint_id.unwrap_or_else(|| NO_CHECKPOINT.to_owned()),
            trigger,
            trigger_details: details,
            status_summary: format!("Paused: {}", trigger_label(trigger)),
            pending_questions: Vec::new(),
            available_actions: AvailableAction::defaults(),
            timeout_ms: None,
            on_timeout: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Validate ids and the trigger/details agreement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        ensure_id("pause point id", &self.id)?;
        ensure_id("execution id", &self.execution_id)?;
        ensure_id("checkpoint id", &self.checkpoint_id)?;
        if self.trigger != self.trigger_details.trigger() {
            return Err(AppError::Validation(format!(
                "pause trigger {:?} disagrees with details {:?}",
                self.trigger,
                self.trigger_details.trigger()
            )));
        }
        for action in &self.available_actions {
            ensure_id("action id", &action.id)?;
        }
        Ok(())
    }
}

fn trigger_label(trigger: PauseTrigger) -> &'static str {
    match trigger {
        PauseTrigger::ToolConfirmation => "tool_confirmation",
        PauseTrigger::ToolError => "tool_error",
        PauseTrigger::HumanReview => "human_review",
        PauseTrigger::Timeout => "timeout",
        PauseTrigger::ConfidenceLow => "confidence_low",
        PauseTrigger::Manual => "manual",
        PauseTrigger::BranchPoint => "branch_point",
        PauseTrigger::ClarificationNeeded => "clarification_needed",
    }
}

/// Replacement value for an earlier decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModifiedDecision {
    /// Decision (thought step) being overridden.
    pub decision_id: String,
    /// Replacement value.
    pub new_value: serde_json::Value,
    /// Why it was overridden.
    pub reason: String,
}

/// The operator's chosen action and optional amendments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterventionResponse {
    /// Chosen action.
    pub action: PauseAction,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Context variables to merge before continuing.
    pub modified_state: Option<serde_json::Map<String, serde_json::Value>>,
    /// Override of an earlier decision.
    pub modified_decision: Option<ModifiedDecision>,
    /// Prompt suggestion for the next step.
    pub suggested_prompt: Option<String>,
}

impl InterventionResponse {
    /// A bare response choosing `action`.
    #[must_use]
    pub fn action(action: PauseAction) -> Self {
        Self {
            action,
            notes: None,
            modified_state: None,
            modified_decision: None,
            suggested_prompt: None,
        }
    }
}

/// The external response correlated to a pause point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intervention {
    /// Unique intervention identifier.
    pub id: String,
    /// Owning execution.
    pub execution_id: String,
    /// Resolved pause point.
    pub pause_point_id: String,
    /// When the pause point was raised.
    pub requested_at: DateTime<Utc>,
    /// When the response arrived.
    pub responded_at: Option<DateTime<Utc>>,
    /// Responder identity.
    pub responder: Option<String>,
    /// Response payload.
    pub response: Option<InterventionResponse>,
}

impl Intervention {
    /// The chosen action, defaulting to `Continue` for a bare resolution.
    #[must_use]
    pub fn action(&self) -> PauseAction {
        self.response
            .as_ref()
            .map_or(PauseAction::Continue, |response| response.action)
    }
}
