//! Typed lifecycle events broadcast to external observers.
//!
//! [`AgentEvent`] is the closed catalogue of events an execution emits. It
//! serializes as a tagged union keyed by `type` (`agent.started`,
//! `thought.created`, ...) so any transport can carry it unchanged.
//! [`EventBus`](bus::EventBus) delivers events to in-process listeners.

pub mod bus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::checkpoint::Checkpoint;
use crate::models::ensure_id;
use crate::models::pause::PausePoint;
use crate::models::thought::ThoughtStep;
use crate::models::tool::ToolCall;
use crate::orchestrator::phases::TaskResult;
use crate::{AppError, Result};

pub use bus::{EventBus, EventFilter, SubscriptionId};

/// Error payload carried by `error.occurred`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetails {
    /// Failure message.
    pub message: String,
    /// Optional stack or cause chain.
    pub stack: Option<String>,
    /// Optional machine code.
    pub code: Option<String>,
}

/// Lifecycle event catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// An execution began.
    #[serde(rename = "agent.started")]
    Started {
        /// Execution identifier.
        execution_id: String,
        /// Agent identifier.
        agent_id: String,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// A checkpoint was saved.
    #[serde(rename = "agent.checkpoint")]
    Checkpoint {
        /// Execution identifier.
        execution_id: String,
        /// The saved checkpoint.
        checkpoint: Box<Checkpoint>,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// A pause point was raised.
    #[serde(rename = "agent.paused")]
    Paused {
        /// Execution identifier.
        execution_id: String,
        /// The raised pause point.
        pause_point: Box<PausePoint>,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// A paused execution continued.
    #[serde(rename = "agent.resumed")]
    Resumed {
        /// Execution identifier.
        execution_id: String,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// An execution produced its result.
    #[serde(rename = "agent.completed")]
    Completed {
        /// Execution identifier.
        execution_id: String,
        /// Terminal result.
        result: TaskResult,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// A thought step was appended.
    #[serde(rename = "thought.created")]
    ThoughtCreated {
        /// Execution identifier.
        execution_id: String,
        /// The new step.
        thought: ThoughtStep,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// A tool call was dispatched.
    #[serde(rename = "tool.called")]
    ToolCalled {
        /// Execution identifier.
        execution_id: String,
        /// The dispatched call.
        tool_call: ToolCall,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// A tool call finished.
    #[serde(rename = "tool.completed")]
    ToolCompleted {
        /// Execution identifier.
        execution_id: String,
        /// The finished call.
        tool_call: ToolCall,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
    /// An execution failed.
    #[serde(rename = "error.occurred")]
    ErrorOccurred {
        /// Execution identifier.
        execution_id: String,
        /// Failure details.
        error: ErrorDetails,
        /// Emission time.
        timestamp: DateTime<Utc>,
    },
}

/// Category of an [`AgentEvent`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `agent.started`
    Started,
    /// `agent.checkpoint`
    Checkpoint,
    /// `agent.paused`
    Paused,
    /// `agent.resumed`
    Resumed,
    /// `agent.completed`
    Completed,
    /// `thought.created`
    ThoughtCreated,
    /// `tool.called`
    ToolCalled,
    /// `tool.completed`
    ToolCompleted,
    /// `error.occurred`
    ErrorOccurred,
}

impl EventKind {
    /// Wire name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "agent.started",
            Self::Checkpoint => "agent.checkpoint",
            Self::Paused => "agent.paused",
            Self::Resumed => "agent.resumed",
            Self::Completed => "agent.completed",
            Self::ThoughtCreated => "thought.created",
            Self::ToolCalled => "tool.called",
            Self::ToolCompleted => "tool.completed",
            Self::ErrorOccurred => "error.occurred",
        }
    }
}

impl AgentEvent {
    /// Category of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Started { .. } => EventKind::Started,
            Self::Checkpoint { .. } => EventKind::Checkpoint,
            Self::Paused { .. } => EventKind::Paused,
            Self::Resumed { .. } => EventKind::Resumed,
            Self::Completed { .. } => EventKind::Completed,
            Self::ThoughtCreated { .. } => EventKind::ThoughtCreated,
            Self::ToolCalled { .. } => EventKind::ToolCalled,
            Self::ToolCompleted { .. } => EventKind::ToolCompleted,
            Self::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    /// Execution the event belongs to.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        match self {
            Self::Started { execution_id, .. }
            | Self::Checkpoint { execution_id, .. }
            | Self::Paused { execution_id, .. }
            | Self::Resumed { execution_id, .. }
            | Self::Completed { execution_id, .. }
            | Self::ThoughtCreated { execution_id, .. }
            | Self::ToolCalled { execution_id, .. }
            | Self::ToolCompleted { execution_id, .. }
            | Self::ErrorOccurred { execution_id, .. } => execution_id,
        }
    }

    /// Validate the event payload against its variant's shape.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if an id is empty or an embedded record
    /// is malformed.
    pub fn validate(&self) -> Result<()> {
        ensure_id("event execution id", self.execution_id())?;
        match self {
            Self::Started { agent_id, .. } => ensure_id("event agent id", agent_id),
            Self::Checkpoint {
                execution_id,
                checkpoint,
                ..
            } => {
                checkpoint.validate()?;
                if checkpoint.execution_id != *execution_id {
                    return Err(AppError::Validation(format!(
                        "checkpoint {} belongs to execution {}, not {execution_id}",
                        checkpoint.id, checkpoint.execution_id
                    )));
                }
                Ok(())
            }
            Self::Paused { pause_point, .. } => pause_point.validate(),
            Self::Resumed { .. } | Self::Completed { .. } => Ok(()),
            Self::ThoughtCreated { thought, .. } => thought.validate(),
            Self::ToolCalled { tool_call, .. } | Self::ToolCompleted { tool_call, .. } => {
                ensure_id("tool call id", &tool_call.id)?;
                ensure_id("tool id", &tool_call.tool_id)
            }
            Self::ErrorOccurred { error, .. } => {
                if error.message.is_empty() {
                    return Err(AppError::Validation(
                        "error event message must not be empty".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}
