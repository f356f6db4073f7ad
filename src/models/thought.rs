//! Thought chain model: the tree-linked reasoning trace of an execution.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ensure_id, ensure_unit_interval};
use crate::{AppError, Result};

/// Classification of a single reasoning step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtCategory {
    /// Breaking the task into steps.
    Planning,
    /// General reasoning about the task.
    Reasoning,
    /// Choosing which tool to call.
    ToolSelection,
    /// Reasoning about a running tool call.
    ToolExecution,
    /// Self-assessment of earlier steps.
    Reflection,
    /// A committed choice between alternatives.
    Decision,
    /// Noting an external observation.
    Observation,
    /// Fixing an earlier mistake.
    Correction,
}

impl ThoughtCategory {
    /// Wire representation used in storage rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Reasoning => "reasoning",
            Self::ToolSelection => "tool_selection",
            Self::ToolExecution => "tool_execution",
            Self::Reflection => "reflection",
            Self::Decision => "decision",
            Self::Observation => "observation",
            Self::Correction => "correction",
        }
    }

    /// Parse the wire representation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an unknown category.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "planning" => Ok(Self::Planning),
            "reasoning" => Ok(Self::Reasoning),
            "tool_selection" => Ok(Self::ToolSelection),
            "tool_execution" => Ok(Self::ToolExecution),
            "reflection" => Ok(Self::Reflection),
            "decision" => Ok(Self::Decision),
            "observation" => Ok(Self::Observation),
            "correction" => Ok(Self::Correction),
            other => Err(AppError::Validation(format!("invalid thought type: {other}"))),
        }
    }
}

/// An option that was considered and rejected at a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alternative {
    /// The rejected option.
    pub option: String,
    /// Why it was rejected.
    pub reason_rejected: String,
    /// Optional confidence the option would have carried.
    pub confidence: Option<f64>,
}

/// One node of the thought chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThoughtStep {
    /// Unique step identifier.
    pub id: String,
    /// Step category.
    #[serde(rename = "type")]
    pub category: ThoughtCategory,
    /// Free-text content.
    pub content: String,
    /// Optional rationale behind the content.
    pub reasoning: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Rejected alternatives with reasons.
    pub alternatives: Option<Vec<Alternative>>,
    /// Parent step, if any.
    pub parent_id: Option<String>,
    /// Child step ids.
    pub children: Vec<String>,
    /// Free-form metadata.
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
}

impl ThoughtStep {
    /// Construct a new parentless step with a generated identifier.
    #[must_use]
    pub fn new(category: ThoughtCategory, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            content: content.into(),
            reasoning: None,
            confidence,
            alternatives: None,
            parent_id: None,
            children: Vec::new(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Validate field-level ranges, independent of the owning chain.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an empty id or an out-of-range confidence.
    pub fn validate(&self) -> Result<()> {
        ensure_id("thought step id", &self.id)?;
        ensure_unit_interval("thought confidence", self.confidence)?;
        if let Some(alternatives) = &self.alternatives {
            for alt in alternatives {
                if let Some(confidence) = alt.confidence {
                    if !confidence.is_finite() {
                        return Err(AppError::Validation(format!(
                            "alternative {} has non-finite confidence",
                            alt.option
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Ordered, tree-linked sequence of reasoning steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThoughtChain {
    /// The most recently focused step.
    pub current_step_id: Option<String>,
    /// Steps in creation order.
    pub steps: Vec<ThoughtStep>,
}

impl ThoughtChain {
    /// Look up a step by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ThoughtStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// The step referenced by `current_step_id`.
    #[must_use]
    pub fn current(&self) -> Option<&ThoughtStep> {
        self.current_step_id.as_deref().and_then(|id| self.get(id))
    }

    /// Append a step as a child of `parent_id` (if given) and focus it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the step is invalid, its id is
    /// already present, or the named parent does not exist.
    pub fn append(&mut self, mut step: ThoughtStep, parent_id: Option<&str>) -> Result<&ThoughtStep> {
        step.validate()?;
        if self.get(&step.id).is_some() {
            return Err(AppError::Validation(format!(
                "duplicate thought step id: {}",
                step.id
            )));
        }
        if let Some(parent_id) = parent_id {
            let parent = self
                .steps
                .iter_mut()
                .find(|existing| existing.id == parent_id)
                .ok_or_else(|| {
                    AppError::Validation(format!("parent thought step {parent_id} does not exist"))
                })?;
            parent.children.push(step.id.clone());
            step.parent_id = Some(parent_id.to_owned());
        }
        self.current_step_id = Some(step.id.clone());
        self.steps.push(step);
        let last = self.steps.len() - 1;
        Ok(&self.steps[last])
    }

    /// Validate ranges and referential closure of parent/child links.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if any step is malformed, ids repeat,
    /// or a parent, child, or current id references a missing step.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::with_capacity(self.steps.len());
        for step in &self.steps {
            step.validate()?;
            if !ids.insert(step.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate thought step id: {}",
                    step.id
                )));
            }
        }

        for step in &self.steps {
            if let Some(parent) = &step.parent_id {
                if !ids.contains(parent.as_str()) {
                    return Err(AppError::Validation(format!(
                        "thought step {} references missing parent {parent}",
                        step.id
                    )));
                }
            }
            if let Some(child) = step.children.iter().find(|c| !ids.contains(c.as_str())) {
                return Err(AppError::Validation(format!(
                    "thought step {} references missing child {child}",
                    step.id
                )));
            }
        }

        if let Some(current) = &self.current_step_id {
            if !ids.contains(current.as_str()) {
                return Err(AppError::Validation(format!(
                    "current_step_id {current} references a missing step"
                )));
            }
        }
        Ok(())
    }
}
