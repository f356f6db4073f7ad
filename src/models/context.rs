//! Conversational context: message history, variables, and memory.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ensure_unit_interval;
use super::tool::ToolArguments;
use crate::Result;

/// Variable key seeded with the task string.
pub const TASK_VARIABLE: &str = "task";

/// Author of a context message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// End user input.
    User,
    /// Agent output.
    Assistant,
    /// System instructions.
    System,
    /// Tool output.
    Tool,
}

/// A tool call requested inside a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageToolCall {
    /// Tool call identifier.
    pub id: String,
    /// Tool definition identifier.
    pub tool_id: String,
    /// Call arguments.
    pub arguments: ToolArguments,
}

/// A tool result reported inside a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageToolResult {
    /// Tool call this result answers.
    pub tool_call_id: String,
    /// Result payload on success.
    pub output: Option<serde_json::Value>,
    /// Error string on failure.
    pub error: Option<String>,
}

/// One entry of the ordered message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Message author.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Tool calls requested by this message.
    pub tool_calls: Option<Vec<MessageToolCall>>,
    /// Tool results carried by this message.
    pub tool_results: Option<Vec<MessageToolResult>>,
    /// Optional timestamp.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Construct a plain text message stamped with the current time.
    #[must_use]
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
            timestamp: Some(Utc::now()),
        }
    }
}

/// A weighted fact retained across steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    /// Memory key.
    pub key: String,
    /// Stored value.
    pub value: serde_json::Value,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Conversational context of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Context {
    /// Ordered message history.
    pub messages: Vec<Message>,
    /// Named variables.
    pub variables: HashMap<String, serde_json::Value>,
    /// Optional long-lived memory entries.
    pub memory: Option<Vec<MemoryEntry>>,
}

impl Context {
    /// A context whose only content is the `task` variable.
    #[must_use]
    pub fn seeded(task: &str) -> Self {
        let mut variables = HashMap::new();
        variables.insert(
            TASK_VARIABLE.to_owned(),
            serde_json::Value::String(task.to_owned()),
        );
        Self {
            messages: Vec::new(),
            variables,
            memory: None,
        }
    }

    /// The `task` variable, if it holds a string.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        self.variables.get(TASK_VARIABLE).and_then(serde_json::Value::as_str)
    }

    /// Validate memory importance ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if an importance lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if let Some(memory) = &self.memory {
            for entry in memory {
                ensure_unit_interval("memory importance", entry.importance)?;
            }
        }
        Ok(())
    }
}
