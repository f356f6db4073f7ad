//! Pluggable collaborators invoked by the engine's step phases.
//!
//! The thought phase asks a [`ReasoningProvider`] for the next step, the
//! tool phase dispatches queued calls to a [`ToolExecutor`], the reflection
//! phase consults a [`Reflector`], and the exit phase asks a
//! [`CompletionCheck`] whether the task is done. Each has a default that
//! reproduces the reference single-pass behavior.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::state::RuntimeState;
use crate::models::thought::{Alternative, ThoughtCategory};
use crate::models::tool::ToolArguments;
use crate::Result;

/// Terminal value produced by the exit phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskResult {
    /// The task that was run.
    pub task: String,
    /// Step counter at completion.
    pub steps: u64,
    /// Thought steps in the chain at completion.
    pub thought_count: usize,
}

/// Inputs handed to the reasoning provider.
#[derive(Debug, Clone, Copy)]
pub struct ThoughtRequest<'a> {
    /// Task string.
    pub task: &'a str,
    /// Agent instructions.
    pub instructions: &'a str,
    /// State at the start of the thought phase.
    pub state: &'a RuntimeState,
}

/// A tool call requested by a thought.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Tool definition identifier.
    pub tool_id: String,
    /// Call arguments.
    pub arguments: ToolArguments,
}

/// One reasoning step produced by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtOutput {
    /// Step category.
    pub category: ThoughtCategory,
    /// Step content.
    pub content: String,
    /// Optional rationale.
    pub reasoning: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Rejected alternatives.
    pub alternatives: Option<Vec<Alternative>>,
    /// Tool calls to enqueue for the tool phase.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Tokens consumed producing this step.
    pub tokens_used: u64,
}

impl ThoughtOutput {
    /// An output with no tool calls or token usage.
    #[must_use]
    pub fn new(category: ThoughtCategory, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            category,
            content: content.into(),
            reasoning: None,
            confidence,
            alternatives: None,
            tool_calls: Vec::new(),
            tokens_used: 0,
        }
    }

    /// Request a tool call from this step.
    #[must_use]
    pub fn with_tool_call(mut self, tool_id: impl Into<String>, arguments: ToolArguments) -> Self {
        self.tool_calls.push(ToolCallRequest {
            tool_id: tool_id.into(),
            arguments,
        });
        self
    }
}

/// Produces the next thought step from the task and current state.
pub trait ReasoningProvider: Send + Sync {
    /// Produce one thought.
    ///
    /// # Errors
    ///
    /// Any error fails the run with `AppError::Execution`.
    fn think<'a>(
        &'a self,
        request: ThoughtRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<ThoughtOutput>> + Send + 'a>>;
}

/// Reasoner that restates the task with a fixed confidence.
#[derive(Debug, Clone, Copy)]
pub struct StaticReasoner {
    confidence: f64,
}

impl StaticReasoner {
    /// A reasoner reporting `confidence` on every step.
    #[must_use]
    pub fn with_confidence(confidence: f64) -> Self {
        Self { confidence }
    }
}

impl Default for StaticReasoner {
    fn default() -> Self {
        Self { confidence: 0.9 }
    }
}

impl ReasoningProvider for StaticReasoner {
    fn think<'a>(
        &'a self,
        request: ThoughtRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<ThoughtOutput>> + Send + 'a>> {
        let output = ThoughtOutput::new(
            ThoughtCategory::Reasoning,
            format!("Processing task: {}", request.task),
            self.confidence,
        );
        Box::pin(async move { Ok(output) })
    }
}

/// Executes a tool call, returning its result or an error string.
pub trait ToolExecutor: Send + Sync {
    /// Run `tool_id` with `arguments`.
    fn execute<'a>(
        &'a self,
        tool_id: &'a str,
        arguments: &'a ToolArguments,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send + 'a>>;
}

/// Synchronous tool handler.
pub type ToolHandler = Arc<dyn Fn(&ToolArguments) -> std::result::Result<Value, String> + Send + Sync>;

/// Tool executor backed by a map of named handlers.
///
/// Calling an unregistered tool fails that call, not the run.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `tool_id`, replacing any previous handler.
    #[must_use]
    pub fn register<F>(mut self, tool_id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ToolArguments) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(tool_id.into(), Arc::new(handler));
        self
    }

    /// Whether `tool_id` has a handler.
    #[must_use]
    pub fn contains(&self, tool_id: &str) -> bool {
        self.handlers.contains_key(tool_id)
    }
}

impl ToolExecutor for ToolRegistry {
    fn execute<'a>(
        &'a self,
        tool_id: &'a str,
        arguments: &'a ToolArguments,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send + 'a>> {
        let outcome = match self.handlers.get(tool_id) {
            Some(handler) => handler(arguments),
            None => Err(format!("unknown tool: {tool_id}")),
        };
        Box::pin(async move { outcome })
    }
}

/// A self-assessment appended as a `reflection` thought.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    /// Reflection content.
    pub content: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Optional self-assessment after the tool phase.
pub trait Reflector: Send + Sync {
    /// Reflect on the iteration so far; `None` appends nothing.
    fn reflect(&self, state: &RuntimeState) -> Option<Reflection>;
}

/// Reflector that never reflects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReflection;

impl Reflector for NoReflection {
    fn reflect(&self, _state: &RuntimeState) -> Option<Reflection> {
        None
    }
}

/// Decides at the exit phase whether the task is complete.
pub trait CompletionCheck: Send + Sync {
    /// Return the result if the task is done.
    fn check(&self, task: &str, state: &RuntimeState) -> Option<TaskResult>;
}

/// Completes after the first iteration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompleteImmediately;

impl CompletionCheck for CompleteImmediately {
    fn check(&self, task: &str, state: &RuntimeState) -> Option<TaskResult> {
        Some(TaskResult {
            task: task.to_owned(),
            steps: state.progress.step_number,
            thought_count: state.thought_chain.steps.len(),
        })
    }
}

/// Completes once `iterations_completed` reaches the given count.
#[derive(Debug, Clone, Copy)]
pub struct CompleteAfter(pub u64);

impl CompletionCheck for CompleteAfter {
    fn check(&self, task: &str, state: &RuntimeState) -> Option<TaskResult> {
        (state.progress.iterations_completed >= self.0)
            .then(|| CompleteImmediately.check(task, state))
            .flatten()
    }
}
