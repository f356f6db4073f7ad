//! Step-loop execution engine.
//!
//! One [`Engine::run`] drives a task through bounded iterations of five
//! phases: entry, thought, tool, reflection, and exit. Lifecycle events go
//! to the engine's [`EventBus`], checkpoints to the [`CheckpointManager`],
//! and pause points to the [`PauseManager`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::events::{AgentEvent, ErrorDetails, EventBus, EventKind, SubscriptionId};
use crate::models::checkpoint::{Checkpoint, CheckpointReason};
use crate::models::context::{Message, MessageRole, MessageToolResult, TASK_VARIABLE};
use crate::models::pause::{InterventionResponse, PauseAction, PausePoint, TriggerDetails};
use crate::models::state::RuntimeState;
use crate::models::thought::{ThoughtCategory, ThoughtStep};
use crate::models::tool::{ToolArguments, ToolCall, ToolCallStatus};
use crate::persistence::checkpoint_repo::CheckpointRepo;
use crate::persistence::db::{self, Database};
use crate::persistence::file_store::FileCheckpointStore;
use crate::{AppError, Result};

use super::checkpoint_manager::{CheckpointManager, CheckpointScope, SaveOptions};
use super::history::StepHistory;
use super::pause_manager::{PauseManager, PauseOptions};
use super::phases::{
    CompleteImmediately, CompletionCheck, NoReflection, ReasoningProvider, Reflector,
    StaticReasoner, TaskResult, ThoughtRequest, ToolExecutor, ToolRegistry,
};

/// Invoked after every checkpoint the engine saves.
pub type CheckpointCallback = Arc<dyn Fn(&Checkpoint) + Send + Sync>;

/// Invoked after a pause point is raised and before the engine waits on it.
pub type PauseCallback = Arc<dyn Fn(&PausePoint) + Send + Sync>;

/// Per-run options.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Execution id to run under; a fresh id is allocated when absent.
    pub execution_id: Option<String>,
    /// Checkpoint to resume from; a failed restore starts fresh.
    pub resume_from: Option<String>,
    /// Checkpoint-reached callback.
    pub on_checkpoint: Option<CheckpointCallback>,
    /// Pause-reached callback.
    pub on_pause: Option<PauseCallback>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// The exit phase produced a result.
    Completed(TaskResult),
    /// The iteration budget ran out first.
    Exhausted,
    /// An intervention halted the run.
    Halted {
        /// Pause point that halted the run.
        pause_point_id: String,
        /// Action that halted it.
        action: PauseAction,
    },
}

/// Terminal outcome of [`Engine::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Execution identifier allocated for the run.
    pub execution_id: String,
    /// How the run ended.
    pub status: RunStatus,
    /// Final runtime state.
    pub state: RuntimeState,
    /// Last checkpoint saved during the run.
    pub checkpoint: Option<Checkpoint>,
}

impl RunOutcome {
    /// The task result, if the run completed.
    #[must_use]
    pub fn result(&self) -> Option<&TaskResult> {
        match &self.status {
            RunStatus::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: AgentConfig,
    database: Option<Arc<Database>>,
    bus: Option<Arc<EventBus>>,
    reasoner: Arc<dyn ReasoningProvider>,
    tools: Arc<dyn ToolExecutor>,
    reflector: Arc<dyn Reflector>,
    completion: Arc<dyn CompletionCheck>,
}

impl EngineBuilder {
    /// Use `database` as the relational checkpoint backend.
    #[must_use]
    pub fn database(mut self, database: Arc<Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Share an existing event bus.
    #[must_use]
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the thought-phase reasoning provider.
    #[must_use]
    pub fn reasoner(mut self, reasoner: impl ReasoningProvider + 'static) -> Self {
        self.reasoner = Arc::new(reasoner);
        self
    }

    /// Set the tool-phase executor.
    #[must_use]
    pub fn tools(mut self, tools: impl ToolExecutor + 'static) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Set the reflection-phase reflector.
    #[must_use]
    pub fn reflector(mut self, reflector: impl Reflector + 'static) -> Self {
        self.reflector = Arc::new(reflector);
        self
    }

    /// Set the exit-phase completion check.
    #[must_use]
    pub fn completion(mut self, completion: impl CompletionCheck + 'static) -> Self {
        self.completion = Arc::new(completion);
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration is invalid.
    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let checkpoints = self
            .config
            .checkpoints
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| {
                CheckpointManager::new(
                    FileCheckpointStore::new(&c.export_dir),
                    self.database.map(CheckpointRepo::new),
                )
            });
        let bus = self.bus.unwrap_or_default();
        let pauses = Arc::new(PauseManager::new(
            Arc::clone(&bus),
            self.config.pause.timeout(),
        ));

        Ok(Engine {
            config: self.config,
            bus,
            pauses,
            checkpoints,
            reasoner: self.reasoner,
            tools: self.tools,
            reflector: self.reflector,
            completion: self.completion,
        })
    }
}

/// Drives executions for one configured agent.
pub struct Engine {
    config: AgentConfig,
    bus: Arc<EventBus>,
    pauses: Arc<PauseManager>,
    checkpoints: Option<CheckpointManager>,
    reasoner: Arc<dyn ReasoningProvider>,
    tools: Arc<dyn ToolExecutor>,
    reflector: Arc<dyn Reflector>,
    completion: Arc<dyn CompletionCheck>,
}

impl Engine {
    /// Start building an engine with the default collaborators.
    #[must_use]
    pub fn builder(config: AgentConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            database: None,
            bus: None,
            reasoner: Arc::new(StaticReasoner::default()),
            tools: Arc::new(ToolRegistry::new()),
            reflector: Arc::new(NoReflection),
            completion: Arc::new(CompleteImmediately),
        }
    }

    /// Build an engine with default collaborators, connecting the configured
    /// database if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid configuration or
    /// `AppError::Db` if the database cannot be opened.
    pub async fn open(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let database = match &config.database {
            Some(db_config) => Some(Arc::new(db::connect(Path::new(&db_config.path)).await?)),
            None => None,
        };
        let mut builder = Self::builder(config);
        if let Some(database) = database {
            builder = builder.database(database);
        }
        builder.build()
    }

    /// The agent configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The lifecycle event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The pause point registry, used to resolve interventions.
    #[must_use]
    pub fn pauses(&self) -> &Arc<PauseManager> {
        &self.pauses
    }

    /// The checkpoint manager, when checkpointing is enabled.
    #[must_use]
    pub fn checkpoints(&self) -> Option<&CheckpointManager> {
        self.checkpoints.as_ref()
    }

    /// Subscribe to one event category.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, listener)
    }

    /// Ask execution `execution_id` to raise a manual pause point at its
    /// next iteration.
    ///
    /// Other executions on this engine are unaffected. A request for an id
    /// that is not running yet waits for a run started under that id via
    /// [`RunOptions::execution_id`]. Ignored when `pause.manual` is disabled.
    pub fn request_pause(&self, execution_id: &str) {
        self.pauses.request_pause(execution_id);
    }

    /// Run `task` to completion, exhaustion, or a halting intervention.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Execution` wrapping any phase failure, after
    /// emitting `error.occurred`. An unresolved wait with no `on_timeout`
    /// fallback propagates as `AppError::Timeout`. An empty
    /// [`RunOptions::execution_id`] is refused with `AppError::Validation`
    /// before the run starts.
    pub async fn run(&self, task: &str, options: RunOptions) -> Result<RunOutcome> {
        let execution_id = match &options.execution_id {
            Some(id) if id.trim().is_empty() => {
                return Err(AppError::Validation("execution id must not be empty".into()));
            }
            Some(id) => id.clone(),
            None => Uuid::new_v4().to_string(),
        };
        let span = info_span!(
            "engine_run",
            execution_id = %execution_id,
            agent_id = %self.config.agent_id()
        );
        self.execute(execution_id, task, &options)
            .instrument(span)
            .await
    }

    /// Resume from checkpoint `checkpoint_id`, starting fresh if it cannot be
    /// restored.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::run`].
    pub async fn resume_from(&self, task: &str, checkpoint_id: &str) -> Result<RunOutcome> {
        let options = RunOptions {
            resume_from: Some(checkpoint_id.to_owned()),
            ..RunOptions::default()
        };
        self.run(task, options).await
    }

    /// Read a full checkpoint record for external handoff.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when checkpointing is disabled, otherwise
    /// the errors of [`CheckpointManager::export`].
    pub async fn export_checkpoint(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        self.checkpoint_manager()?.export(checkpoint_id).await
    }

    /// Restore the runtime state stored in a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when checkpointing is disabled, otherwise
    /// the errors of [`CheckpointManager::restore`].
    pub async fn restore_checkpoint(&self, checkpoint_id: &str) -> Result<RuntimeState> {
        self.checkpoint_manager()?.restore(checkpoint_id).await
    }

    fn checkpoint_manager(&self) -> Result<&CheckpointManager> {
        self.checkpoints
            .as_ref()
            .ok_or_else(|| AppError::Config("checkpointing is disabled for this agent".into()))
    }

    async fn execute(
        &self,
        execution_id: String,
        task: &str,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let (state, resumed) = self.initial_state(task, options.resume_from.as_deref()).await;
        let scope = CheckpointScope::new(
            execution_id.clone(),
            self.config.agent_id().to_owned(),
            Some(self.config.name.clone()),
        );
        let mut run = Run {
            engine: self,
            options,
            task: task.to_owned(),
            scope,
            base_duration_ms: state.progress.duration_ms,
            state,
            history: StepHistory::new(self.config.history_capacity),
            last_checkpoint: resumed,
            phase: Phase::Start,
            queued: Vec::new(),
            tool_ran: false,
            tool_failures: Vec::new(),
        };

        let driven = run.drive().await;
        self.pauses.clear_pause_request(&execution_id);
        match driven {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let phase = run.phase;
                warn!(phase = phase.as_str(), %err, "execution failed");
                // The event keeps the cause's message and code; the stack
                // records the wrapping.
                let surfaced = match &err {
                    AppError::Execution(_) | AppError::Timeout(_) => None,
                    cause => Some(AppError::Execution(format!("{}: {cause}", phase.as_str()))),
                };
                let stack = surfaced
                    .as_ref()
                    .map(|wrapped| format!("{wrapped}\ncaused by: {err}"));
                self.report_failure(&execution_id, &err, stack);
                Err(surfaced.unwrap_or(err))
            }
        }
    }

    async fn initial_state(
        &self,
        task: &str,
        resume_from: Option<&str>,
    ) -> (RuntimeState, Option<Checkpoint>) {
        let Some(checkpoint_id) = resume_from else {
            return (RuntimeState::create_empty(task, None), None);
        };
        let Some(manager) = &self.checkpoints else {
            warn!(checkpoint_id, "checkpointing disabled; ignoring resume request");
            return (RuntimeState::create_empty(task, None), None);
        };

        let restored = match manager.restore_checkpoint(checkpoint_id).await {
            Ok(checkpoint) => RuntimeState::load_from_snapshot(checkpoint.snapshot.clone())
                .map(|state| (state, checkpoint)),
            Err(err) => Err(err),
        };
        match restored {
            Ok((mut state, checkpoint)) => {
                state
                    .context
                    .variables
                    .insert(TASK_VARIABLE.to_owned(), Value::String(task.to_owned()));
                info!(
                    checkpoint_id,
                    step_number = state.progress.step_number,
                    "resumed from checkpoint"
                );
                (state, Some(checkpoint))
            }
            Err(err) => {
                warn!(checkpoint_id, %err, "resume failed; starting fresh");
                (RuntimeState::create_empty(task, None), None)
            }
        }
    }

    /// Emit `error.occurred` carrying `err`'s message and code.
    fn report_failure(&self, execution_id: &str, err: &AppError, stack: Option<String>) {
        let event = AgentEvent::ErrorOccurred {
            execution_id: execution_id.to_owned(),
            error: ErrorDetails {
                message: err.to_string(),
                stack,
                code: Some(err.code().to_owned()),
            },
            timestamp: Utc::now(),
        };
        if let Err(emit_err) = self.bus.emit(&event) {
            warn!(%emit_err, "failed to emit error event");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Entry,
    Thought,
    Tool,
    Reflection,
    Exit,
    Checkpoint,
    Pause,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Entry => "entry",
            Self::Thought => "thought",
            Self::Tool => "tool",
            Self::Reflection => "reflection",
            Self::Exit => "exit",
            Self::Checkpoint => "checkpoint",
            Self::Pause => "pause",
        }
    }
}

enum Step {
    Continue,
    Done(TaskResult),
    Halted {
        pause_point_id: String,
        action: PauseAction,
    },
}

enum Resolution {
    Proceed,
    Retry,
    Halt {
        pause_point_id: String,
        action: PauseAction,
    },
}

/// Mutable state of one execution.
struct Run<'a> {
    engine: &'a Engine,
    options: &'a RunOptions,
    task: String,
    scope: CheckpointScope,
    base_duration_ms: u64,
    state: RuntimeState,
    history: StepHistory,
    last_checkpoint: Option<Checkpoint>,
    phase: Phase,
    // Iteration scratch, reset by the entry phase.
    queued: Vec<ToolCall>,
    tool_ran: bool,
    tool_failures: Vec<ToolCall>,
}

impl Run<'_> {
    async fn drive(&mut self) -> Result<RunOutcome> {
        self.emit(AgentEvent::Started {
            execution_id: self.scope.execution_id.clone(),
            agent_id: self.scope.agent_id.clone(),
            timestamp: Utc::now(),
        })?;
        info!(task = %self.task, "execution started");
        self.history.record(&self.state);

        for _ in 0..self.engine.config.max_iterations {
            match self.iteration().await? {
                Step::Continue => {}
                Step::Done(result) => return self.complete(result).await,
                Step::Halted {
                    pause_point_id,
                    action,
                } => {
                    info!(%pause_point_id, ?action, "execution halted by intervention");
                    return Ok(self.outcome(RunStatus::Halted {
                        pause_point_id,
                        action,
                    }));
                }
            }
        }

        self.refresh_duration();
        info!(
            iterations = self.state.progress.iterations_completed,
            "iteration budget exhausted"
        );
        Ok(self.outcome(RunStatus::Exhausted))
    }

    async fn iteration(&mut self) -> Result<Step> {
        // Entry.
        self.phase = Phase::Entry;
        self.state.validate()?;
        self.queued.clear();
        self.tool_ran = false;
        self.tool_failures.clear();

        let engine = self.engine;
        let pause = &engine.config.pause;
        if pause.manual && engine.pauses.take_pause_request(&self.scope.execution_id) {
            let resolution = self
                .pause(
                    CheckpointReason::Manual,
                    TriggerDetails::Manual { requested_by: None },
                )
                .await?;
            if let Some(step) = self.after_pause(resolution) {
                return Ok(step);
            }
        }

        // Thought.
        self.phase = Phase::Thought;
        let step = self.thought().await?;
        let threshold = pause.on_low_confidence;
        let trigger = match threshold {
            Some(threshold) if step.confidence < threshold => Some((
                CheckpointReason::LowConfidence,
                TriggerDetails::ConfidenceLow {
                    step_id: step.id.clone(),
                    confidence: step.confidence,
                    threshold,
                },
            )),
            _ if pause.on_decision && step.category == ThoughtCategory::Decision => Some((
                CheckpointReason::Decision,
                TriggerDetails::HumanReview {
                    step_id: Some(step.id.clone()),
                    reason: "decision requires review".to_owned(),
                },
            )),
            _ => None,
        };
        if let Some((reason, details)) = trigger {
            let resolution = self.pause(reason, details).await?;
            if let Some(step) = self.after_pause(resolution) {
                return Ok(step);
            }
        }

        // Tool.
        self.phase = Phase::Tool;
        self.dispatch_tools().await?;
        self.state.progress.step_number += 1;
        if pause.on_tool_error {
            if let Some(failed) = self.tool_failures.first() {
                let details = TriggerDetails::ToolError {
                    tool_call_id: failed.id.clone(),
                    error: failed.error.clone().unwrap_or_default(),
                };
                let resolution = self.pause(CheckpointReason::ToolError, details).await?;
                if let Some(step) = self.after_pause(resolution) {
                    return Ok(step);
                }
            }
        }

        // Reflection.
        self.phase = Phase::Reflection;
        if let Some(reflection) = engine.reflector.reflect(&self.state) {
            let step = ThoughtStep::new(
                ThoughtCategory::Reflection,
                reflection.content,
                reflection.confidence,
            );
            let parent = self.state.thought_chain.current_step_id.clone();
            let step = self
                .state
                .thought_chain
                .append(step, parent.as_deref())?
                .clone();
            self.emit(AgentEvent::ThoughtCreated {
                execution_id: self.scope.execution_id.clone(),
                thought: step,
                timestamp: Utc::now(),
            })?;
        }
        self.state.progress.step_number += 1;

        // Exit.
        self.phase = Phase::Exit;
        self.refresh_duration();
        let result = engine.completion.check(&self.task, &self.state);
        self.history.record(&self.state);
        if let Some(result) = result {
            return Ok(Step::Done(result));
        }

        if let Some(config) = &engine.config.checkpoints {
            if config.on_step_complete {
                self.checkpoint(CheckpointReason::StepComplete).await?;
            } else if config.on_tool_call && self.tool_ran {
                self.checkpoint(CheckpointReason::Auto).await?;
            }
        }
        Ok(Step::Continue)
    }

    async fn thought(&mut self) -> Result<ThoughtStep> {
        let output = self
            .engine
            .reasoner
            .think(ThoughtRequest {
                task: &self.task,
                instructions: &self.engine.config.instructions,
                state: &self.state,
            })
            .await?;

        let mut step = ThoughtStep::new(output.category, output.content, output.confidence);
        step.reasoning = output.reasoning;
        step.alternatives = output.alternatives;
        let parent = self.state.thought_chain.current_step_id.clone();
        let step = self
            .state
            .thought_chain
            .append(step, parent.as_deref())?
            .clone();

        let progress = &mut self.state.progress;
        progress.iterations_completed += 1;
        progress.step_number += 1;
        progress.tokens_used = progress.tokens_used.saturating_add(output.tokens_used);

        for request in output.tool_calls {
            let call = ToolCall::new(request.tool_id, request.arguments);
            self.state.tool_state.enqueue(&call.id)?;
            self.queued.push(call);
        }

        self.emit(AgentEvent::ThoughtCreated {
            execution_id: self.scope.execution_id.clone(),
            thought: step.clone(),
            timestamp: Utc::now(),
        })?;
        Ok(step)
    }

    async fn dispatch_tools(&mut self) -> Result<()> {
        let pending = self.state.tool_state.pending.clone();
        for id in pending {
            let Some(index) = self.queued.iter().position(|call| call.id == id) else {
                warn!(tool_call_id = %id, "pending tool call has no dispatchable record; cancelling");
                let mut call = ToolCall::new("unknown", ToolArguments::new());
                call.id = id;
                call.status = ToolCallStatus::Cancelled;
                call.error = Some("no dispatchable record for pending call".to_owned());
                self.state.tool_state.finish(call)?;
                continue;
            };

            let mut call = self.queued.remove(index);
            self.state.tool_state.start(&call.id)?;
            call.status = ToolCallStatus::Running;
            self.emit(AgentEvent::ToolCalled {
                execution_id: self.scope.execution_id.clone(),
                tool_call: call.clone(),
                timestamp: Utc::now(),
            })?;

            let started = Instant::now();
            let outcome = self
                .engine
                .tools
                .execute(&call.tool_id, &call.arguments)
                .await;
            call.duration_ms = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));
            match outcome {
                Ok(result) => {
                    call.status = ToolCallStatus::Completed;
                    call.result = Some(result);
                }
                Err(error) => {
                    warn!(tool_call_id = %call.id, tool_id = %call.tool_id, %error, "tool call failed");
                    call.status = ToolCallStatus::Failed;
                    call.error = Some(error);
                }
            }

            self.state.tool_state.finish(call.clone())?;
            let mut message = Message::text(
                MessageRole::Tool,
                format!("{} {}", call.tool_id, status_word(call.status)),
            );
            message.tool_results = Some(vec![MessageToolResult {
                tool_call_id: call.id.clone(),
                output: call.result.clone(),
                error: call.error.clone(),
            }]);
            self.state.context.messages.push(message);
            self.tool_ran = true;
            if call.status == ToolCallStatus::Failed {
                self.tool_failures.push(call.clone());
            }

            self.emit(AgentEvent::ToolCompleted {
                execution_id: self.scope.execution_id.clone(),
                tool_call: call,
                timestamp: Utc::now(),
            })?;
        }
        Ok(())
    }

    /// Raise a pause point, wait for it, and apply the chosen action.
    async fn pause(&mut self, reason: CheckpointReason, details: TriggerDetails) -> Result<Resolution> {
        let resume_phase = self.phase;
        self.phase = Phase::Pause;
        let checkpoint_id = self.checkpoint(reason).await?.map(|c| c.id);

        let engine = self.engine;
        let config = &engine.config.pause;
        let pauses = &engine.pauses;
        let point = pauses.create_pause_point(
            &self.scope.execution_id,
            checkpoint_id.as_deref(),
            details,
            PauseOptions {
                timeout_ms: Some(config.timeout_seconds.saturating_mul(1000)),
                on_timeout: config.on_timeout,
                ..PauseOptions::default()
            },
        )?;
        if let Some(callback) = &self.options.on_pause {
            callback(&point);
        }

        let waited = pauses.wait_for_intervention(&point.id, None).await;
        pauses.remove(&point.id);
        let (action, response) = match waited {
            Ok(intervention) => (intervention.action(), intervention.response),
            Err(AppError::Timeout(msg)) => match point.on_timeout {
                Some(action) => {
                    warn!(pause_point_id = %point.id, ?action, "intervention timed out; applying fallback");
                    (action, None)
                }
                None => return Err(AppError::Timeout(msg)),
            },
            Err(AppError::Rejected(msg)) => {
                info!(pause_point_id = %point.id, reason = %msg, "intervention rejected");
                (PauseAction::Reject, None)
            }
            Err(err) => return Err(err),
        };

        let resolution = self.apply(&point.id, action, response)?;
        self.phase = resume_phase;
        Ok(resolution)
    }

    fn apply(
        &mut self,
        pause_point_id: &str,
        action: PauseAction,
        response: Option<InterventionResponse>,
    ) -> Result<Resolution> {
        if !action.proceeds() {
            return Ok(Resolution::Halt {
                pause_point_id: pause_point_id.to_owned(),
                action,
            });
        }

        let resolution = if action == PauseAction::Retry {
            self.rewind();
            Resolution::Retry
        } else {
            if let Some(response) = response {
                self.amend(action, response);
            }
            Resolution::Proceed
        };

        self.emit(AgentEvent::Resumed {
            execution_id: self.scope.execution_id.clone(),
            timestamp: Utc::now(),
        })?;
        info!(pause_point_id, ?action, "execution resumed");
        Ok(resolution)
    }

    /// Apply an operator's amendments to the live state.
    fn amend(&mut self, action: PauseAction, response: InterventionResponse) {
        if action == PauseAction::Modify {
            if let Some(variables) = response.modified_state {
                self.state.context.variables.extend(variables);
            }
            if let Some(decision) = response.modified_decision {
                let step = self
                    .state
                    .thought_chain
                    .steps
                    .iter_mut()
                    .find(|step| step.id == decision.decision_id);
                match step {
                    Some(step) => {
                        step.metadata.get_or_insert_with(serde_json::Map::new).insert(
                            "override".to_owned(),
                            json!({ "new_value": decision.new_value, "reason": decision.reason }),
                        );
                    }
                    None => warn!(decision_id = %decision.decision_id, "modified decision targets unknown step"),
                }
            }
        }
        if let Some(prompt) = response.suggested_prompt {
            self.state
                .context
                .messages
                .push(Message::text(MessageRole::User, prompt));
        }
    }

    /// Restore the last indexed state, keeping the progress counters.
    fn rewind(&mut self) {
        let Some(previous) = self.history.latest() else {
            return;
        };
        let progress = self.state.progress.clone();
        self.state = previous.clone();
        self.state.progress = progress;
        self.refresh_duration();
        self.queued.clear();
    }

    fn after_pause(&self, resolution: Resolution) -> Option<Step> {
        match resolution {
            Resolution::Proceed => None,
            Resolution::Retry => Some(Step::Continue),
            Resolution::Halt {
                pause_point_id,
                action,
            } => Some(Step::Halted {
                pause_point_id,
                action,
            }),
        }
    }

    async fn complete(&mut self, result: TaskResult) -> Result<RunOutcome> {
        self.phase = Phase::Checkpoint;
        self.checkpoint(CheckpointReason::StepComplete).await?;
        self.emit(AgentEvent::Completed {
            execution_id: self.scope.execution_id.clone(),
            result: result.clone(),
            timestamp: Utc::now(),
        })?;
        info!(
            steps = result.steps,
            thoughts = result.thought_count,
            "execution completed"
        );
        Ok(self.outcome(RunStatus::Completed(result)))
    }

    /// Save a checkpoint linked to the previous one, when enabled.
    async fn checkpoint(&mut self, reason: CheckpointReason) -> Result<Option<Checkpoint>> {
        let engine = self.engine;
        let Some(manager) = &engine.checkpoints else {
            return Ok(None);
        };
        self.refresh_duration();
        let outcome = manager
            .save_with(
                &self.scope,
                &self.state,
                reason,
                SaveOptions::following(self.last_checkpoint.as_ref()),
            )
            .await?;
        let checkpoint = outcome.checkpoint;

        self.emit(AgentEvent::Checkpoint {
            execution_id: self.scope.execution_id.clone(),
            checkpoint: Box::new(checkpoint.clone()),
            timestamp: Utc::now(),
        })?;
        if let Some(callback) = &self.options.on_checkpoint {
            callback(&checkpoint);
        }
        self.last_checkpoint = Some(checkpoint.clone());
        Ok(Some(checkpoint))
    }

    fn refresh_duration(&mut self) {
        self.state.progress.duration_ms = self
            .base_duration_ms
            .saturating_add(self.scope.elapsed_ms());
    }

    fn emit(&self, event: AgentEvent) -> Result<()> {
        self.engine.bus.emit(&event)
    }

    fn outcome(&self, status: RunStatus) -> RunOutcome {
        RunOutcome {
            execution_id: self.scope.execution_id.clone(),
            status,
            state: self.state.clone(),
            checkpoint: self.last_checkpoint.clone(),
        }
    }
}

fn status_word(status: ToolCallStatus) -> &'static str {
    match status {
        ToolCallStatus::Pending => "pending",
        ToolCallStatus::Running => "running",
        ToolCallStatus::Completed => "completed",
        ToolCallStatus::Failed => "failed",
        ToolCallStatus::Cancelled => "cancelled",
    }
}
