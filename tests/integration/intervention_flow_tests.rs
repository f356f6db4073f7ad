//! Integration tests for pause points raised during engine runs.
//!
//! Validates:
//! - Low-confidence, tool-error, and manual pauses checkpoint first, then wait
//! - Continue and modify resume the run; cancel and reject halt it
//! - Retry rewinds the iteration while its progress counters keep increasing
//! - Deadlines fall back to `on_timeout` or fail the run with a timeout
//! - A halted run can be resumed from its pause checkpoint

use std::sync::Arc;

use caf_runtime::events::{AgentEvent, EventKind};
use caf_runtime::models::checkpoint::CheckpointReason;
use caf_runtime::models::pause::{
    InterventionResponse, ModifiedDecision, PauseAction, PausePoint, PauseTrigger, TriggerDetails,
};
use caf_runtime::models::thought::ThoughtCategory;
use caf_runtime::orchestrator::pause_manager::InterventionReply;
use caf_runtime::orchestrator::phases::{StaticReasoner, ThoughtOutput};
use caf_runtime::{AgentConfig, AppError, Engine, RunOptions, RunStatus};
use serde_json::json;

use super::test_helpers::{
    agent_config, checkpoint_config, echo_tools, json_files, kinds, paused_points, record_events,
    reject_with, respond_with, text_args, ScriptedReasoner,
};

fn low_confidence_engine(mut config: AgentConfig) -> Engine {
    config.pause.on_low_confidence = Some(0.5);
    Engine::builder(config)
        .reasoner(StaticReasoner::with_confidence(0.2))
        .build()
        .expect("engine")
}

// ── Low confidence ──────────────────────────────────────────

#[tokio::test]
async fn low_confidence_pause_resumes_on_continue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = low_confidence_engine(checkpoint_config(dir.path()));
    let events = record_events(&engine);
    let options = RunOptions {
        on_pause: Some(respond_with(&engine, InterventionReply::action(PauseAction::Continue))),
        ..RunOptions::default()
    };

    let outcome = engine.run("ping", options).await.expect("run");

    assert!(outcome.result().is_some());
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Started,
            EventKind::ThoughtCreated,
            EventKind::Checkpoint,
            EventKind::Paused,
            EventKind::Resumed,
            EventKind::Checkpoint,
            EventKind::Completed,
        ]
    );

    let points = paused_points(&events);
    assert_eq!(points.len(), 1);
    let point = &points[0];
    assert_eq!(point.trigger, PauseTrigger::ConfidenceLow);
    match &point.trigger_details {
        TriggerDetails::ConfidenceLow {
            step_id,
            confidence,
            threshold,
        } => {
            assert_eq!(step_id, &outcome.state.thought_chain.steps[0].id);
            assert!((confidence - 0.2).abs() < f64::EPSILON);
            assert!((threshold - 0.5).abs() < f64::EPSILON);
        }
        other => panic!("unexpected details: {other:?}"),
    }
    assert_eq!(point.timeout_ms, Some(3_600_000));

    let pause_checkpoint = engine
        .export_checkpoint(&point.checkpoint_id)
        .await
        .expect("pause checkpoint");
    assert_eq!(
        pause_checkpoint.metadata.checkpoint_reason,
        CheckpointReason::LowConfidence
    );
    assert_eq!(pause_checkpoint.metadata.step_number, 1);

    let last = outcome.checkpoint.expect("final checkpoint");
    assert_eq!(
        last.parent.expect("parent").checkpoint_id,
        pause_checkpoint.id
    );
    assert_eq!(json_files(dir.path()).len(), 2);
    assert!(engine.pauses().pause_point(&point.id).is_none());
}

#[tokio::test]
async fn confidence_at_threshold_does_not_pause() {
    let mut config = agent_config();
    config.pause.on_low_confidence = Some(0.9);
    let engine = Engine::builder(config).build().expect("engine");
    let events = record_events(&engine);

    engine.run("ping", RunOptions::default()).await.expect("run");

    assert!(!kinds(&events).contains(&EventKind::Paused));
}

#[tokio::test]
async fn pause_without_checkpointing_records_sentinel() {
    let engine = low_confidence_engine(agent_config());
    let events = record_events(&engine);
    let options = RunOptions {
        on_pause: Some(respond_with(&engine, InterventionReply::default())),
        ..RunOptions::default()
    };

    engine.run("ping", options).await.expect("run");

    let points = paused_points(&events);
    assert_eq!(points[0].checkpoint_id, "none");
}

#[tokio::test]
async fn cancel_halts_at_pause_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = low_confidence_engine(checkpoint_config(dir.path()));
    let events = record_events(&engine);
    let options = RunOptions {
        on_pause: Some(respond_with(&engine, InterventionReply::action(PauseAction::Cancel))),
        ..RunOptions::default()
    };

    let outcome = engine.run("ping", options).await.expect("run");

    match &outcome.status {
        RunStatus::Halted { action, .. } => assert_eq!(*action, PauseAction::Cancel),
        other => panic!("unexpected status: {other:?}"),
    }
    let recorded = kinds(&events);
    assert!(!recorded.contains(&EventKind::Completed));
    assert!(!recorded.contains(&EventKind::Resumed));
    let checkpoint = outcome.checkpoint.expect("pause checkpoint");
    assert_eq!(
        checkpoint.metadata.checkpoint_reason,
        CheckpointReason::LowConfidence
    );
    assert_eq!(outcome.state.progress.step_number, 1);
}

#[tokio::test]
async fn halted_run_resumes_from_pause_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let halting = low_confidence_engine(checkpoint_config(dir.path()));
    let options = RunOptions {
        on_pause: Some(respond_with(&halting, InterventionReply::action(PauseAction::Cancel))),
        ..RunOptions::default()
    };
    let halted = halting.run("ping", options).await.expect("halted run");
    let pause_checkpoint = halted.checkpoint.expect("pause checkpoint");

    let engine = Engine::builder(checkpoint_config(dir.path()))
        .build()
        .expect("engine");
    let outcome = engine
        .resume_from("ping", &pause_checkpoint.id)
        .await
        .expect("resume");

    assert!(outcome.result().is_some());
    assert_eq!(outcome.state.progress.step_number, 4);
    assert_eq!(outcome.state.progress.iterations_completed, 2);
    assert_eq!(outcome.state.thought_chain.steps.len(), 2);
}

// ── Amendments ──────────────────────────────────────────────

#[tokio::test]
async fn modify_merges_variables_and_overrides_decision() {
    let mut config = agent_config();
    config.pause.on_decision = true;
    let engine = Engine::builder(config)
        .reasoner(ScriptedReasoner::new([ThoughtOutput::new(
            ThoughtCategory::Decision,
            "pick a tone",
            0.9,
        )]))
        .build()
        .expect("engine");
    let events = record_events(&engine);

    // The decision step id is only known once the pause is raised.
    let pauses = Arc::clone(engine.pauses());
    let options = RunOptions {
        on_pause: Some(Arc::new(move |point: &PausePoint| {
            let TriggerDetails::HumanReview {
                step_id: Some(step_id),
                ..
            } = &point.trigger_details
            else {
                panic!("unexpected trigger: {:?}", point.trigger_details);
            };
            let mut response = InterventionResponse::action(PauseAction::Modify);
            let mut changes = serde_json::Map::new();
            changes.insert("tone".into(), json!("formal"));
            response.modified_state = Some(changes);
            response.modified_decision = Some(ModifiedDecision {
                decision_id: step_id.clone(),
                new_value: json!("formal"),
                reason: "house style".into(),
            });
            response.suggested_prompt = Some("Keep it short.".into());
            pauses.resolve_intervention(
                &point.id,
                InterventionReply {
                    responder: Some("operator".into()),
                    response: Some(response),
                },
            );
        })),
        ..RunOptions::default()
    };

    let outcome = engine.run("ping", options).await.expect("run");

    assert!(outcome.result().is_some());
    let state = &outcome.state;
    assert_eq!(state.context.variables["tone"], json!("formal"));
    assert_eq!(state.context.task(), Some("ping"));
    let decision = &state.thought_chain.steps[0];
    let metadata = decision.metadata.as_ref().expect("metadata");
    assert_eq!(
        metadata["override"],
        json!({ "new_value": "formal", "reason": "house style" })
    );
    let last = state.context.messages.last().expect("message");
    assert_eq!(last.content, "Keep it short.");
    assert_eq!(paused_points(&events)[0].trigger, PauseTrigger::HumanReview);
}

#[tokio::test]
async fn retry_rewinds_iteration_but_keeps_counters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = checkpoint_config(dir.path());
    config.pause.on_low_confidence = Some(0.5);
    let mut unsure = ThoughtOutput::new(ThoughtCategory::Reasoning, "unsure", 0.2);
    unsure.tokens_used = 5;
    let engine = Engine::builder(config)
        .reasoner(ScriptedReasoner::new([unsure]))
        .build()
        .expect("engine");
    let events = record_events(&engine);
    let options = RunOptions {
        on_pause: Some(respond_with(&engine, InterventionReply::action(PauseAction::Retry))),
        ..RunOptions::default()
    };

    let outcome = engine.run("ping", options).await.expect("run");

    let result = outcome.result().expect("completed");
    assert_eq!(result.thought_count, 1);
    assert_eq!(result.steps, 4);
    let state = &outcome.state;
    assert_eq!(state.thought_chain.steps[0].content, "carry on");
    assert!(state.thought_chain.steps[0].parent_id.is_none());
    assert_eq!(state.progress.iterations_completed, 2);
    assert_eq!(state.progress.tokens_used, 5);

    let checkpoints: Vec<_> = events
        .lock()
        .expect("lock")
        .iter()
        .filter_map(|event| match event {
            AgentEvent::Checkpoint { checkpoint, .. } => Some(checkpoint.metadata.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].checkpoint_reason, CheckpointReason::LowConfidence);
    assert_eq!(checkpoints[1].checkpoint_reason, CheckpointReason::StepComplete);
    assert!(checkpoints[1].step_number > checkpoints[0].step_number);
    assert!(checkpoints[1].tokens_used >= checkpoints[0].tokens_used);
}

// ── Rejection and tool errors ───────────────────────────────

#[tokio::test]
async fn tool_error_pause_halts_on_rejection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = checkpoint_config(dir.path());
    config.pause.on_tool_error = true;
    let output = ThoughtOutput::new(ThoughtCategory::ToolSelection, "call it", 0.9)
        .with_tool_call("echo", text_args("hi"))
        .with_tool_call("missing", text_args("?"));
    let engine = Engine::builder(config)
        .reasoner(ScriptedReasoner::new([output]))
        .tools(echo_tools())
        .build()
        .expect("engine");
    let events = record_events(&engine);
    let options = RunOptions {
        on_pause: Some(reject_with(&engine, "tool misuse")),
        ..RunOptions::default()
    };

    let outcome = engine.run("ping", options).await.expect("run");

    match &outcome.status {
        RunStatus::Halted { action, .. } => assert_eq!(*action, PauseAction::Reject),
        other => panic!("unexpected status: {other:?}"),
    }
    let points = paused_points(&events);
    assert_eq!(points.len(), 1);
    match &points[0].trigger_details {
        TriggerDetails::ToolError {
            tool_call_id,
            error,
        } => {
            assert_eq!(tool_call_id, &outcome.state.tool_state.failed[0].id);
            assert_eq!(error, "unknown tool: missing");
        }
        other => panic!("unexpected details: {other:?}"),
    }
    let checkpoint = outcome.checkpoint.expect("checkpoint");
    assert_eq!(checkpoint.metadata.checkpoint_reason, CheckpointReason::ToolError);
    assert_eq!(checkpoint.snapshot.tool_state.completed.len(), 1);
    assert_eq!(checkpoint.snapshot.progress.step_number, 2);
}

// ── Manual pauses ───────────────────────────────────────────

#[tokio::test]
async fn requested_pause_is_raised_at_next_iteration() {
    let engine = Engine::builder(agent_config()).build().expect("engine");
    let events = record_events(&engine);
    engine.request_pause("exec-manual");
    let options = RunOptions {
        execution_id: Some("exec-manual".into()),
        on_pause: Some(respond_with(&engine, InterventionReply::action(PauseAction::Approve))),
        ..RunOptions::default()
    };

    let outcome = engine.run("ping", options).await.expect("run");

    assert!(outcome.result().is_some());
    assert_eq!(outcome.execution_id, "exec-manual");
    assert_eq!(
        kinds(&events)[..4],
        [
            EventKind::Started,
            EventKind::Paused,
            EventKind::Resumed,
            EventKind::ThoughtCreated,
        ]
    );
    assert_eq!(paused_points(&events)[0].trigger, PauseTrigger::Manual);
}

#[tokio::test]
async fn requested_pause_only_reaches_its_execution() {
    let engine = Engine::builder(agent_config()).build().expect("engine");
    let events = record_events(&engine);
    engine.request_pause("exec-b");
    let run_as = |id: &str| RunOptions {
        execution_id: Some(id.to_owned()),
        on_pause: Some(respond_with(&engine, InterventionReply::action(PauseAction::Continue))),
        ..RunOptions::default()
    };

    let (a, b) = tokio::join!(
        engine.run("first", run_as("exec-a")),
        engine.run("second", run_as("exec-b")),
    );

    assert!(a.expect("run a").result().is_some());
    assert!(b.expect("run b").result().is_some());
    let points = paused_points(&events);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].execution_id, "exec-b");
    assert_eq!(points[0].trigger, PauseTrigger::Manual);
}

#[tokio::test]
async fn pause_request_does_not_outlive_its_run() {
    let mut config = agent_config();
    config.pause.manual = false;
    let engine = Engine::builder(config).build().expect("engine");
    let events = record_events(&engine);
    engine.request_pause("exec-1");
    let options = RunOptions {
        execution_id: Some("exec-1".into()),
        ..RunOptions::default()
    };

    engine.run("ping", options).await.expect("run");

    assert!(paused_points(&events).is_empty());
    assert!(!engine.pauses().take_pause_request("exec-1"));
}

// ── Deadlines ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn timeout_applies_configured_fallback() {
    let mut config = agent_config();
    config.pause.timeout_seconds = 1;
    config.pause.on_timeout = Some(PauseAction::Continue);
    let engine = low_confidence_engine(config);
    let events = record_events(&engine);

    let outcome = engine.run("ping", RunOptions::default()).await.expect("run");

    assert!(outcome.result().is_some());
    assert!(kinds(&events).contains(&EventKind::Resumed));
    let points = paused_points(&events);
    assert_eq!(points[0].timeout_ms, Some(1_000));
    assert_eq!(points[0].on_timeout, Some(PauseAction::Continue));
}

#[tokio::test(start_paused = true)]
async fn timeout_fallback_may_halt() {
    let mut config = agent_config();
    config.pause.timeout_seconds = 1;
    config.pause.on_timeout = Some(PauseAction::Cancel);
    let engine = low_confidence_engine(config);

    let outcome = engine.run("ping", RunOptions::default()).await.expect("run");

    assert!(matches!(
        outcome.status,
        RunStatus::Halted {
            action: PauseAction::Cancel,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn timeout_without_fallback_fails_the_run() {
    let mut config = agent_config();
    config.pause.timeout_seconds = 1;
    let engine = low_confidence_engine(config);
    let events = record_events(&engine);

    let err = engine
        .run("ping", RunOptions::default())
        .await
        .expect_err("timeout");

    assert!(matches!(err, AppError::Timeout(_)));
    let codes: Vec<Option<String>> = events
        .lock()
        .expect("lock")
        .iter()
        .filter_map(|event| match event {
            AgentEvent::ErrorOccurred { error, .. } => Some(error.code.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(codes, vec![Some("TIMEOUT".to_owned())]);
}
