//! Unit tests for the pause point registry and intervention waits.
//!
//! Validates:
//! - Creating a pause point emits `agent.paused` with the default actions
//! - A resolution delivered before or during a wait reaches the waiter
//! - Each pause point accepts at most one wait and one resolution
//! - Deadlines fail the wait with `AppError::Timeout` and close resolution
//! - Closed pause points are retained up to a bound while open ones stay
//! - Manual pause requests target one execution

use std::sync::{Arc, Mutex};
use std::time::Duration;

use caf_runtime::events::{AgentEvent, EventBus, EventKind};
use caf_runtime::models::pause::{
    AvailableAction, InterventionResponse, PauseAction, PauseTrigger, TriggerDetails, NO_CHECKPOINT,
};
use caf_runtime::orchestrator::pause_manager::{
    InterventionReply, PauseManager, PauseOptions, PauseState, DEFAULT_TIMEOUT,
};
use caf_runtime::AppError;
use serde_json::json;

fn manual() -> TriggerDetails {
    TriggerDetails::Manual { requested_by: None }
}

fn manager() -> PauseManager {
    PauseManager::new(Arc::new(EventBus::new()), DEFAULT_TIMEOUT)
}

fn with_timeout(timeout_ms: u64) -> PauseOptions {
    PauseOptions {
        timeout_ms: Some(timeout_ms),
        ..PauseOptions::default()
    }
}

// ── Creation ────────────────────────────────────────────────

#[test]
fn create_emits_paused_event_with_defaults() {
    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.on(EventKind::Paused, move |event: &AgentEvent| {
        sink.lock().expect("lock").push(event.clone());
    });
    let manager = PauseManager::new(Arc::clone(&bus), DEFAULT_TIMEOUT);

    let point = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create");

    assert_eq!(point.checkpoint_id, NO_CHECKPOINT);
    assert_eq!(point.trigger, PauseTrigger::Manual);
    assert_eq!(point.timeout_ms, Some(3_600_000));
    assert!(point.resolved_at.is_none());
    let action_ids: Vec<&str> = point.available_actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(action_ids, vec!["continue", "cancel"]);
    assert_eq!(manager.state(&point.id), Some(PauseState::Created));

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        AgentEvent::Paused { pause_point, .. } => assert_eq!(pause_point.id, point.id),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn create_applies_options() {
    let manager = manager();
    let options = PauseOptions {
        timeout_ms: Some(250),
        on_timeout: Some(PauseAction::Continue),
        pending_questions: vec!["proceed?".into()],
        extra_actions: vec![AvailableAction::new(
            "retry",
            "Retry",
            "Redo the iteration",
            PauseAction::Retry,
        )],
    };

    let point = manager
        .create_pause_point("exec-1", Some("cp-1"), manual(), options)
        .expect("create");

    assert_eq!(point.checkpoint_id, "cp-1");
    assert_eq!(point.timeout_ms, Some(250));
    assert_eq!(point.on_timeout, Some(PauseAction::Continue));
    assert_eq!(point.pending_questions, vec!["proceed?".to_owned()]);
    assert_eq!(point.available_actions.len(), 3);
}

#[test]
fn invalid_pause_point_is_not_registered() {
    let manager = manager();
    let err = manager
        .create_pause_point("", None, manual(), PauseOptions::default())
        .expect_err("empty execution id");
    assert!(matches!(err, AppError::Validation(_)));
}

// ── Resolution ──────────────────────────────────────────────

#[tokio::test]
async fn resolution_before_wait_is_buffered() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create");

    assert!(manager.resolve(&point.id));
    let intervention = manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect("intervention");

    assert_eq!(intervention.pause_point_id, point.id);
    assert_eq!(intervention.execution_id, "exec-1");
    assert_eq!(intervention.action(), PauseAction::Continue);
    assert!(intervention.response.is_none());
    assert_eq!(manager.state(&point.id), Some(PauseState::Resolved));
    assert!(manager.pause_point(&point.id).expect("point").resolved_at.is_some());
}

#[tokio::test]
async fn resolution_during_wait_reaches_waiter() {
    let manager = Arc::new(manager());
    let point = manager
        .create_pause_point("exec-1", None, manual(), with_timeout(5_000))
        .expect("create");

    let resolver = Arc::clone(&manager);
    let id = point.id.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut response = InterventionResponse::action(PauseAction::Modify);
        let mut changes = serde_json::Map::new();
        changes.insert("tone".into(), json!("formal"));
        response.modified_state = Some(changes);
        resolver.resolve_intervention(
            &id,
            InterventionReply {
                responder: Some("operator".into()),
                response: Some(response),
            },
        )
    });

    let intervention = manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect("intervention");
    assert!(handle.await.expect("join"));

    assert_eq!(intervention.action(), PauseAction::Modify);
    assert_eq!(intervention.responder.as_deref(), Some("operator"));
    let response = intervention.response.expect("response");
    assert_eq!(response.modified_state.expect("state")["tone"], json!("formal"));
}

#[tokio::test]
async fn second_resolution_is_ignored() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create");

    assert!(manager.resolve_intervention(&point.id, InterventionReply::action(PauseAction::Cancel)));
    assert!(!manager.resolve(&point.id));
    assert!(!manager.reject_intervention(&point.id, "too late"));

    let intervention = manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect("intervention");
    assert_eq!(intervention.action(), PauseAction::Cancel);
}

#[tokio::test]
async fn second_wait_is_already_consumed() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create");
    manager.resolve(&point.id);

    manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect("first wait");
    let err = manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect_err("second wait");
    assert!(matches!(err, AppError::AlreadyConsumed(_)));
}

#[tokio::test]
async fn rejection_fails_the_wait() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create");

    assert!(manager.reject_intervention(&point.id, "not allowed"));
    let err = manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect_err("rejected");
    assert!(matches!(err, AppError::Rejected(msg) if msg.contains("not allowed")));
}

#[tokio::test]
async fn unknown_pause_point_is_not_found() {
    let manager = manager();
    let err = manager
        .wait_for_intervention("ghost", None)
        .await
        .expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(!manager.resolve("ghost"));
    assert!(manager.state("ghost").is_none());
}

#[test]
fn removed_pause_point_can_no_longer_be_resolved() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create");

    assert_eq!(manager.remove(&point.id).expect("removed").id, point.id);
    assert!(!manager.resolve(&point.id));
}

// ── Deadlines ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn wait_times_out_at_pause_point_deadline() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), with_timeout(50))
        .expect("create");

    let started = tokio::time::Instant::now();
    let err = manager
        .wait_for_intervention(&point.id, None)
        .await
        .expect_err("timeout");
    let elapsed = started.elapsed();

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(elapsed >= Duration::from_millis(50), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(100), "elapsed {elapsed:?}");
    assert_eq!(manager.state(&point.id), Some(PauseState::TimedOut));
}

#[tokio::test(start_paused = true)]
async fn resolution_after_timeout_has_no_effect() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), with_timeout(50))
        .expect("create");
    let _ = manager.wait_for_intervention(&point.id, None).await;

    assert!(!manager.resolve(&point.id));
    assert!(!manager.reject_intervention(&point.id, "late"));
    assert_eq!(manager.state(&point.id), Some(PauseState::TimedOut));
    assert!(manager.pause_point(&point.id).expect("point").resolved_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn explicit_wait_timeout_overrides_pause_point() {
    let manager = manager();
    let point = manager
        .create_pause_point("exec-1", None, manual(), with_timeout(60_000))
        .expect("create");

    let started = tokio::time::Instant::now();
    let err = manager
        .wait_for_intervention(&point.id, Some(Duration::from_millis(20)))
        .await
        .expect_err("timeout");

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
}

// ── Retention ───────────────────────────────────────────────

#[tokio::test]
async fn closed_pause_points_are_evicted_beyond_retention() {
    let manager = PauseManager::with_retention(Arc::new(EventBus::new()), DEFAULT_TIMEOUT, 2);
    let mut ids = Vec::new();
    for _ in 0..3 {
        let point = manager
            .create_pause_point("exec-1", None, manual(), PauseOptions::default())
            .expect("create");
        assert!(manager.resolve(&point.id));
        manager
            .wait_for_intervention(&point.id, None)
            .await
            .expect("intervention");
        ids.push(point.id);
    }

    assert!(manager.state(&ids[0]).is_none());
    assert_eq!(manager.state(&ids[1]), Some(PauseState::Resolved));
    assert_eq!(manager.state(&ids[2]), Some(PauseState::Resolved));
}

#[tokio::test(start_paused = true)]
async fn open_pause_points_are_never_evicted() {
    let manager = PauseManager::with_retention(Arc::new(EventBus::new()), DEFAULT_TIMEOUT, 0);
    let open = manager
        .create_pause_point("exec-1", None, manual(), PauseOptions::default())
        .expect("create open");
    let expired = manager
        .create_pause_point("exec-1", None, manual(), with_timeout(10))
        .expect("create expiring");

    let _ = manager.wait_for_intervention(&expired.id, None).await;

    assert!(manager.state(&expired.id).is_none());
    assert_eq!(manager.state(&open.id), Some(PauseState::Created));
    assert!(manager.resolve(&open.id));
}

// ── Manual requests ─────────────────────────────────────────

#[test]
fn pause_requests_are_keyed_by_execution() {
    let manager = manager();
    manager.request_pause("exec-a");

    assert!(!manager.take_pause_request("exec-b"));
    assert!(manager.take_pause_request("exec-a"));
    assert!(!manager.take_pause_request("exec-a"));

    manager.request_pause("exec-c");
    manager.clear_pause_request("exec-c");
    assert!(!manager.take_pause_request("exec-c"));
}
