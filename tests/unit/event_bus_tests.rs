//! Unit tests for the in-process event bus.
//!
//! Validates:
//! - Category listeners run before wildcard listeners, each in subscription order
//! - Malformed events are rejected and never delivered
//! - Listeners may subscribe from inside a delivery
//! - Events serialize as a union tagged by `type`

use std::sync::{Arc, Mutex};

use caf_runtime::events::{AgentEvent, ErrorDetails, EventBus, EventKind};
use caf_runtime::models::checkpoint::{Checkpoint, CheckpointMetadata, CheckpointReason};
use caf_runtime::models::state::RuntimeState;
use caf_runtime::AppError;
use chrono::Utc;

fn resumed(execution_id: &str) -> AgentEvent {
    AgentEvent::Resumed {
        execution_id: execution_id.into(),
        timestamp: Utc::now(),
    }
}

fn started(execution_id: &str) -> AgentEvent {
    AgentEvent::Started {
        execution_id: execution_id.into(),
        agent_id: "agent-1".into(),
        timestamp: Utc::now(),
    }
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn push(log: &Log, label: &'static str) -> impl Fn(&AgentEvent) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |_event: &AgentEvent| log.lock().expect("lock").push(label)
}

// ── Delivery ────────────────────────────────────────────────

#[test]
fn category_listeners_run_before_wildcards() {
    let bus = EventBus::new();
    let log: Log = Arc::default();

    bus.on_any(push(&log, "wildcard"));
    bus.on(EventKind::Resumed, push(&log, "first"));
    bus.on(EventKind::Resumed, push(&log, "second"));
    bus.on(EventKind::Started, push(&log, "other"));

    bus.emit(&resumed("exec-1")).expect("emit");

    assert_eq!(*log.lock().expect("lock"), vec!["first", "second", "wildcard"]);
}

#[test]
fn off_removes_listener() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    let id = bus.on(EventKind::Resumed, push(&log, "removed"));
    bus.on_any(push(&log, "kept"));
    assert_eq!(bus.listener_count(), 2);

    assert!(bus.off(id));
    assert!(!bus.off(id));
    bus.emit(&resumed("exec-1")).expect("emit");

    assert_eq!(*log.lock().expect("lock"), vec!["kept"]);
    assert_eq!(bus.listener_count(), 1);
}

#[test]
fn emit_without_listeners_succeeds() {
    EventBus::new().emit(&started("exec-1")).expect("emit");
}

#[test]
fn listener_may_subscribe_during_delivery() {
    let bus = Arc::new(EventBus::new());
    let log: Log = Arc::default();

    let inner_bus = Arc::clone(&bus);
    let inner_log = Arc::clone(&log);
    bus.on(EventKind::Started, move |_event: &AgentEvent| {
        inner_bus.on(EventKind::Resumed, push(&inner_log, "late"));
    });

    bus.emit(&started("exec-1")).expect("emit started");
    bus.emit(&resumed("exec-1")).expect("emit resumed");

    assert_eq!(*log.lock().expect("lock"), vec!["late"]);
}

// ── Validation ──────────────────────────────────────────────

#[test]
fn malformed_event_is_rejected_and_not_delivered() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    bus.on_any(push(&log, "delivered"));

    let err = bus.emit(&started("")).expect_err("empty execution id");
    assert!(matches!(err, AppError::Validation(msg) if msg.contains("agent.started")));

    let empty_error = AgentEvent::ErrorOccurred {
        execution_id: "exec-1".into(),
        error: ErrorDetails {
            message: String::new(),
            stack: None,
            code: None,
        },
        timestamp: Utc::now(),
    };
    assert!(bus.emit(&empty_error).is_err());

    assert!(log.lock().expect("lock").is_empty());
}

#[test]
fn checkpoint_event_must_match_its_execution() {
    let checkpoint = Checkpoint::new(
        "exec-1".into(),
        "agent-1".into(),
        RuntimeState::create_empty("ping", None),
        CheckpointMetadata {
            step_number: 0,
            total_steps_estimate: None,
            tokens_used: 0,
            duration_ms: 0,
            checkpoint_reason: CheckpointReason::Manual,
            agent_name: None,
            agent_id: "agent-1".into(),
        },
    );
    let foreign = AgentEvent::Checkpoint {
        execution_id: "exec-2".into(),
        checkpoint: Box::new(checkpoint.clone()),
        timestamp: Utc::now(),
    };
    assert!(EventBus::new().emit(&foreign).is_err());

    let own = AgentEvent::Checkpoint {
        execution_id: "exec-1".into(),
        checkpoint: Box::new(checkpoint),
        timestamp: Utc::now(),
    };
    EventBus::new().emit(&own).expect("emit");
}

// ── Wire shape ──────────────────────────────────────────────

#[test]
fn events_serialize_with_type_tag() {
    let event = resumed("exec-1");
    let value = serde_json::to_value(&event).expect("encode");

    assert_eq!(value["type"], "agent.resumed");
    assert_eq!(value["execution_id"], "exec-1");
    assert_eq!(event.kind().as_str(), "agent.resumed");

    let decoded: AgentEvent = serde_json::from_value(value).expect("decode");
    assert_eq!(decoded, event);
}
