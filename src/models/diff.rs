//! Field-level differences between two checkpoint snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};

use super::checkpoint::{CheckpointDiff, FieldChange};
use super::state::RuntimeState;

/// Compute the diff `from` → `to`, attributed to checkpoint `from_checkpoint_id`.
///
/// Collections are compared by length, scalars and variables by value.
#[must_use]
pub fn compute(from_checkpoint_id: &str, from: &RuntimeState, to: &RuntimeState) -> CheckpointDiff {
    let mut changes = BTreeMap::new();

    let mut record = |path: &str, before: Value, after: Value| {
        if before != after {
            changes.insert(path.to_owned(), FieldChange { before, after });
        }
    };

    record(
        "progress.step_number",
        json!(from.progress.step_number),
        json!(to.progress.step_number),
    );
    record(
        "progress.iterations_completed",
        json!(from.progress.iterations_completed),
        json!(to.progress.iterations_completed),
    );
    record(
        "progress.tokens_used",
        json!(from.progress.tokens_used),
        json!(to.progress.tokens_used),
    );
    record(
        "progress.duration_ms",
        json!(from.progress.duration_ms),
        json!(to.progress.duration_ms),
    );
    record(
        "thought_chain.steps",
        json!(from.thought_chain.steps.len()),
        json!(to.thought_chain.steps.len()),
    );
    record(
        "thought_chain.current_step_id",
        json!(from.thought_chain.current_step_id),
        json!(to.thought_chain.current_step_id),
    );
    record(
        "context.messages",
        json!(from.context.messages.len()),
        json!(to.context.messages.len()),
    );
    record(
        "tool_state.pending",
        json!(from.tool_state.pending.len()),
        json!(to.tool_state.pending.len()),
    );
    record(
        "tool_state.running",
        json!(from.tool_state.running.len()),
        json!(to.tool_state.running.len()),
    );
    record(
        "tool_state.completed",
        json!(from.tool_state.completed.len()),
        json!(to.tool_state.completed.len()),
    );
    record(
        "tool_state.failed",
        json!(from.tool_state.failed.len()),
        json!(to.tool_state.failed.len()),
    );

    let keys: BTreeSet<&String> = from
        .context
        .variables
        .keys()
        .chain(to.context.variables.keys())
        .collect();
    for key in keys {
        record(
            &format!("context.variables.{key}"),
            from.context.variables.get(key).cloned().unwrap_or(Value::Null),
            to.context.variables.get(key).cloned().unwrap_or(Value::Null),
        );
    }

    let summary = match changes.len() {
        0 => format!("no changes since {from_checkpoint_id}"),
        1 => format!("1 field changed since {from_checkpoint_id}"),
        n => format!("{n} fields changed since {from_checkpoint_id}"),
    };

    CheckpointDiff {
        from_checkpoint_id: from_checkpoint_id.to_owned(),
        changes,
        summary,
    }
}
