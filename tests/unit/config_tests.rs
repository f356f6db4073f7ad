//! Unit tests for agent configuration parsing and validation.
//!
//! Validates:
//! - Defaults for an otherwise empty config
//! - An empty `[checkpoints]` table enables checkpointing
//! - Range and required-field violations surface as `AppError::Config`

use caf_runtime::config::AgentConfig;
use caf_runtime::models::pause::PauseAction;
use caf_runtime::AppError;
use std::path::PathBuf;
use std::time::Duration;

const MINIMAL: &str = r#"
name = "pinger"
instructions = "Reply to the task."
"#;

#[test]
fn minimal_config_uses_defaults() {
    let config = AgentConfig::from_toml_str(MINIMAL).expect("config");

    assert_eq!(config.agent_id(), "pinger");
    assert_eq!(config.max_iterations, 10);
    assert_eq!(config.history_capacity, 32);
    assert!(config.checkpoints.is_none());
    assert!(!config.checkpoints_enabled());
    assert!(config.database.is_none());
    assert!(config.pause.manual);
    assert!(!config.pause.on_tool_error);
    assert!(config.pause.on_low_confidence.is_none());
    assert_eq!(config.pause.timeout(), Duration::from_secs(3600));
    assert!(config.pause.on_timeout.is_none());
}

#[test]
fn empty_checkpoints_table_enables_checkpointing() {
    let raw = format!("{MINIMAL}\n[checkpoints]\n");
    let config = AgentConfig::from_toml_str(&raw).expect("config");

    let checkpoints = config.checkpoints.as_ref().expect("checkpoints");
    assert!(checkpoints.enabled);
    assert_eq!(checkpoints.export_dir, PathBuf::from("./checkpoints"));
    assert!(!checkpoints.on_step_complete);
    assert!(!checkpoints.on_tool_call);
    assert!(config.checkpoints_enabled());
}

#[test]
fn full_config_parses() {
    let raw = r#"
id = "agent-7"
name = "pinger"
description = "answers pings"
instructions = "Reply to the task."
max_iterations = 4
history_capacity = 8

[checkpoints]
enabled = false
export_dir = "/tmp/caf"
on_step_complete = true

[pause]
on_low_confidence = 0.4
on_tool_error = true
manual = false
timeout_seconds = 30
on_timeout = "continue"

[database]
path = "/tmp/caf/caf.db"
"#;
    let config = AgentConfig::from_toml_str(raw).expect("config");

    assert_eq!(config.agent_id(), "agent-7");
    assert_eq!(config.max_iterations, 4);
    assert!(!config.checkpoints_enabled());
    assert_eq!(config.pause.on_low_confidence, Some(0.4));
    assert!(config.pause.on_tool_error);
    assert!(!config.pause.manual);
    assert_eq!(config.pause.timeout(), Duration::from_secs(30));
    assert_eq!(config.pause.on_timeout, Some(PauseAction::Continue));
    assert_eq!(
        config.database.expect("database").path,
        PathBuf::from("/tmp/caf/caf.db")
    );
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("agent.toml");
    std::fs::write(&path, MINIMAL).expect("write");

    let config = AgentConfig::load_from_path(&path).expect("config");
    assert_eq!(config.name, "pinger");
}

// ── Validation ──────────────────────────────────────────────

fn assert_config_error(raw: &str) {
    let err = AgentConfig::from_toml_str(raw).expect_err("invalid config");
    assert!(matches!(err, AppError::Config(_)), "unexpected error: {err}");
}

#[test]
fn missing_required_fields_are_rejected() {
    assert_config_error(r#"instructions = "x""#);
    assert_config_error(r#"name = "x""#);
}

#[test]
fn zero_iteration_budget_is_rejected() {
    assert_config_error(&format!("{MINIMAL}max_iterations = 0\n"));
}

#[test]
fn zero_history_capacity_is_rejected() {
    assert_config_error(&format!("{MINIMAL}history_capacity = 0\n"));
}

#[test]
fn confidence_threshold_outside_unit_interval_is_rejected() {
    assert_config_error(&format!("{MINIMAL}\n[pause]\non_low_confidence = 1.5\n"));
}

#[test]
fn zero_pause_timeout_is_rejected() {
    assert_config_error(&format!("{MINIMAL}\n[pause]\ntimeout_seconds = 0\n"));
}

#[test]
fn unknown_timeout_action_is_rejected() {
    assert_config_error(&format!("{MINIMAL}\n[pause]\non_timeout = \"shrug\"\n"));
}

#[test]
fn blank_name_is_rejected() {
    let config = AgentConfig::new("  ", "x");
    assert!(matches!(config.validate(), Err(AppError::Config(_))));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = AgentConfig::load_from_path(dir.path().join("absent.toml")).expect_err("missing");
    assert!(matches!(err, AppError::Config(_)));
}
