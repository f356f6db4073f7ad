//! Agent configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::pause::PauseAction;
use crate::{AppError, Result};

/// Checkpoint policy. Present in the config means checkpointing is available.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CheckpointConfig {
    /// Whether checkpoints are taken at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory holding `<checkpoint-id>.json` files.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// Also snapshot after every non-terminal iteration.
    #[serde(default)]
    pub on_step_complete: bool,
    /// Also snapshot after an iteration whose tool phase ran a call.
    #[serde(default)]
    pub on_tool_call: bool,
}

impl CheckpointConfig {
    /// Enabled checkpointing into `export_dir` with no extra triggers.
    #[must_use]
    pub fn in_dir(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            export_dir: export_dir.into(),
            on_step_complete: false,
            on_tool_call: false,
        }
    }
}

/// Which conditions raise pause points.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PauseConfig {
    /// Pause when a thought's confidence falls below this threshold.
    #[serde(default)]
    pub on_low_confidence: Option<f64>,
    /// Pause when a tool call fails.
    #[serde(default)]
    pub on_tool_error: bool,
    /// Honor explicit pause requests.
    #[serde(default = "default_true")]
    pub manual: bool,
    /// Pause for review after a `decision` thought.
    #[serde(default)]
    pub on_decision: bool,
    /// Intervention wait deadline.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Action taken when a wait expires; the wait error propagates when absent.
    #[serde(default)]
    pub on_timeout: Option<PauseAction>,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            on_low_confidence: None,
            on_tool_error: false,
            manual: true,
            on_decision: false,
            timeout_seconds: default_timeout_seconds(),
            on_timeout: None,
        }
    }
}

impl PauseConfig {
    /// Wait deadline as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Relational backend location.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// `SQLite` database file.
    pub path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_timeout_seconds() -> u64 {
    3600
}

fn default_max_iterations() -> u32 {
    10
}

fn default_history_capacity() -> usize {
    32
}

/// Agent configuration parsed from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Stable agent identifier; defaults to `name`.
    #[serde(default)]
    pub id: Option<String>,
    /// Agent name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Instructions handed to the reasoning provider.
    pub instructions: String,
    /// Step-loop iteration budget.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Steps retained in the volatile rewind history.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Checkpoint policy; absent disables checkpointing.
    #[serde(default)]
    pub checkpoints: Option<CheckpointConfig>,
    /// Pause policy.
    #[serde(default)]
    pub pause: PauseConfig,
    /// Relational backend; absent keeps checkpoints file-only.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

impl AgentConfig {
    /// A minimal configuration with defaults and checkpointing disabled.
    #[must_use]
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            instructions: instructions.into(),
            max_iterations: default_max_iterations(),
            history_capacity: default_history_capacity(),
            checkpoints: None,
            pause: PauseConfig::default(),
            database: None,
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Agent identifier: `id` when set, else `name`.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Whether checkpoints are taken.
    #[must_use]
    pub fn checkpoints_enabled(&self) -> bool {
        self.checkpoints.as_ref().is_some_and(|c| c.enabled)
    }

    /// Check ranges and required fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Config("name must not be empty".into()));
        }
        if self.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(AppError::Config("id must not be empty when set".into()));
        }
        if self.max_iterations == 0 {
            return Err(AppError::Config(
                "max_iterations must be greater than zero".into(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(AppError::Config(
                "history_capacity must be greater than zero".into(),
            ));
        }
        if let Some(threshold) = self.pause.on_low_confidence {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(AppError::Config(format!(
                    "pause.on_low_confidence must lie in [0, 1], got {threshold}"
                )));
            }
        }
        if self.pause.timeout_seconds == 0 {
            return Err(AppError::Config(
                "pause.timeout_seconds must be greater than zero".into(),
            ));
        }
        if let Some(checkpoints) = &self.checkpoints {
            if checkpoints.export_dir.as_os_str().is_empty() {
                return Err(AppError::Config(
                    "checkpoints.export_dir must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}
