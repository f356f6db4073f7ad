//! Progress counters for one execution.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Monotonic counters describing how far an execution has advanced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionProgress {
    /// Phases that advanced the step counter.
    pub step_number: u64,
    /// Optional estimate of total steps; positive when set.
    pub total_steps_estimate: Option<u64>,
    /// Completed thought phases.
    pub iterations_completed: u64,
    /// Cumulative token usage.
    pub tokens_used: u64,
    /// Cumulative wall-clock duration.
    pub duration_ms: u64,
}

impl ExecutionProgress {
    /// Validate numeric ranges.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if `total_steps_estimate` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.total_steps_estimate == Some(0) {
            return Err(AppError::Validation(
                "total_steps_estimate must be positive".into(),
            ));
        }
        Ok(())
    }
}
