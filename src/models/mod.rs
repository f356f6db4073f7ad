//! Domain model module declarations.

use crate::{AppError, Result};

pub mod checkpoint;
pub mod context;
pub mod diff;
pub mod pause;
pub mod progress;
pub mod state;
pub mod thought;
pub mod tool;

/// Reject empty identifiers.
pub(crate) fn ensure_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Reject values outside the closed unit interval (including NaN).
pub(crate) fn ensure_unit_interval(field: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AppError::Validation(format!(
            "{field} must lie in [0, 1], got {value}"
        )));
    }
    Ok(())
}
