//! Volatile, per-run index of runtime states keyed by step number.

use std::collections::BTreeMap;

use crate::models::state::RuntimeState;

/// Bounded step-indexed history owned by one engine run.
///
/// Holds at most `capacity` states; recording beyond that evicts the oldest
/// step. Nothing here is persisted.
#[derive(Debug, Clone)]
pub struct StepHistory {
    capacity: usize,
    states: BTreeMap<u64, RuntimeState>,
}

impl StepHistory {
    /// Create an empty history holding at most `capacity` states (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            states: BTreeMap::new(),
        }
    }

    /// Index a copy of `state` under its current step number.
    pub fn record(&mut self, state: &RuntimeState) {
        self.states
            .insert(state.progress.step_number, state.clone());
        while self.states.len() > self.capacity {
            self.states.pop_first();
        }
    }

    /// State recorded at `step_number`.
    #[must_use]
    pub fn get(&self, step_number: u64) -> Option<&RuntimeState> {
        self.states.get(&step_number)
    }

    /// Most recently indexed state.
    #[must_use]
    pub fn latest(&self) -> Option<&RuntimeState> {
        self.states.values().next_back()
    }

    /// Indexed step numbers, ascending.
    pub fn steps(&self) -> impl Iterator<Item = u64> + '_ {
        self.states.keys().copied()
    }

    /// Number of indexed states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
