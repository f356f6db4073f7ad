use caf_runtime::models::state::RuntimeState;
use caf_runtime::orchestrator::history::StepHistory;

fn at_step(step_number: u64) -> RuntimeState {
    let mut state = RuntimeState::create_empty("ping", None);
    state.progress.step_number = step_number;
    state
}

#[test]
fn records_by_step_number() {
    let mut history = StepHistory::new(4);
    assert!(history.is_empty());
    assert!(history.latest().is_none());

    history.record(&at_step(0));
    history.record(&at_step(3));

    assert_eq!(history.len(), 2);
    assert_eq!(history.get(3).expect("step 3").progress.step_number, 3);
    assert!(history.get(1).is_none());
    assert_eq!(history.latest().expect("latest").progress.step_number, 3);
}

#[test]
fn evicts_oldest_beyond_capacity() {
    let mut history = StepHistory::new(2);
    for step in [0, 3, 6] {
        history.record(&at_step(step));
    }

    assert_eq!(history.steps().collect::<Vec<_>>(), vec![3, 6]);
}

#[test]
fn rerecording_a_step_replaces_it() {
    let mut history = StepHistory::new(2);
    history.record(&at_step(3));
    let mut replacement = at_step(3);
    replacement.progress.tokens_used = 42;
    history.record(&replacement);

    assert_eq!(history.len(), 1);
    assert_eq!(history.get(3).expect("step 3").progress.tokens_used, 42);
}

#[test]
fn zero_capacity_keeps_one_state() {
    let mut history = StepHistory::new(0);
    history.record(&at_step(0));
    history.record(&at_step(3));

    assert_eq!(history.steps().collect::<Vec<_>>(), vec![3]);
}
