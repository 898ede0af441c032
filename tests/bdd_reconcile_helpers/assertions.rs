//! Then-step assertions for container reconciliation scenarios.

use rstest_bdd_macros::then;

use super::state::{ReconcileOutcome, ReconcileState, StepResult};

fn recorded_outcome(reconcile_state: &ReconcileState) -> StepResult<ReconcileOutcome> {
    reconcile_state
        .outcome
        .get()
        .ok_or_else(|| String::from("reconciliation outcome should be recorded"))
}

#[then("the container id is {expected}")]
fn container_id_is(reconcile_state: &ReconcileState, expected: String) -> StepResult<()> {
    match recorded_outcome(reconcile_state)? {
        ReconcileOutcome::Ensured { id } if id == expected => Ok(()),
        ReconcileOutcome::Ensured { id } => Err(format!("expected container {expected}, got {id}")),
        ReconcileOutcome::Failed { message } => {
            Err(format!("expected container {expected}, got failure: {message}"))
        }
    }
}

#[then("reconciliation fails with \"{fragment}\"")]
fn reconciliation_fails_with(reconcile_state: &ReconcileState, fragment: String) -> StepResult<()> {
    match recorded_outcome(reconcile_state)? {
        ReconcileOutcome::Failed { message } if message.contains(&fragment) => Ok(()),
        ReconcileOutcome::Failed { message } => {
            Err(format!("expected failure mentioning '{fragment}', got: {message}"))
        }
        ReconcileOutcome::Ensured { id } => {
            Err(format!("expected failure, but container {id} was ensured"))
        }
    }
}

#[then("the engine calls were {calls}")]
fn engine_calls_were(reconcile_state: &ReconcileState, calls: String) -> StepResult<()> {
    let expected: Vec<String> = calls.split(", ").map(String::from).collect();
    let actual = reconcile_state.calls.get().unwrap_or_default();
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected engine calls {expected:?}, got {actual:?}"))
    }
}
