//! Then-step assertions for orchestration scenarios.

use rstest_bdd_macros::then;

use super::state::{ExecRecord, OrchestrationState, RunOutcome, StepResult};

fn recorded_outcome(orchestration_state: &OrchestrationState) -> StepResult<RunOutcome> {
    orchestration_state
        .outcome
        .get()
        .ok_or_else(|| String::from("run outcome should be recorded"))
}

fn recorded_exec(orchestration_state: &OrchestrationState) -> StepResult<ExecRecord> {
    orchestration_state
        .exec
        .get()
        .ok_or_else(|| String::from("an exec session should have been created"))
}

#[then("the exit status is {expected}")]
fn exit_status_is(orchestration_state: &OrchestrationState, expected: u8) -> StepResult<()> {
    match recorded_outcome(orchestration_state)? {
        RunOutcome::Finished { exit_status } if exit_status == expected => Ok(()),
        RunOutcome::Finished { exit_status } => {
            Err(format!("expected exit status {expected}, got {exit_status}"))
        }
        RunOutcome::Failed { message } => Err(format!(
            "expected exit status {expected}, got failure: {message}"
        )),
    }
}

#[then("the run fails with \"{fragment}\"")]
fn run_fails_with(orchestration_state: &OrchestrationState, fragment: String) -> StepResult<()> {
    match recorded_outcome(orchestration_state)? {
        RunOutcome::Failed { message } if message.contains(&fragment) => Ok(()),
        RunOutcome::Failed { message } => {
            Err(format!("expected failure mentioning '{fragment}', got: {message}"))
        }
        RunOutcome::Finished { exit_status } => Err(format!(
            "expected failure, but the run finished with status {exit_status}"
        )),
    }
}

#[then("the container {name} was started")]
fn container_was_started(orchestration_state: &OrchestrationState, name: String) -> StepResult<()> {
    let looked_up = orchestration_state.looked_up.get().unwrap_or_default();
    let started = orchestration_state.started.get().unwrap_or_default();
    if looked_up != vec![name.clone()] {
        return Err(format!("expected a lookup of {name}, got {looked_up:?}"));
    }
    if started == vec![String::from("c1")] {
        Ok(())
    } else {
        Err(format!("expected {name} (c1) to be started once, got {started:?}"))
    }
}

#[then("the exec command was {command}")]
fn exec_command_was(orchestration_state: &OrchestrationState, command: String) -> StepResult<()> {
    let exec = recorded_exec(orchestration_state)?;
    let actual = exec.command.join(" ");
    if actual == command {
        Ok(())
    } else {
        Err(format!("expected exec command '{command}', got '{actual}'"))
    }
}

#[then("the exec ran in {working_dir} as {user}")]
fn exec_ran_in_as(
    orchestration_state: &OrchestrationState,
    working_dir: String,
    user: String,
) -> StepResult<()> {
    let exec = recorded_exec(orchestration_state)?;
    if exec.working_dir.as_deref() == Some(working_dir.as_str())
        && exec.user.as_deref() == Some(user.as_str())
    {
        Ok(())
    } else {
        Err(format!(
            "expected exec in {working_dir} as {user}, got {:?} as {:?}",
            exec.working_dir, exec.user
        ))
    }
}

#[then("no exec session was created")]
fn no_exec_session(orchestration_state: &OrchestrationState) -> StepResult<()> {
    match orchestration_state.exec.get() {
        None => Ok(()),
        Some(record) => Err(format!("expected no exec session, got {record:?}")),
    }
}
