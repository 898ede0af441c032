//! Scenario state for engine selection behavioural tests.

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Step result type for engine selection BDD tests.
pub(crate) type StepResult<T> = Result<T, String>;

/// Whether a Podman candidate socket has a server behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Candidate {
    Silent,
    Answering,
}

#[derive(Debug, Clone)]
pub(crate) enum SelectionOutcome {
    Selected {
        engine: &'static str,
    },
    Failed {
        /// Engine kind of each attempt, in order.
        attempts: Vec<String>,
        message: String,
    },
}

#[derive(Default, ScenarioState)]
pub(crate) struct SelectionState {
    /// `None` means a missing socket in the scenario's directory.
    pub(crate) docker_uri: Slot<Option<String>>,
    pub(crate) candidates: Slot<Vec<Candidate>>,
    pub(crate) explicit_missing: Slot<bool>,
    pub(crate) outcome: Slot<SelectionOutcome>,
}

#[fixture]
pub(crate) fn selection_state() -> SelectionState {
    let state = SelectionState::default();
    state.docker_uri.set(None);
    state.candidates.set(Vec::new());
    state.explicit_missing.set(false);
    state
}
