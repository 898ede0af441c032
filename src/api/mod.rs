//! Orchestration API for runbox.
//!
//! [`plan_run`] turns configuration and command-line choices into a
//! [`RunPlan`]; [`run`] selects an engine and carries the plan out, and
//! [`run_with_engine`] does the same against an engine the caller already
//! holds.
//!
//! All functions accept library-owned types (not clap types) and return
//! [`crate::error::Result`]. They do not print to stdout/stderr or call
//! `std::process::exit`.

mod plan;
mod run;

pub use plan::{CommandChoice, RunOptions, RunPlan, plan_run};
pub use run::{RunParams, run, run_with_engine};

/// Outcome of a runbox command.
///
/// Commands return either outright success or the non-zero exit code of the
/// process that ran in the container, which the CLI passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command completed successfully (exit code 0).
    Success,
    /// The command completed but the underlying process exited with a
    /// non-zero code.
    CommandExit {
        /// The exit code reported by the container engine.
        code: i64,
    },
}

impl CommandOutcome {
    /// Build an outcome from a remote exit code.
    #[must_use]
    pub const fn from_exit_code(code: i64) -> Self {
        if code == 0 {
            Self::Success
        } else {
            Self::CommandExit { code }
        }
    }

    /// The process exit status to report, truncated into `0..=255` the way
    /// a shell would.
    #[must_use]
    pub fn exit_status(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::CommandExit { code } => u8::try_from(code.rem_euclid(256)).unwrap_or(u8::MAX),
        }
    }
}
