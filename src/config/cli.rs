//! Command-line argument definitions for runbox.

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser};

use crate::api::CommandChoice;
use crate::engine::ReconcileMode;

/// Command-line interface for runbox.
#[derive(Debug, Default, Parser)]
#[command(name = "runbox")]
#[command(
    author,
    version,
    about = "Run a command inside a reusable container as if it were local"
)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// Podman endpoint to use instead of probing for an engine.
    #[arg(long)]
    pub engine_socket: Option<String>,

    /// Container image to use.
    #[arg(long, alias = "img")]
    pub image: Option<String>,

    /// Never pull; fail if the image is not present.
    #[arg(long, conflicts_with = "new_container")]
    pub no_pull: bool,

    /// Stop and delete an existing container before starting.
    #[arg(long)]
    pub new_container: bool,

    /// Bring up a user shell instead of the main command.
    #[arg(long)]
    pub shell: bool,

    /// Bring up a shell as the container's admin user.
    #[arg(long)]
    pub root: bool,

    /// Treat the trailing arguments as the full command to run.
    #[arg(long)]
    pub no_command: bool,

    /// Value for `PATH` inside the container.
    #[arg(long, value_name = "VALUE")]
    pub path: Option<String>,

    /// Log at debug level.
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Log at trace level.
    #[arg(long, action = ArgAction::SetTrue)]
    pub trace: bool,

    /// Log errors only.
    #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["debug", "trace"])]
    pub quiet: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<Utf8PathBuf>,

    /// Arguments passed to the command inside the container.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Returns the reconciliation mode selected by the container flags.
    #[must_use]
    pub const fn reconcile_mode(&self) -> ReconcileMode {
        if self.no_pull {
            ReconcileMode::NeverPull
        } else if self.new_container {
            ReconcileMode::Recreate
        } else {
            ReconcileMode::Reuse
        }
    }

    /// Returns the command selected by `--root`, `--shell` and `--no-command`.
    ///
    /// `--root` implies a shell; a shell takes precedence over `--no-command`.
    #[must_use]
    pub const fn command_choice(&self) -> CommandChoice {
        if self.root {
            CommandChoice::AdminShell
        } else if self.shell {
            CommandChoice::Shell
        } else if self.no_command {
            CommandChoice::Verbatim
        } else {
            CommandChoice::Main
        }
    }
}
