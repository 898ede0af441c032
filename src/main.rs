//! `runbox` application entry point.
//!
//! This binary runs the configured command inside a reusable container. It
//! uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/runbox/config.toml` or path from `RUNBOX_CONFIG_PATH`)
//! 3. Environment variables (`RUNBOX_*`)
//! 4. Command-line arguments
//!
//! The process exits with the remote command's exit code, or 255 when
//! runbox itself fails.

use std::process::ExitCode;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::{Dir, OpenOptions};
use clap::Parser;
use eyre::{Report, Result as EyreResult, WrapErr};
use mockable::DefaultEnv;
use runbox::api::{CommandOutcome, RunOptions, RunParams, plan_run, run};
use runbox::config::{Cli, load_config};
use runbox::engine::{LocalTerminal, SystemTerminal};
use runbox::error::{ContainerError, FilesystemError};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit status reserved for failures of runbox itself.
const FAILURE_EXIT_CODE: u8 = 255;

/// Application entry point.
///
/// Parses the CLI, installs logging, then runs the command and maps the
/// outcome to a process exit code.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match init_logging(&cli).and_then(|()| execute(&cli)) {
        Ok(outcome) => ExitCode::from(outcome.exit_status()),
        Err(report) => {
            report_failure(&report);
            ExitCode::from(FAILURE_EXIT_CODE)
        }
    }
}

#[expect(clippy::print_stderr, reason = "fatal errors are reported on stderr")]
fn report_failure(report: &Report) {
    eprintln!("runbox: {report:?}");
}

/// Load configuration and run the command, returning the remote outcome.
fn execute(cli: &Cli) -> EyreResult<CommandOutcome> {
    let config = load_config(cli).map_err(Report::from)?;
    let host_root = current_dir()?;
    let plan = plan_run(&config, run_options(cli), &host_root).map_err(Report::from)?;

    let runtime = tokio::runtime::Runtime::new().map_err(|error| {
        Report::from(ContainerError::RuntimeCreationFailed {
            message: error.to_string(),
        })
    })?;
    let env = DefaultEnv::new();
    let cancel = CancellationToken::new();

    let outcome = runtime.block_on(async {
        if !SystemTerminal.is_terminal() {
            cancel_on_interrupt(cancel.clone());
        }
        run(RunParams {
            config: &config,
            plan,
            env: &env,
            cancel: &cancel,
        })
        .await
        .map_err(Report::from)
    });
    // Leftover tasks, such as the interrupt listener, must not delay exit.
    runtime.shutdown_background();
    outcome
}

/// Map command-line flags to library-owned run options.
fn run_options(cli: &Cli) -> RunOptions {
    RunOptions {
        choice: cli.command_choice(),
        mode: cli.reconcile_mode(),
        args: cli.args.clone(),
        path: cli.path.clone(),
    }
}

/// Cancel the session on Ctrl-C. Interactive sessions pass Ctrl-C through
/// the raw terminal instead.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received; cancelling session");
            cancel.cancel();
        }
    });
}

fn current_dir() -> EyreResult<Utf8PathBuf> {
    let dir = std::env::current_dir().wrap_err("failed to read the working directory")?;
    Utf8PathBuf::from_path_buf(dir)
        .map_err(|path| eyre::eyre!("working directory is not UTF-8: {}", path.display()))
}

/// Default filter directive for the verbosity flags.
const fn default_level(cli: &Cli) -> &'static str {
    if cli.trace {
        "trace"
    } else if cli.debug || cli.log_file.is_some() {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the verbosity flags.
fn init_logging(cli: &Cli) -> EyreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(cli)));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match cli.log_file.as_deref() {
        Some(path) => {
            let file = open_log_file(path).map_err(Report::from)?;
            builder
                .with_ansi(false)
                .with_writer(Arc::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|error| eyre::eyre!("failed to install logging: {error}"))
}

fn open_log_file(path: &Utf8Path) -> Result<std::fs::File, FilesystemError> {
    let io_error = |error: std::io::Error| FilesystemError::IoError {
        path: path.as_std_path().to_path_buf(),
        message: error.to_string(),
    };
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| FilesystemError::NotFound {
        path: path.as_std_path().to_path_buf(),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
    let file = dir
        .open_with(file_name, OpenOptions::new().create(true).append(true))
        .map_err(io_error)?;
    Ok(file.into_std())
}
