//! Derive what to run, and where, from configuration.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::AppConfig;
use crate::engine::{ContainerDetails, ReconcileMode, UserIdentity, container_name_for};
use crate::error::Result as RunboxResult;

/// Which command the session runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandChoice {
    /// The configured main command followed by the trailing arguments.
    #[default]
    Main,
    /// The configured shell as the ordinary user.
    Shell,
    /// The configured shell as the admin user.
    AdminShell,
    /// The trailing arguments alone.
    Verbatim,
}

/// Invocation choices that are not part of the layered configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Which command to run.
    pub choice: CommandChoice,
    /// How an existing container and a missing image are treated.
    pub mode: ReconcileMode,
    /// Trailing arguments from the command line.
    pub args: Vec<String>,
    /// Value for `PATH` inside the container, overriding `[env]`.
    pub path: Option<String>,
}

/// Everything needed to run one command in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// The container to ensure.
    pub container: ContainerDetails,
    /// Command argv.
    pub command: Vec<String>,
    /// Environment passed to the exec.
    pub env: BTreeMap<String, String>,
    /// Working directory inside the container.
    pub working_dir: Utf8PathBuf,
    /// User the command runs as, when configured.
    pub user: Option<String>,
}

/// Build the plan for running in the project rooted at `host_root`.
///
/// The container is named after `host_root`, which is mounted at the
/// configured mount path and used as the working directory.
///
/// # Errors
///
/// Returns `ConfigError::MissingRequired` when no image is configured.
pub fn plan_run(
    config: &AppConfig,
    options: RunOptions,
    host_root: &Utf8Path,
) -> RunboxResult<RunPlan> {
    let RunOptions {
        choice,
        mode,
        args,
        path,
    } = options;
    let image = config.require_image()?;
    let name = container_name_for(
        config.container_prefix(),
        host_root.as_str().trim_start_matches('/'),
    );
    let mount_path = config.container.mount_path.clone();
    let user_identity = config
        .container
        .uid
        .zip(config.container.gid)
        .map(|(uid, gid)| UserIdentity { uid, gid });
    let container = ContainerDetails::new(image, name)?
        .with_mode(mode)
        .with_mount(Some(host_root.to_path_buf()), Some(mount_path.clone()))
        .with_user(user_identity);

    let base = match choice {
        CommandChoice::Main => config.command.main.as_slice(),
        CommandChoice::Shell | CommandChoice::AdminShell => config.command.shell.as_slice(),
        CommandChoice::Verbatim => &[],
    };
    let command = base.iter().cloned().chain(args).collect();

    let mut env = config.env.clone();
    if let Some(value) = path {
        env.insert(String::from("PATH"), value);
    }

    let user = match choice {
        CommandChoice::AdminShell => config.container.admin_user.clone(),
        CommandChoice::Main | CommandChoice::Shell | CommandChoice::Verbatim => {
            config.container.user.clone()
        }
    };

    tracing::trace!(?command, container = container.name(), "planned run");
    Ok(RunPlan {
        container,
        command,
        env,
        working_dir: mount_path,
        user,
    })
}
