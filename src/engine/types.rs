//! Engine-agnostic value types shared by both adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::pin::Pin;

use bytes::Bytes;
use camino::Utf8PathBuf;
use futures_util::Stream;
use tokio::io::AsyncWrite;

use crate::error::{ConfigError, RunboxError};

/// Fallback geometry used when the local terminal size cannot be detected.
pub const FALLBACK_GEOMETRY: TerminalGeometry = TerminalGeometry {
    rows: 24,
    columns: 80,
};

/// How the reconciler treats an existing container and a missing image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Reuse an existing container; pull the image only when absent.
    #[default]
    Reuse,
    /// Delete any existing container and create a fresh one.
    Recreate,
    /// Like `Recreate` when a container exists, but never pull a missing image.
    NeverPull,
}

impl ReconcileMode {
    /// Returns true when an existing container may be returned unchanged.
    #[must_use]
    pub const fn reuses_existing(self) -> bool {
        matches!(self, Self::Reuse)
    }

    /// Returns true when a missing image may be pulled.
    #[must_use]
    pub const fn allows_pull(self) -> bool {
        !matches!(self, Self::NeverPull)
    }
}

/// Name and engine-assigned ID of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    /// The container name, without any leading `/`.
    pub name: String,
    /// The engine-assigned container ID.
    pub id: String,
}

impl ContainerIdentity {
    /// Build an identity from a name and ID.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Numeric user and group the container's user namespace maps the host user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIdentity {
    /// Numeric user ID.
    pub uid: u32,
    /// Numeric group ID.
    pub gid: u32,
}

/// Desired container state consumed by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    image: String,
    name: String,
    mode: ReconcileMode,
    mount_source: Option<Utf8PathBuf>,
    mount_target: Option<Utf8PathBuf>,
    user: Option<UserIdentity>,
}

impl ContainerDetails {
    /// Create details for a container built from `image` and called `name`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `image` or `name` is blank.
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Result<Self, RunboxError> {
        let image_value = image.into();
        let name_value = name.into();
        Ok(Self {
            image: String::from(validate_required_field("image", &image_value)?),
            name: String::from(validate_required_field("container name", &name_value)?),
            mode: ReconcileMode::default(),
            mount_source: None,
            mount_target: None,
            user: None,
        })
    }

    /// Set the reconciliation mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bind `source` on the host to `target` in the container.
    #[must_use]
    pub fn with_mount(
        mut self,
        source: Option<Utf8PathBuf>,
        target: Option<Utf8PathBuf>,
    ) -> Self {
        self.mount_source = source.filter(|path| !path.as_str().is_empty());
        self.mount_target = target.filter(|path| !path.as_str().is_empty());
        self
    }

    /// Map the container user namespace to `user`.
    #[must_use]
    pub const fn with_user(mut self, user: Option<UserIdentity>) -> Self {
        self.user = user;
        self
    }

    /// Return the image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return the container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the reconciliation mode.
    #[must_use]
    pub const fn mode(&self) -> ReconcileMode {
        self.mode
    }

    /// Return the bind mount when both ends are known.
    #[must_use]
    pub fn mount(&self) -> Option<(&Utf8PathBuf, &Utf8PathBuf)> {
        self.mount_source.as_ref().zip(self.mount_target.as_ref())
    }

    /// Return the user namespace mapping.
    #[must_use]
    pub const fn user(&self) -> Option<UserIdentity> {
        self.user
    }
}

/// The command to execute in a running container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecDetails {
    container_id: String,
    command: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<String>,
    user: Option<String>,
}

impl ExecDetails {
    /// Create details for running `command` in `container_id`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when the container ID or command
    /// is empty, and `ConfigError::InvalidValue` when the executable is blank.
    pub fn new(container_id: impl Into<String>, command: Vec<String>) -> Result<Self, RunboxError> {
        let container_id_value = container_id.into();
        let id = String::from(validate_required_field("container", &container_id_value)?);
        Ok(Self {
            container_id: id,
            command: validate_command(command)?,
            env: BTreeMap::new(),
            working_dir: None,
            user: None,
        })
    }

    /// Set the environment passed to the process.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Set the working directory inside the container.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: Option<String>) -> Self {
        self.working_dir = working_dir.filter(|dir| !dir.is_empty());
        self
    }

    /// Set the user the process runs as.
    #[must_use]
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user.filter(|name| !name.is_empty());
        self
    }

    /// Return target container identifier.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Return command argv entries.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Return the environment mapping.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Return the environment in `KEY=value` form.
    #[must_use]
    pub fn env_pairs(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect()
    }

    /// Return the working directory.
    #[must_use]
    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Return the exec user.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

/// Everything an adapter needs to create an exec session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// What to run.
    pub details: ExecDetails,
    /// Whether a pseudo-terminal is allocated.
    pub tty: bool,
    /// Initial console size.
    pub geometry: TerminalGeometry,
}

/// Snapshot of an exec session as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Engine-assigned exec ID.
    pub exec_id: String,
    /// Host-side process ID, when reported.
    pub pid: Option<i64>,
    /// Exit code; only meaningful once `running` is false.
    pub exit_code: Option<i64>,
    /// Whether the process is still running.
    pub running: bool,
}

/// Size of a terminal in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalGeometry {
    /// Number of rows.
    pub rows: u16,
    /// Number of columns.
    pub columns: u16,
}

impl TerminalGeometry {
    /// Build a geometry, falling back to 24x80 when either dimension is zero.
    #[must_use]
    pub const fn new_or_fallback(rows: u16, columns: u16) -> Self {
        if rows == 0 || columns == 0 {
            FALLBACK_GEOMETRY
        } else {
            Self { rows, columns }
        }
    }
}

/// A chunk of exec output tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    /// Bytes written to the remote stdout (or the terminal, with a TTY).
    Stdout(Bytes),
    /// Bytes written to the remote stderr.
    Stderr(Bytes),
}

/// Output half of an attached exec session.
pub type OutputStream = Pin<Box<dyn Stream<Item = io::Result<OutputChunk>> + Send>>;

/// Input half of an attached exec session.
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// The bidirectional stream returned when an exec session is started.
pub struct ExecAttachment {
    /// Remote output, already split into stdout and stderr when framed.
    pub output: OutputStream,
    /// Remote stdin.
    pub input: InputSink,
    /// Whether the engine framed stdout and stderr separately.
    pub multiplexed: bool,
}

impl fmt::Debug for ExecAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecAttachment")
            .field("multiplexed", &self.multiplexed)
            .finish_non_exhaustive()
    }
}

fn validate_command(command: Vec<String>) -> Result<Vec<String>, RunboxError> {
    if command.is_empty() {
        return Err(RunboxError::from(ConfigError::MissingRequired {
            field: String::from("command"),
        }));
    }

    let executable = command.first().map(String::as_str).unwrap_or_default();
    if executable.trim().is_empty() {
        return Err(RunboxError::from(ConfigError::InvalidValue {
            field: String::from("command"),
            reason: String::from("command executable must not be empty"),
        }));
    }

    Ok(command)
}

fn validate_required_field<'a>(field: &str, value: &'a str) -> Result<&'a str, RunboxError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RunboxError::from(ConfigError::MissingRequired {
            field: String::from(field),
        }));
    }

    Ok(trimmed)
}

/// Derive a container name from a host directory.
///
/// Every run of characters outside `[A-Za-z0-9_.-]` in `/<host_root>` becomes
/// a single `_`, and `<prefix>_` is prepended so the name starts with an
/// alphanumeric character.
#[must_use]
pub fn container_name_for(prefix: &str, host_root: &str) -> String {
    let rooted = format!("/{host_root}");
    let mut name = String::with_capacity(prefix.len() + rooted.len());
    name.push_str(prefix);
    let mut in_invalid_run = false;
    for ch in rooted.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
            name.push(ch);
            in_invalid_run = false;
        } else if !in_invalid_run {
            name.push('_');
            in_invalid_run = true;
        }
    }
    name
}
