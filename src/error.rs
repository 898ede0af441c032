//! Semantic error types for the runbox application.
//!
//! This module defines the error hierarchy for runbox, following the principle of
//! using semantic error enums (via `thiserror`) for conditions the caller might
//! inspect or map to an exit code, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! Lookups that find nothing are expressed as `None` or an empty string by the
//! engine layer and never appear here.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// One rejected candidate recorded while selecting a container engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAttempt {
    /// The engine and endpoint that was tried, e.g. `podman at unix:///run/podman/podman.sock`.
    pub candidate: String,
    /// Why the candidate was rejected.
    pub reason: String,
}

impl SelectionAttempt {
    /// Record a rejected candidate.
    #[must_use]
    pub fn new(candidate: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SelectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.candidate, self.reason)
    }
}

fn format_attempts(attempts: &[SelectionAttempt]) -> String {
    if attempts.is_empty() {
        return String::from("no candidates were found");
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_credential_hint(credential_error: Option<&str>) -> String {
    credential_error
        .map(|error| format!(" (credential lookup also failed: {error})"))
        .unwrap_or_default()
}

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The endpoint uses a scheme the selected engine client cannot speak.
    #[error("unsupported container engine endpoint: {endpoint}")]
    UnsupportedEndpoint {
        /// The endpoint as configured.
        endpoint: String,
    },

    /// No container engine could be reached.
    #[error("no container engine reachable ({})", format_attempts(.attempts))]
    EngineUnavailable {
        /// Every candidate that was tried, in order, with its failure.
        attempts: Vec<SelectionAttempt>,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Failed to create the async runtime used by synchronous helpers.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },

    /// Listing containers or images failed.
    #[error("failed to look up {target}: {message}")]
    LookupFailed {
        /// What was being looked up, e.g. `container 'name'`.
        target: String,
        /// A description of the lookup failure.
        message: String,
    },

    /// Pulling an image failed.
    #[error("failed to pull image '{image}': {message}{}", format_credential_hint(.credential_error.as_deref()))]
    PullFailed {
        /// The image reference being pulled.
        image: String,
        /// A description of the pull failure.
        message: String,
        /// The credential lookup failure retained from before the pull, if any.
        credential_error: Option<String>,
    },

    /// The image is missing locally and the reconciliation mode forbids pulling.
    #[error("image '{image}' is not present and pulling is disallowed")]
    ImagePullDisallowed {
        /// The missing image reference.
        image: String,
    },

    /// The pull completed but the image still cannot be found.
    #[error("pulling image '{image}' succeeded but produced no image")]
    PulledImageMissing {
        /// The pulled image reference.
        image: String,
    },

    /// Failed to create a container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// The engine accepted a create request but returned no container.
    #[error("engine reported creating container '{name}' but returned no identity")]
    CreatedContainerMissing {
        /// The requested container name.
        name: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Failed to stop or remove a container.
    #[error("failed to delete container '{container_id}': {message}")]
    DeleteFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the delete failure.
        message: String,
    },

    /// Failed to execute a command in a container.
    #[error("failed to execute command in container '{container_id}': {message}")]
    ExecFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the execution failure.
        message: String,
    },

    /// An attached exec stream failed while copying data.
    #[error("exec stream in container '{container_id}' failed: {message}")]
    StreamFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the stream failure.
        message: String,
    },

    /// The exec session was cancelled before the remote process finished.
    #[error("exec session in container '{container_id}' was cancelled")]
    ExecCancelled {
        /// The ID of the container.
        container_id: String,
    },
}

/// Errors that can occur while resolving registry credentials.
///
/// Every variant is recoverable: image pulls proceed unauthenticated and only
/// report the credential failure if the pull itself fails.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The image reference names no registry host.
    #[error("image reference '{reference}' has no registry hostname")]
    NoHostname {
        /// The image reference.
        reference: String,
    },

    /// No credential-store file exists at any of the searched paths.
    #[error("no registry credential file found")]
    NoConfig,

    /// A credential-store file could not be read.
    #[error("failed to read credential file '{path}': {message}")]
    Unreadable {
        /// The credential file path.
        path: PathBuf,
        /// A description of the read failure.
        message: String,
    },

    /// A credential-store file or entry was not in the expected format.
    #[error("malformed credentials in '{path}': {message}")]
    Malformed {
        /// The credential file path.
        path: PathBuf,
        /// A description of the format problem.
        message: String,
    },

    /// The store holds nothing for the requested registry.
    #[error("no credentials stored for registry '{hostname}'")]
    NoEntry {
        /// The registry hostname.
        hostname: String,
    },

    /// The configured credential helper name is not a plain lowercase word.
    #[error("refusing credential helper '{name}': name must match [a-z]+")]
    InvalidHelper {
        /// The rejected helper name.
        name: String,
    },

    /// The credential helper could not be run or returned unusable output.
    #[error("credential helper '{helper}' failed: {message}")]
    HelperFailed {
        /// The helper executable name.
        helper: String,
        /// A description of the helper failure.
        message: String,
    },
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

/// Top-level error type for the runbox application.
///
/// At the application boundary (main.rs) these errors are converted to
/// `eyre::Report` for human-readable error reporting.
#[derive(Debug, Error)]
pub enum RunboxError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An error occurred while resolving registry credentials.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl RunboxError {
    /// Returns true when this error reports a cancelled exec session.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Container(ContainerError::ExecCancelled { .. }))
    }
}

/// A specialised `Result` type for runbox operations.
pub type Result<T> = std::result::Result<T, RunboxError>;
