//! Container engine selection, adapters and the session built on top of them.
//!
//! Two engines are supported: Docker (through `bollard`) and Podman (through
//! its native libpod REST API). Both implement [`ContainerEngine`], and
//! [`EngineSession`] is the closed set of the two that the rest of the crate
//! is written against. [`select_backend`](select::BackendSelector::select)
//! decides which one to use:
//!
//! 1. An explicit endpoint (`--engine-socket`, `engine_socket` in config,
//!    `RUNBOX_ENGINE_SOCKET`, or `CONTAINER_HOST`) connects to Podman directly.
//! 2. Otherwise the ambient Docker endpoint (`DOCKER_HOST` or the platform
//!    default) is probed; a Podman compatibility service answering there is
//!    replaced by a native Podman connection to the same endpoint.
//! 3. Otherwise well-known Podman sockets are tried in order.

mod docker;
mod exec;
mod podman;
mod reconcile;
mod select;
mod session;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use self::docker::{DockerApi, DockerEngine};
pub use self::exec::{
    LocalInput, LocalOutput, LocalStreams, LocalTerminal, RawModeGuard, SystemTerminal,
    detached_input, run_session,
};
pub use self::podman::{PodmanClient, PodmanEndpoint, PodmanEngine};
pub use self::reconcile::ensure_container;
pub use self::select::{BackendSelector, EngineTarget};
pub use self::session::EngineSession;
pub use self::types::{
    ContainerDetails, ContainerIdentity, ExecAttachment, ExecDetails, ExecResult, ExecSpec,
    FALLBACK_GEOMETRY, InputSink, OutputChunk, OutputStream, ReconcileMode, TerminalGeometry,
    UserIdentity, container_name_for,
};
use crate::error::RunboxError;
use crate::registry::RegistryCredential;

/// Boxed future returned by [`ContainerEngine`] operations.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RunboxError>> + Send + 'a>>;

/// Engine-agnostic container lifecycle operations.
///
/// Lookups that find nothing return `None` or an empty string rather than an
/// error.
pub trait ContainerEngine: Send + Sync {
    /// Short engine name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Find a container whose name is exactly `name`.
    fn find_container_by_name(&self, name: &str) -> EngineFuture<'_, Option<ContainerIdentity>>;

    /// Return the ID of the local image matching `reference`, or an empty string.
    fn find_image_id(&self, reference: &str) -> EngineFuture<'_, String>;

    /// Pull `reference` and return the resulting image ID (empty if none).
    fn pull_image(
        &self,
        reference: &str,
        credential: Option<RegistryCredential>,
    ) -> EngineFuture<'_, String>;

    /// Create (but do not start) the container described by `details`.
    fn create_container(
        &self,
        details: &ContainerDetails,
    ) -> EngineFuture<'_, Option<ContainerIdentity>>;

    /// Start a created or stopped container.
    fn start_container(&self, id: &str) -> EngineFuture<'_, ()>;

    /// Stop and force-remove a container, tolerating one that is already gone.
    fn delete_container(&self, id: &str) -> EngineFuture<'_, ()>;

    /// Create an exec session and return its ID.
    fn create_exec(&self, spec: &ExecSpec) -> EngineFuture<'_, String>;

    /// Start an exec session and attach to its streams.
    fn start_exec(&self, exec_id: &str, tty: bool) -> EngineFuture<'_, ExecAttachment>;

    /// Resize the pseudo-terminal of a running exec session.
    fn resize_exec(&self, exec_id: &str, geometry: TerminalGeometry) -> EngineFuture<'_, ()>;

    /// Inspect an exec session.
    fn inspect_exec(&self, exec_id: &str) -> EngineFuture<'_, ExecResult>;
}

/// Returns true when any entry in `names` is `wanted` with or without a leading `/`.
///
/// Engines filter names by substring, so `foo` would otherwise match `foobar`.
#[must_use]
pub fn matches_name<S: AsRef<str>>(names: &[S], wanted: &str) -> bool {
    names.iter().any(|entry| {
        let candidate = entry.as_ref();
        candidate == wanted || candidate.strip_prefix('/') == Some(wanted)
    })
}
