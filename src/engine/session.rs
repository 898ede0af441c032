//! The selected engine, threaded through the rest of the crate.

use super::{
    ContainerDetails, ContainerEngine, ContainerIdentity, DockerEngine, EngineFuture,
    ExecAttachment, ExecResult, ExecSpec, PodmanEngine, TerminalGeometry,
};
use crate::registry::RegistryCredential;

/// Handle to the one engine chosen for this invocation.
///
/// This is the only place that branches on the engine kind; everything else
/// calls the [`ContainerEngine`] operations on the session.
#[derive(Debug, Clone)]
pub enum EngineSession {
    /// Docker, or an engine only reachable through the Docker API.
    Docker(DockerEngine),
    /// Podman through its native API.
    Podman(PodmanEngine),
}

impl EngineSession {
    fn engine(&self) -> &dyn ContainerEngine {
        match self {
            Self::Docker(engine) => engine,
            Self::Podman(engine) => engine,
        }
    }
}

impl ContainerEngine for EngineSession {
    fn name(&self) -> &'static str {
        self.engine().name()
    }

    fn find_container_by_name(&self, name: &str) -> EngineFuture<'_, Option<ContainerIdentity>> {
        self.engine().find_container_by_name(name)
    }

    fn find_image_id(&self, reference: &str) -> EngineFuture<'_, String> {
        self.engine().find_image_id(reference)
    }

    fn pull_image(
        &self,
        reference: &str,
        credential: Option<RegistryCredential>,
    ) -> EngineFuture<'_, String> {
        self.engine().pull_image(reference, credential)
    }

    fn create_container(
        &self,
        details: &ContainerDetails,
    ) -> EngineFuture<'_, Option<ContainerIdentity>> {
        self.engine().create_container(details)
    }

    fn start_container(&self, id: &str) -> EngineFuture<'_, ()> {
        self.engine().start_container(id)
    }

    fn delete_container(&self, id: &str) -> EngineFuture<'_, ()> {
        self.engine().delete_container(id)
    }

    fn create_exec(&self, spec: &ExecSpec) -> EngineFuture<'_, String> {
        self.engine().create_exec(spec)
    }

    fn start_exec(&self, exec_id: &str, tty: bool) -> EngineFuture<'_, ExecAttachment> {
        self.engine().start_exec(exec_id, tty)
    }

    fn resize_exec(&self, exec_id: &str, geometry: TerminalGeometry) -> EngineFuture<'_, ()> {
        self.engine().resize_exec(exec_id, geometry)
    }

    fn inspect_exec(&self, exec_id: &str) -> EngineFuture<'_, ExecResult> {
        self.engine().inspect_exec(exec_id)
    }
}
