//! Docker adapter built on `bollard`.
//!
//! The engine logic is written against [`DockerApi`], a thin seam over the
//! `bollard` calls it needs, so it can be unit-tested without a live daemon.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;

use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecResults, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerSummary, ExecConfig, ExecInspectResponse,
    HostConfig, ImageSummary, Mount, MountBindOptions, MountBindOptionsPropagationEnum,
    MountTypeEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, CreateImageOptions,
    CreateImageOptionsBuilder, ListContainersOptions, ListContainersOptionsBuilder,
    ListImagesOptions, ListImagesOptionsBuilder, RemoveContainerOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions, StopContainerOptions,
    StopContainerOptionsBuilder,
};
use futures_util::{StreamExt, TryStreamExt};

use super::{
    ContainerDetails, ContainerEngine, ContainerIdentity, EngineFuture, ExecAttachment,
    ExecResult, ExecSpec, OutputChunk, TerminalGeometry, matches_name,
};
use crate::error::{ContainerError, RunboxError};
use crate::registry::RegistryCredential;

/// Seconds a container is given to stop before it is killed.
pub(super) const STOP_GRACE_SECS: i32 = 3;

/// Boxed future returned by [`DockerApi`] calls.
pub type DockerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BollardError>> + Send + 'a>>;

/// The `bollard` calls the Docker adapter depends on.
pub trait DockerApi: Send + Sync {
    /// List containers.
    fn list_containers(&self, options: ListContainersOptions)
    -> DockerFuture<'_, Vec<ContainerSummary>>;

    /// List local images.
    fn list_images(&self, options: ListImagesOptions) -> DockerFuture<'_, Vec<ImageSummary>>;

    /// Pull an image, draining the progress stream.
    fn create_image(
        &self,
        options: CreateImageOptions,
        credentials: Option<DockerCredentials>,
    ) -> DockerFuture<'_, ()>;

    /// Create a container.
    fn create_container(
        &self,
        options: CreateContainerOptions,
        body: ContainerCreateBody,
    ) -> DockerFuture<'_, ContainerCreateResponse>;

    /// Start a container.
    fn start_container(&self, id: &str) -> DockerFuture<'_, ()>;

    /// Stop a container.
    fn stop_container(&self, id: &str, options: StopContainerOptions) -> DockerFuture<'_, ()>;

    /// Remove a container.
    fn remove_container(&self, id: &str, options: RemoveContainerOptions)
    -> DockerFuture<'_, ()>;

    /// Create an exec session.
    fn create_exec(
        &self,
        container_id: &str,
        config: ExecConfig,
    ) -> DockerFuture<'_, CreateExecResults>;

    /// Start an exec session.
    fn start_exec(&self, exec_id: &str, options: StartExecOptions)
    -> DockerFuture<'_, StartExecResults>;

    /// Resize an exec pseudo-terminal.
    fn resize_exec(&self, exec_id: &str, options: ResizeExecOptions) -> DockerFuture<'_, ()>;

    /// Inspect an exec session.
    fn inspect_exec(&self, exec_id: &str) -> DockerFuture<'_, ExecInspectResponse>;
}

impl DockerApi for Docker {
    fn list_containers(
        &self,
        options: ListContainersOptions,
    ) -> DockerFuture<'_, Vec<ContainerSummary>> {
        Box::pin(async move { Self::list_containers(self, Some(options)).await })
    }

    fn list_images(&self, options: ListImagesOptions) -> DockerFuture<'_, Vec<ImageSummary>> {
        Box::pin(async move { Self::list_images(self, Some(options)).await })
    }

    fn create_image(
        &self,
        options: CreateImageOptions,
        credentials: Option<DockerCredentials>,
    ) -> DockerFuture<'_, ()> {
        Box::pin(async move {
            let mut progress =
                std::pin::pin!(Self::create_image(self, Some(options), None, credentials));
            while let Some(step) = progress.try_next().await? {
                if let Some(status) = step.status {
                    tracing::trace!(status = %status, "pull progress");
                }
            }
            Ok(())
        })
    }

    fn create_container(
        &self,
        options: CreateContainerOptions,
        body: ContainerCreateBody,
    ) -> DockerFuture<'_, ContainerCreateResponse> {
        Box::pin(async move { Self::create_container(self, Some(options), body).await })
    }

    fn start_container(&self, id: &str) -> DockerFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move {
            Self::start_container(self, &id_owned, None::<StartContainerOptions>).await
        })
    }

    fn stop_container(&self, id: &str, options: StopContainerOptions) -> DockerFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move { Self::stop_container(self, &id_owned, Some(options)).await })
    }

    fn remove_container(
        &self,
        id: &str,
        options: RemoveContainerOptions,
    ) -> DockerFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move { Self::remove_container(self, &id_owned, Some(options)).await })
    }

    fn create_exec(
        &self,
        container_id: &str,
        config: ExecConfig,
    ) -> DockerFuture<'_, CreateExecResults> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move { Self::create_exec(self, &container_id_owned, config).await })
    }

    fn start_exec(
        &self,
        exec_id: &str,
        options: StartExecOptions,
    ) -> DockerFuture<'_, StartExecResults> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::start_exec(self, &exec_id_owned, Some(options)).await })
    }

    fn resize_exec(&self, exec_id: &str, options: ResizeExecOptions) -> DockerFuture<'_, ()> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::resize_exec(self, &exec_id_owned, options).await })
    }

    fn inspect_exec(&self, exec_id: &str) -> DockerFuture<'_, ExecInspectResponse> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::inspect_exec(self, &exec_id_owned).await })
    }
}

/// [`ContainerEngine`] implementation for Docker.
#[derive(Debug, Clone)]
pub struct DockerEngine<C: DockerApi = Docker> {
    client: C,
}

impl<C: DockerApi> DockerEngine<C> {
    /// Wrap a connected client.
    #[must_use]
    pub const fn new(client: C) -> Self {
        Self { client }
    }

    /// Return the wrapped client.
    #[must_use]
    pub const fn client(&self) -> &C {
        &self.client
    }
}

/// Returns true when `error` is a server response with one of `statuses`.
fn has_status(error: &BollardError, statuses: &[u16]) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if statuses.contains(status_code)
    )
}

fn lookup_failed(target: String, error: &BollardError) -> RunboxError {
    RunboxError::from(ContainerError::LookupFailed {
        target,
        message: error.to_string(),
    })
}

fn exec_failed(container_id: &str, message: impl Into<String>) -> RunboxError {
    RunboxError::from(ContainerError::ExecFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}

fn name_filter(name: &str) -> ListContainersOptions {
    let filters = HashMap::from([("name", vec![name])]);
    ListContainersOptionsBuilder::new()
        .all(true)
        .filters(&filters)
        .build()
}

fn reference_filter(reference: &str) -> ListImagesOptions {
    let filters = HashMap::from([("reference", vec![reference])]);
    ListImagesOptionsBuilder::new().filters(&filters).build()
}

fn docker_credentials(credential: RegistryCredential) -> DockerCredentials {
    DockerCredentials {
        username: Some(credential.username),
        password: Some(credential.secret),
        serveraddress: Some(credential.hostname),
        ..DockerCredentials::default()
    }
}

/// Build the create payload for `details`.
pub(super) fn build_create_body(details: &ContainerDetails) -> ContainerCreateBody {
    let Some((source, target)) = details.mount() else {
        tracing::warn!(
            container = details.name(),
            "no mount source or target; creating container without a bind mount"
        );
        return ContainerCreateBody {
            image: Some(String::from(details.image())),
            ..ContainerCreateBody::default()
        };
    };

    let mount = Mount {
        target: Some(target.to_string()),
        source: Some(source.to_string()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(false),
        bind_options: Some(MountBindOptions {
            propagation: Some(MountBindOptionsPropagationEnum::PRIVATE),
            non_recursive: Some(true),
            ..MountBindOptions::default()
        }),
        ..Mount::default()
    };

    ContainerCreateBody {
        image: Some(String::from(details.image())),
        working_dir: Some(target.to_string()),
        host_config: Some(HostConfig {
            mounts: Some(vec![mount]),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

/// Build the exec-create payload for `spec`.
///
/// A TTY exec starts at the local terminal's size.
pub(super) fn build_exec_config(spec: &ExecSpec) -> ExecConfig {
    let env = spec.details.env_pairs();
    ExecConfig {
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(spec.tty),
        console_size: spec.tty.then(|| {
            vec![
                usize::from(spec.geometry.rows),
                usize::from(spec.geometry.columns),
            ]
        }),
        env: (!env.is_empty()).then_some(env),
        cmd: Some(spec.details.command().to_vec()),
        user: spec.details.user().map(String::from),
        working_dir: spec.details.working_dir().map(String::from),
        ..ExecConfig::default()
    }
}

fn output_chunk(result: Result<LogOutput, BollardError>) -> io::Result<OutputChunk> {
    match result.map_err(io::Error::other)? {
        LogOutput::StdErr { message } => Ok(OutputChunk::Stderr(message)),
        LogOutput::StdOut { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => Ok(OutputChunk::Stdout(message)),
    }
}

impl<C: DockerApi> ContainerEngine for DockerEngine<C> {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn find_container_by_name(&self, name: &str) -> EngineFuture<'_, Option<ContainerIdentity>> {
        let name_owned = String::from(name);
        Box::pin(async move {
            let summaries = self
                .client
                .list_containers(name_filter(&name_owned))
                .await
                .map_err(|e| lookup_failed(format!("container '{name_owned}'"), &e))?;
            Ok(summaries.into_iter().find_map(|summary| {
                let names = summary.names.unwrap_or_default();
                if matches_name(&names, &name_owned) {
                    summary
                        .id
                        .map(|id| ContainerIdentity::new(name_owned.clone(), id))
                } else {
                    None
                }
            }))
        })
    }

    fn find_image_id(&self, reference: &str) -> EngineFuture<'_, String> {
        let reference_owned = String::from(reference);
        Box::pin(async move {
            let images = self
                .client
                .list_images(reference_filter(&reference_owned))
                .await
                .map_err(|e| lookup_failed(format!("image '{reference_owned}'"), &e))?;
            Ok(images
                .into_iter()
                .map(|image| image.id)
                .find(|id| !id.is_empty())
                .unwrap_or_default())
        })
    }

    fn pull_image(
        &self,
        reference: &str,
        credential: Option<RegistryCredential>,
    ) -> EngineFuture<'_, String> {
        let reference_owned = String::from(reference);
        Box::pin(async move {
            let options = CreateImageOptionsBuilder::new()
                .from_image(&reference_owned)
                .build();
            self.client
                .create_image(options, credential.map(docker_credentials))
                .await
                .map_err(|e| {
                    RunboxError::from(ContainerError::PullFailed {
                        image: reference_owned.clone(),
                        message: e.to_string(),
                        credential_error: None,
                    })
                })?;
            self.find_image_id(&reference_owned).await
        })
    }

    fn create_container(
        &self,
        details: &ContainerDetails,
    ) -> EngineFuture<'_, Option<ContainerIdentity>> {
        let name = String::from(details.name());
        let options = CreateContainerOptionsBuilder::new().name(&name).build();
        let body = build_create_body(details);
        Box::pin(async move {
            let response = self
                .client
                .create_container(options, body)
                .await
                .map_err(|e| {
                    RunboxError::from(ContainerError::CreateFailed {
                        message: format!("container '{name}': {e}"),
                    })
                })?;
            for warning in &response.warnings {
                tracing::warn!(container = %name, warning = %warning, "engine warning on create");
            }
            Ok((!response.id.is_empty()).then(|| ContainerIdentity::new(name, response.id)))
        })
    }

    fn start_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move {
            self.client.start_container(&id_owned).await.map_err(|e| {
                RunboxError::from(ContainerError::StartFailed {
                    container_id: id_owned.clone(),
                    message: e.to_string(),
                })
            })
        })
    }

    fn delete_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move {
            let delete_failed = |step: &str, e: &BollardError| {
                RunboxError::from(ContainerError::DeleteFailed {
                    container_id: id_owned.clone(),
                    message: format!("{step}: {e}"),
                })
            };

            let stop = StopContainerOptionsBuilder::new().t(STOP_GRACE_SECS).build();
            if let Err(e) = self.client.stop_container(&id_owned, stop).await {
                if !has_status(&e, &[304, 404]) {
                    return Err(delete_failed("stop", &e));
                }
            }

            let remove = RemoveContainerOptionsBuilder::new().force(true).build();
            match self.client.remove_container(&id_owned, remove).await {
                Err(e) if !has_status(&e, &[404]) => Err(delete_failed("remove", &e)),
                _ => Ok(()),
            }
        })
    }

    fn create_exec(&self, spec: &ExecSpec) -> EngineFuture<'_, String> {
        let container_id = String::from(spec.details.container_id());
        let config = build_exec_config(spec);
        Box::pin(async move {
            let created = self
                .client
                .create_exec(&container_id, config)
                .await
                .map_err(|e| exec_failed(&container_id, format!("create exec failed: {e}")))?;
            Ok(created.id)
        })
    }

    fn start_exec(&self, exec_id: &str, tty: bool) -> EngineFuture<'_, ExecAttachment> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move {
            let options = StartExecOptions {
                detach: false,
                tty,
                output_capacity: None,
            };
            let started = self
                .client
                .start_exec(&exec_id_owned, options)
                .await
                .map_err(|e| exec_failed(&exec_id_owned, format!("start exec failed: {e}")))?;
            match started {
                StartExecResults::Attached { output, input } => Ok(ExecAttachment {
                    output: Box::pin(output.map(output_chunk)),
                    input,
                    multiplexed: !tty,
                }),
                StartExecResults::Detached => Err(exec_failed(
                    &exec_id_owned,
                    "daemon returned detached start result for attached exec",
                )),
            }
        })
    }

    fn resize_exec(&self, exec_id: &str, geometry: TerminalGeometry) -> EngineFuture<'_, ()> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move {
            let options = ResizeExecOptions {
                height: geometry.rows,
                width: geometry.columns,
            };
            self.client
                .resize_exec(&exec_id_owned, options)
                .await
                .map_err(|e| exec_failed(&exec_id_owned, format!("resize exec failed: {e}")))
        })
    }

    fn inspect_exec(&self, exec_id: &str) -> EngineFuture<'_, ExecResult> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move {
            let inspect = self
                .client
                .inspect_exec(&exec_id_owned)
                .await
                .map_err(|e| exec_failed(&exec_id_owned, format!("inspect exec failed: {e}")))?;
            Ok(ExecResult {
                exec_id: exec_id_owned,
                pid: inspect.pid,
                exit_code: inspect.exit_code,
                running: inspect.running.unwrap_or(false),
            })
        })
    }
}
