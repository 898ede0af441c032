//! Decide which container engine to talk to.
//!
//! The selector resolves a target from configuration and the environment,
//! then tries candidates in order until one answers. Every rejected candidate
//! is recorded so a total failure can say what was tried.

mod candidates;
mod classify;

use std::future::Future;
use std::time::Duration;

use bollard::Docker;

use self::candidates::podman_candidates;
use self::classify::{classify_docker_error, classify_podman_error};
use super::podman::{PodmanClient, PodmanEndpoint, PodmanEngine, apply_minimum_api_version};
use super::{DockerEngine, EngineSession};
use crate::config::DEFAULT_PODMAN_API_VERSION;
use crate::error::{ContainerError, RunboxError, SelectionAttempt};

/// Environment variable naming an explicit Podman endpoint.
const CONTAINER_HOST_VAR: &str = "CONTAINER_HOST";

/// Environment variable naming the ambient Docker endpoint.
const DOCKER_HOST_VAR: &str = "DOCKER_HOST";

/// Connection timeout in seconds for Docker API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for each probe.
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Docker endpoint used when `DOCKER_HOST` is unset.
#[cfg(unix)]
const DEFAULT_DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";

/// Docker endpoint used when `DOCKER_HOST` is unset.
#[cfg(windows)]
const DEFAULT_DOCKER_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Component-name marker of Podman's Docker compatibility service.
const PODMAN_COMPONENT_MARKER: &str = "Podman";

/// Where the selector looks for an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineTarget {
    /// A Podman endpoint named by configuration or `CONTAINER_HOST`.
    Explicit(String),
    /// Probe the ambient Docker endpoint, then the well-known Podman sockets.
    Discover,
}

/// Outcome of probing the ambient Docker endpoint.
enum DockerProbe {
    Docker(Docker),
    PodmanShim,
}

/// Chooses the engine for this invocation.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use runbox::engine::BackendSelector;
///
/// let env = DefaultEnv::new();
/// let session = BackendSelector::new(&env).select().await?;
/// ```
pub struct BackendSelector<'a, E: mockable::Env> {
    env: &'a E,
    configured_socket: Option<String>,
    api_version: String,
    candidates: Option<Vec<PodmanEndpoint>>,
}

impl<'a, E: mockable::Env> BackendSelector<'a, E> {
    /// Create a selector reading the environment through `env`.
    #[must_use]
    pub fn new(env: &'a E) -> Self {
        Self {
            env,
            configured_socket: None,
            api_version: String::from(DEFAULT_PODMAN_API_VERSION),
            candidates: None,
        }
    }

    /// Use `socket` as an explicit Podman endpoint when it is non-empty.
    #[must_use]
    pub fn with_configured_socket(mut self, socket: Option<&str>) -> Self {
        self.configured_socket = socket
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(String::from);
        self
    }

    /// Request `version` as the process-wide libpod API version.
    #[must_use]
    pub fn with_api_version(mut self, version: &str) -> Self {
        self.api_version = String::from(version);
        self
    }

    /// Replace the platform's well-known Podman sockets with `candidates`.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<PodmanEndpoint>) -> Self {
        self.candidates = Some(candidates);
        self
    }

    /// Resolve the target: configured socket, then `CONTAINER_HOST`.
    #[must_use]
    pub fn target(&self) -> EngineTarget {
        self.configured_socket
            .clone()
            .or_else(|| {
                self.env
                    .string(CONTAINER_HOST_VAR)
                    .filter(|value| !value.trim().is_empty())
            })
            .map_or(EngineTarget::Discover, EngineTarget::Explicit)
    }

    /// Return the ambient Docker endpoint: `DOCKER_HOST` or the platform default.
    #[must_use]
    pub fn ambient_docker_uri(&self) -> String {
        self.env
            .string(DOCKER_HOST_VAR)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_DOCKER_SOCKET))
    }

    fn podman_candidates(&self) -> Vec<PodmanEndpoint> {
        self.candidates
            .clone()
            .unwrap_or_else(|| podman_candidates(self.env))
    }

    /// Select an engine; the first candidate that answers wins.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::EngineUnavailable` listing every attempt when
    /// no engine answers. An explicit target is the only attempt made.
    pub async fn select(&self) -> Result<EngineSession, RunboxError> {
        let api_version = apply_minimum_api_version(&self.api_version);
        tracing::debug!(api_version, "libpod API version in force");

        if let EngineTarget::Explicit(uri) = self.target() {
            tracing::debug!(endpoint = %uri, "using explicit podman endpoint");
            return connect_podman(&uri, api_version)
                .await
                .map(EngineSession::Podman)
                .map_err(|error| {
                    unavailable(vec![SelectionAttempt::new(
                        format!("podman at {uri}"),
                        error.to_string(),
                    )])
                });
        }

        let mut attempts = Vec::new();
        let docker_uri = self.ambient_docker_uri();
        match probe_docker(&docker_uri).await {
            Ok(DockerProbe::Docker(docker)) => {
                tracing::debug!(endpoint = %docker_uri, "selected docker");
                return Ok(EngineSession::Docker(DockerEngine::new(docker)));
            }
            Ok(DockerProbe::PodmanShim) => {
                tracing::debug!(
                    endpoint = %docker_uri,
                    "docker endpoint is served by podman; switching to the native API"
                );
                match connect_podman(&docker_uri, api_version).await {
                    Ok(engine) => return Ok(EngineSession::Podman(engine)),
                    Err(error) => attempts.push(SelectionAttempt::new(
                        format!("podman at {docker_uri}"),
                        error.to_string(),
                    )),
                }
            }
            Err(error) => attempts.push(SelectionAttempt::new(
                format!("docker at {docker_uri}"),
                error.to_string(),
            )),
        }

        for endpoint in self.podman_candidates() {
            match ping_podman(endpoint.clone(), api_version).await {
                Ok(engine) => {
                    tracing::debug!(endpoint = %endpoint, "selected podman");
                    return Ok(EngineSession::Podman(engine));
                }
                Err(error) => {
                    tracing::debug!(endpoint = %endpoint, error = %error, "podman candidate rejected");
                    attempts.push(SelectionAttempt::new(
                        format!("podman at {endpoint}"),
                        error.to_string(),
                    ));
                }
            }
        }

        Err(unavailable(attempts))
    }
}

fn unavailable(attempts: Vec<SelectionAttempt>) -> RunboxError {
    RunboxError::from(ContainerError::EngineUnavailable { attempts })
}

/// Returns true when any version component names Podman.
fn is_podman_shim<'n>(component_names: impl IntoIterator<Item = &'n str>) -> bool {
    component_names
        .into_iter()
        .any(|name| name.contains(PODMAN_COMPONENT_MARKER))
}

async fn within_timeout<T>(
    probe: impl Future<Output = Result<T, ContainerError>>,
) -> Result<T, ContainerError> {
    tokio::time::timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS), probe)
        .await
        .map_err(|_| ContainerError::HealthCheckTimeout {
            seconds: HEALTH_CHECK_TIMEOUT_SECS,
        })?
}

async fn connect_podman(uri: &str, api_version: &str) -> Result<PodmanEngine, ContainerError> {
    ping_podman(PodmanEndpoint::parse(uri)?, api_version).await
}

async fn ping_podman(
    endpoint: PodmanEndpoint,
    api_version: &str,
) -> Result<PodmanEngine, ContainerError> {
    let client = PodmanClient::new(endpoint, api_version);
    within_timeout(async {
        client
            .ping()
            .await
            .map_err(|error| classify_podman_error(&error, client.endpoint()))
    })
    .await?;
    Ok(PodmanEngine::new(client))
}

async fn probe_docker(uri: &str) -> Result<DockerProbe, ContainerError> {
    let docker = connect_docker(uri)?;
    within_timeout(async {
        let negotiated = docker
            .negotiate_version()
            .await
            .map_err(|error| classify_docker_error(&error, uri))?;
        let version = negotiated
            .version()
            .await
            .map_err(|error| classify_docker_error(&error, uri))?;
        let component_names = version
            .components
            .iter()
            .flatten()
            .map(|component| component.name.as_str());
        if is_podman_shim(component_names) {
            Ok(DockerProbe::PodmanShim)
        } else {
            Ok(DockerProbe::Docker(negotiated))
        }
    })
    .await
}

/// Build a Docker client for `uri` without contacting it.
///
/// `tcp://` is rewritten to `http://`; bare paths starting with `\\` or `//`
/// are named pipes and other bare paths are Unix sockets.
fn connect_docker(uri: &str) -> Result<Docker, ContainerError> {
    let connected = if uri.starts_with("unix://") || uri.starts_with("npipe://") {
        Docker::connect_with_socket(uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    } else if let Some(address) = uri.strip_prefix("tcp://") {
        Docker::connect_with_http(
            &format!("http://{address}"),
            CONNECTION_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
    } else if uri.starts_with("http://") || uri.starts_with("https://") {
        Docker::connect_with_http(uri, CONNECTION_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
    } else if uri.starts_with("\\\\") || uri.starts_with("//") {
        Docker::connect_with_socket(
            &format!("npipe://{uri}"),
            CONNECTION_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
    } else if uri.contains("://") {
        return Err(ContainerError::UnsupportedEndpoint {
            endpoint: String::from(uri),
        });
    } else {
        Docker::connect_with_socket(
            &format!("unix://{uri}"),
            CONNECTION_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
    };
    connected.map_err(|error| classify_docker_error(&error, uri))
}
