//! Podman adapter speaking the native libpod REST API.
//!
//! Unlike the Docker compatibility layer, libpod lets a container's user
//! namespace be mapped onto the invoking user (`keep-id`), and it needs an
//! explicit `init` between create and start.

mod client;
mod demux;
mod endpoint;
mod models;
mod progress;

use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use futures_util::{StreamExt, TryStreamExt};
use hyper::Method;
use hyper::header::HeaderName;
use tokio_util::codec::{BytesCodec, FramedRead};
use url::form_urlencoded;

pub use self::client::{PodmanClient, PodmanError};
use self::demux::ExecFrameDecoder;
pub use self::endpoint::PodmanEndpoint;
use self::models::{
    CreateResponse, ExecCreateConfig, ExecCreateResponse, ExecInspect, ExecStartConfig,
    ListedContainer, ListedImage, Namespace, RegistryAuth, SpecGenerator, SpecMount,
};
use self::progress::PullProgress;
use super::{
    ContainerDetails, ContainerEngine, ContainerIdentity, EngineFuture, ExecAttachment,
    ExecResult, ExecSpec, OutputChunk, OutputStream, TerminalGeometry, matches_name,
};
use crate::config::DEFAULT_PODMAN_API_VERSION;
use crate::error::{ContainerError, RunboxError};
use crate::registry::RegistryCredential;

/// Seconds a container is given to stop before it is killed.
const STOP_GRACE_SECS: u32 = 3;

static MINIMUM_API_VERSION: OnceLock<String> = OnceLock::new();

/// Fix the libpod API version used by every Podman client in this process.
///
/// Only the first call has an effect; the version in force is returned.
#[must_use]
pub fn apply_minimum_api_version(version: &str) -> &'static str {
    MINIMUM_API_VERSION.get_or_init(|| {
        let trimmed = version.trim().trim_start_matches('v');
        if trimmed.is_empty() {
            String::from(DEFAULT_PODMAN_API_VERSION)
        } else {
            trimmed.to_owned()
        }
    })
}

/// Return the libpod API version in force for this process.
#[must_use]
pub fn minimum_api_version() -> &'static str {
    MINIMUM_API_VERSION
        .get()
        .map_or(DEFAULT_PODMAN_API_VERSION, String::as_str)
}

/// [`ContainerEngine`] implementation for Podman.
#[derive(Debug, Clone)]
pub struct PodmanEngine {
    client: PodmanClient,
}

impl PodmanEngine {
    /// Wrap a client.
    #[must_use]
    pub const fn new(client: PodmanClient) -> Self {
        Self { client }
    }

    /// Return the wrapped client.
    #[must_use]
    pub const fn client(&self) -> &PodmanClient {
        &self.client
    }
}

fn query(pairs: &[(&str, &str)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn filters(key: &str, value: &str) -> String {
    serde_json::json!({ key: [value] }).to_string()
}

fn lookup_failed(target: String, error: &PodmanError) -> RunboxError {
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

/// Encode `credential` for the `X-Registry-Auth` header.
fn registry_auth_header(credential: &RegistryCredential) -> Result<String, PodmanError> {
    let auth = RegistryAuth {
        username: &credential.username,
        password: &credential.secret,
        serveraddress: &credential.hostname,
    };
    let encoded = serde_json::to_vec(&auth).map_err(|e| PodmanError::Decode(e.to_string()))?;
    Ok(URL_SAFE.encode(encoded))
}

/// Build the create payload for `details`.
fn build_spec_generator(details: &ContainerDetails) -> SpecGenerator {
    let userns = details.user().map(|user| Namespace {
        nsmode: String::from("keep-id"),
        value: format!("uid={},gid={}", user.uid, user.gid),
    });

    let Some((source, target)) = details.mount() else {
        tracing::warn!(
            container = details.name(),
            "no mount source or target; creating container without a bind mount"
        );
        return SpecGenerator {
            name: String::from(details.name()),
            image: String::from(details.image()),
            userns,
            work_dir: None,
            mounts: Vec::new(),
        };
    };

    SpecGenerator {
        name: String::from(details.name()),
        image: String::from(details.image()),
        userns,
        work_dir: Some(target.to_string()),
        mounts: vec![SpecMount {
            destination: target.to_string(),
            source: source.to_string(),
            kind: String::from("bind"),
            options: vec![
                String::from("bind"),
                String::from("rw"),
                String::from("private"),
            ],
        }],
    }
}

/// Build the exec-create payload for `spec`.
///
/// Stderr is only attached separately without a TTY; with one, the engine
/// writes everything to the terminal stream.
fn build_exec_config(spec: &ExecSpec) -> ExecCreateConfig {
    ExecCreateConfig {
        attach_stdin: true,
        attach_stdout: true,
        attach_stderr: !spec.tty,
        tty: spec.tty,
        cmd: spec.details.command().to_vec(),
        env: spec.details.env_pairs(),
        user: spec.details.user().map(String::from),
        working_dir: spec.details.working_dir().map(String::from),
        console_size: [spec.geometry.rows, spec.geometry.columns],
    }
}

impl ContainerEngine for PodmanEngine {
    fn name(&self) -> &'static str {
        "podman"
    }

    fn find_container_by_name(&self, name: &str) -> EngineFuture<'_, Option<ContainerIdentity>> {
        let name_owned = String::from(name);
        Box::pin(async move {
            let name_filter = filters("name", &name_owned);
            let path = format!(
                "containers/json?{}",
                query(&[("all", "true"), ("filters", name_filter.as_str())])
            );
            let listed: Vec<ListedContainer> = self
                .client
                .get_json(&path)
                .await
                .map_err(|e| lookup_failed(format!("container '{name_owned}'"), &e))?;
            Ok(listed.into_iter().find_map(|container| {
                tracing::trace!(id = %container.id, names = ?container.names, "checking container");
                (matches_name(&container.names, &name_owned) && !container.id.is_empty())
                    .then(|| ContainerIdentity::new(name_owned.clone(), container.id))
            }))
        })
    }

    fn find_image_id(&self, reference: &str) -> EngineFuture<'_, String> {
        let reference_owned = String::from(reference);
        Box::pin(async move {
            let reference_filter = filters("reference", &reference_owned);
            let path = format!(
                "images/json?{}",
                query(&[("filters", reference_filter.as_str())])
            );
            let images: Vec<ListedImage> = self
                .client
                .get_json(&path)
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
            let pull_failed = |message: String| {
                RunboxError::from(ContainerError::PullFailed {
                    image: reference_owned.clone(),
                    message,
                    credential_error: None,
                })
            };

            let mut headers = Vec::new();
            if let Some(found) = credential.as_ref() {
                let encoded = registry_auth_header(found).map_err(|e| pull_failed(e.to_string()))?;
                headers.push((HeaderName::from_static("x-registry-auth"), encoded));
            }
            let path = format!("images/pull?{}", query(&[("reference", reference_owned.as_str())]));
            let body = self
                .client
                .call_streaming(Method::POST, &path, &headers)
                .await
                .map_err(|e| pull_failed(e.to_string()))?;
            let mut frames = std::pin::pin!(body);
            let mut progress = PullProgress::default();
            while let Some(received) = frames.next().await {
                let frame = received.map_err(|e| pull_failed(format!("transport error: {e}")))?;
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                if let Some(message) = progress.feed(&data) {
                    return Err(pull_failed(message));
                }
            }
            if let Some(message) = progress.finish() {
                return Err(pull_failed(message));
            }
            self.find_image_id(&reference_owned).await
        })
    }

    fn create_container(
        &self,
        details: &ContainerDetails,
    ) -> EngineFuture<'_, Option<ContainerIdentity>> {
        let name = String::from(details.name());
        let spec = build_spec_generator(details);
        Box::pin(async move {
            let create_failed = |step: &str, e: &PodmanError| {
                RunboxError::from(ContainerError::CreateFailed {
                    message: format!("{step} container '{name}': {e}"),
                })
            };

            let response: CreateResponse = self
                .client
                .post_json("containers/create", &spec)
                .await
                .map_err(|e| create_failed("creating", &e))?;
            for warning in &response.warnings {
                tracing::warn!(container = %name, warning = %warning, "engine warning on create");
            }
            if response.id.is_empty() {
                return Ok(None);
            }

            let init_path = format!("containers/{}/init", response.id);
            self.client
                .call(Method::POST, &init_path, None, &[], &[304])
                .await
                .map_err(|e| create_failed("initializing", &e))?;
            Ok(Some(ContainerIdentity::new(name, response.id)))
        })
    }

    fn start_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move {
            let path = format!("containers/{id_owned}/start");
            self.client
                .call(Method::POST, &path, None, &[], &[304])
                .await
                .map_err(|e| {
                    RunboxError::from(ContainerError::StartFailed {
                        container_id: id_owned.clone(),
                        message: e.to_string(),
                    })
                })?;
            Ok(())
        })
    }

    fn delete_container(&self, id: &str) -> EngineFuture<'_, ()> {
        let id_owned = String::from(id);
        Box::pin(async move {
            let delete_failed = |step: &str, e: &PodmanError| {
                RunboxError::from(ContainerError::DeleteFailed {
                    container_id: id_owned.clone(),
                    message: format!("{step}: {e}"),
                })
            };
            let grace = STOP_GRACE_SECS.to_string();

            let stop_path = format!(
                "containers/{id_owned}/stop?{}",
                query(&[("timeout", grace.as_str()), ("ignore", "true")])
            );
            self.client
                .call(Method::POST, &stop_path, None, &[], &[304, 404])
                .await
                .map_err(|e| delete_failed("stop", &e))?;

            let remove_path = format!(
                "containers/{id_owned}?{}",
                query(&[
                    ("force", "true"),
                    ("timeout", grace.as_str()),
                    ("ignore", "true"),
                ])
            );
            self.client
                .call(Method::DELETE, &remove_path, None, &[], &[404])
                .await
                .map_err(|e| delete_failed("remove", &e))?;
            Ok(())
        })
    }

    fn create_exec(&self, spec: &ExecSpec) -> EngineFuture<'_, String> {
        let container_id = String::from(spec.details.container_id());
        let config = build_exec_config(spec);
        Box::pin(async move {
            let path = format!("containers/{container_id}/exec");
            let created: ExecCreateResponse = self
                .client
                .post_json(&path, &config)
                .await
                .map_err(|e| exec_failed(&container_id, format!("create exec failed: {e}")))?;
            Ok(created.id)
        })
    }

    fn start_exec(&self, exec_id: &str, tty: bool) -> EngineFuture<'_, ExecAttachment> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move {
            let start = ExecStartConfig {
                detach: false,
                tty,
                h: 0,
                w: 0,
            };
            let path = format!("exec/{exec_id_owned}/start");
            let stream = self
                .client
                .upgrade(&path, &start)
                .await
                .map_err(|e| exec_failed(&exec_id_owned, format!("start exec failed: {e}")))?;
            let (reader, writer) = tokio::io::split(stream);

            let output: OutputStream = if tty {
                Box::pin(
                    FramedRead::new(reader, BytesCodec::new())
                        .map_ok(|bytes| OutputChunk::Stdout(bytes.freeze())),
                )
            } else {
                Box::pin(FramedRead::new(reader, ExecFrameDecoder))
            };
            Ok(ExecAttachment {
                output,
                input: Box::pin(writer),
                multiplexed: !tty,
            })
        })
    }

    fn resize_exec(&self, exec_id: &str, geometry: TerminalGeometry) -> EngineFuture<'_, ()> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move {
            let rows = geometry.rows.to_string();
            let columns = geometry.columns.to_string();
            let path = format!(
                "exec/{exec_id_owned}/resize?{}",
                query(&[("h", rows.as_str()), ("w", columns.as_str())])
            );
            self.client
                .call(Method::POST, &path, None, &[], &[])
                .await
                .map_err(|e| exec_failed(&exec_id_owned, format!("resize exec failed: {e}")))?;
            Ok(())
        })
    }

    fn inspect_exec(&self, exec_id: &str) -> EngineFuture<'_, ExecResult> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move {
            let path = format!("exec/{exec_id_owned}/json");
            let inspect: ExecInspect = self
                .client
                .get_json(&path)
                .await
                .map_err(|e| exec_failed(&exec_id_owned, format!("inspect exec failed: {e}")))?;
            Ok(ExecResult {
                exec_id: if inspect.id.is_empty() {
                    exec_id_owned
                } else {
                    inspect.id
                },
                pid: inspect.pid,
                exit_code: inspect.exit_code,
                running: inspect.running,
            })
        })
    }
}
