//! Turn connection failures into semantic `ContainerError` variants.
//!
//! Missing sockets and permission problems get their own variants so the
//! aggregated selection error says which candidate was absent and which was
//! merely unreadable.

use std::path::Path;

use crate::engine::podman::{PodmanEndpoint, PodmanError};
use crate::error::ContainerError;

/// Extract the filesystem path from a socket URI.
///
/// Strips the `unix://` or `npipe://` scheme. HTTP endpoints and bare paths
/// yield `None`.
pub(super) fn extract_socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

fn classify_io_error_kind(
    kind: std::io::ErrorKind,
    socket_path: Option<&Path>,
    error_msg: &str,
) -> ContainerError {
    let connection_failed = || ContainerError::ConnectionFailed {
        message: error_msg.to_owned(),
    };
    match kind {
        std::io::ErrorKind::PermissionDenied => socket_path.map_or_else(connection_failed, |path| {
            ContainerError::PermissionDenied {
                path: path.to_path_buf(),
            }
        }),
        std::io::ErrorKind::NotFound => socket_path.map_or_else(connection_failed, |path| {
            ContainerError::SocketNotFound {
                path: path.to_path_buf(),
            }
        }),
        _ => connection_failed(),
    }
}

/// Classify a `bollard` failure against the Docker endpoint `socket_uri`.
pub(super) fn classify_docker_error(
    bollard_error: &bollard::errors::Error,
    socket_uri: &str,
) -> ContainerError {
    let socket_path = extract_socket_path(socket_uri);
    let error_msg = bollard_error.to_string();

    match bollard_error {
        bollard::errors::Error::SocketNotFoundError(_) => {
            if let Some(path) = socket_path {
                return ContainerError::SocketNotFound {
                    path: path.to_path_buf(),
                };
            }
        }
        bollard::errors::Error::IOError { err } => {
            let kind = io_error_kind_in_chain(err).unwrap_or_else(|| err.kind());
            return classify_io_error_kind(kind, socket_path, &error_msg);
        }
        _ => {}
    }

    if let Some(kind) = io_error_kind_in_chain(bollard_error) {
        return classify_io_error_kind(kind, socket_path, &error_msg);
    }

    ContainerError::ConnectionFailed { message: error_msg }
}

/// Classify a libpod client failure against `endpoint`.
pub(super) fn classify_podman_error(error: &PodmanError, endpoint: &PodmanEndpoint) -> ContainerError {
    match error {
        PodmanError::Connect { kind, message } => {
            let socket_path = match endpoint {
                PodmanEndpoint::Unix(path) => Some(path.as_path()),
                PodmanEndpoint::NamedPipe(name) => Some(Path::new(name)),
                PodmanEndpoint::Tcp(_) => None,
            };
            classify_io_error_kind(*kind, socket_path, message)
        }
        PodmanError::Transport(_) | PodmanError::Status { .. } | PodmanError::Decode(_) => {
            ContainerError::HealthCheckFailed {
                message: error.to_string(),
            }
        }
    }
}

/// Walk the error source chain looking for an `io::Error` kind.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<std::io::ErrorKind> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        current = err.source();
    }
    None
}
