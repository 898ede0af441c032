//! Well-known places a Podman service listens.

use std::path::{Path, PathBuf};

use cap_std::ambient_authority;
use cap_std::fs::Dir;

use crate::engine::podman::PodmanEndpoint;

const SOCKET_NAME: &str = "podman.sock";

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|found| !found.trim().is_empty())
}

/// Resolve the XDG data home, falling back to `~/.local/share`.
fn data_home<E: mockable::Env>(env: &E) -> Option<PathBuf> {
    non_empty(env.string("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .or_else(|| non_empty(env.string("HOME")).map(|home| Path::new(&home).join(".local/share")))
        .or_else(dirs::data_dir)
}

/// Sockets of every Podman machine under `machine_dir`, sorted by machine name.
fn machine_sockets(machine_dir: &Path) -> Vec<PathBuf> {
    let Ok(root) = Dir::open_ambient_dir(machine_dir, ambient_authority()) else {
        return Vec::new();
    };
    let Ok(entries) = root.entries() else {
        return Vec::new();
    };
    let mut machines: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| root.exists(Path::new(name).join(SOCKET_NAME)))
        .collect();
    machines.sort();
    machines
        .into_iter()
        .map(|name| machine_dir.join(name).join(SOCKET_NAME))
        .collect()
}

#[cfg(windows)]
fn podman_pipes() -> Vec<PodmanEndpoint> {
    let Ok(entries) = std::fs::read_dir(r"\\.\pipe\") else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with("podman-"))
        .collect();
    names.sort();
    names
        .into_iter()
        .map(|name| PodmanEndpoint::NamedPipe(format!(r"\\.\pipe\{name}")))
        .collect()
}

/// List candidate Podman endpoints in the order they should be tried.
///
/// Duplicates (for example `$XDG_RUNTIME_DIR` pointing at `/run/user/<uid>`)
/// are dropped, keeping the first occurrence.
pub(super) fn podman_candidates<E: mockable::Env>(env: &E) -> Vec<PodmanEndpoint> {
    let mut paths = Vec::new();
    if let Some(runtime_dir) = non_empty(env.string("XDG_RUNTIME_DIR")) {
        paths.push(Path::new(&runtime_dir).join("podman").join(SOCKET_NAME));
    }
    #[cfg(unix)]
    paths.push(PathBuf::from(format!(
        "/run/user/{}/podman/{SOCKET_NAME}",
        nix::unistd::getuid()
    )));
    if let Some(data_dir) = data_home(env) {
        let machine_dir = data_dir.join("containers").join("podman").join("machine");
        paths.extend(machine_sockets(&machine_dir));
        paths.push(machine_dir.join(SOCKET_NAME));
    }
    #[cfg(unix)]
    paths.push(PathBuf::from("/run/podman").join(SOCKET_NAME));

    let mut endpoints: Vec<PodmanEndpoint> = Vec::with_capacity(paths.len());
    for path in paths {
        let endpoint = PodmanEndpoint::Unix(path);
        if !endpoints.contains(&endpoint) {
            endpoints.push(endpoint);
        }
    }
    #[cfg(windows)]
    endpoints.extend(podman_pipes());
    endpoints
}
