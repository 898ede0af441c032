//! Configuration data types for runbox.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Default prefix prepended to generated container names.
pub const DEFAULT_CONTAINER_PREFIX: &str = "runbox";

/// Default minimum Podman API version applied before engine selection.
pub const DEFAULT_PODMAN_API_VERSION: &str = "4.0.0";

/// Container layout and identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct ContainerConfig {
    /// Directory inside the container where the host project is mounted.
    #[default(Utf8PathBuf::from("/work"))]
    pub mount_path: Utf8PathBuf,

    /// Numeric user ID the container user namespace maps the host user to.
    pub uid: Option<u32>,

    /// Numeric group ID the container user namespace maps the host group to.
    pub gid: Option<u32>,

    /// User name for ordinary exec sessions.
    pub user: Option<String>,

    /// User name for `--root` shells.
    #[default(Some(String::from("root")))]
    pub admin_user: Option<String>,
}

/// Commands executed inside the container.
#[derive(Debug, Clone, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct CommandConfig {
    /// The main command; trailing CLI arguments are appended to it.
    pub main: Vec<String>,

    /// The interactive shell started by `--shell` and `--root`.
    #[default(vec![String::from("/bin/bash"), String::from("-l")])]
    pub shell: Vec<String>,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `RUNBOX_CONFIG_PATH` environment variable
/// 2. `.runbox.toml` in the current working directory
/// 3. `.runbox.toml` in the home directory
/// 4. `~/.config/runbox/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "RUNBOX",
    post_merge_hook,
    discovery(
        app_name = "runbox",
        env_var = "RUNBOX_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".runbox.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Explicit Podman endpoint; skips Docker probing when set.
    pub engine_socket: Option<String>,

    /// The container image to run.
    pub image: Option<String>,

    /// Prefix for generated container names.
    #[ortho_config(skip_cli)]
    pub container_prefix: Option<String>,

    /// Minimum Podman API version requested from the server.
    #[ortho_config(skip_cli)]
    pub podman_api_version: Option<String>,

    /// Container layout configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub container: ContainerConfig,

    /// Command configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub command: CommandConfig,

    /// Environment variables passed to every exec session.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub env: BTreeMap<String, String>,
}

impl AppConfig {
    /// Returns the configured container name prefix or the default.
    #[must_use]
    pub fn container_prefix(&self) -> &str {
        self.container_prefix
            .as_deref()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(DEFAULT_CONTAINER_PREFIX)
    }

    /// Returns the configured minimum Podman API version or the default.
    #[must_use]
    pub fn podman_api_version(&self) -> &str {
        self.podman_api_version
            .as_deref()
            .filter(|version| !version.is_empty())
            .unwrap_or(DEFAULT_PODMAN_API_VERSION)
    }

    /// Returns the image reference, failing when none is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `image` is unset or blank.
    pub fn require_image(&self) -> crate::error::Result<&str> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .ok_or_else(|| {
                crate::error::ConfigError::MissingRequired {
                    field: String::from("image"),
                }
                .into()
            })
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        if self
            .engine_socket
            .as_deref()
            .is_some_and(|socket| socket.trim().is_empty())
        {
            self.engine_socket = None;
        }
        Ok(())
    }
}
