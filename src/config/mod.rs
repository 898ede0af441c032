//! Configuration system for runbox.
//!
//! This module provides the configuration structures and CLI definitions for the
//! runbox application. Configuration loading and precedence merging is handled by
//! the `ortho_config` crate: CLI flags override environment variables, which
//! override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/runbox/config.toml` by default.
//!
//! # Example Configuration
//!
//! ```toml
//! image = "registry.example.com/toolbox:latest"
//! container_prefix = "temper"
//!
//! [container]
//! mount_path = "/work"
//! uid = 1000
//! gid = 1000
//! user = "dev"
//! admin_user = "root"
//!
//! [command]
//! main = ["temper"]
//! shell = ["/bin/bash", "-l"]
//!
//! [env]
//! TERM = "xterm-256color"
//! ```

mod cli;
mod loader;
mod types;


pub use cli::Cli;
pub use loader::{env_var_names, load_config};
pub use types::{
    AppConfig, CommandConfig, ContainerConfig, DEFAULT_CONTAINER_PREFIX,
    DEFAULT_PODMAN_API_VERSION,
};
