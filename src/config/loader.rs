//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! The layers are composed by hand with `MergeComposer` rather than through the
//! derived `load()`: the `Cli` struct owns argument parsing (including the
//! trailing command arguments), and typed environment values must fail loudly
//! instead of being silently dropped.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g., `RUNBOX_CONTAINER_UID=me`
//! instead of a number) return an error immediately. String fields such as
//! `RUNBOX_ENGINE_SOCKET` are always accepted. Command fields such as
//! `RUNBOX_COMMAND_MAIN` are split on whitespace.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 32-bit integer. Invalid values return an error.
    U32,
    /// Whitespace-separated words, stored as a list.
    Words,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `RUNBOX_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["container", "uid"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "RUNBOX_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_IMAGE",
        path: &["image"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_CONTAINER_PREFIX",
        path: &["container_prefix"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_PODMAN_API_VERSION",
        path: &["podman_api_version"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_CONTAINER_MOUNT_PATH",
        path: &["container", "mount_path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_CONTAINER_UID",
        path: &["container", "uid"],
        var_type: EnvVarType::U32,
    },
    EnvVarSpec {
        env_var: "RUNBOX_CONTAINER_GID",
        path: &["container", "gid"],
        var_type: EnvVarType::U32,
    },
    EnvVarSpec {
        env_var: "RUNBOX_CONTAINER_USER",
        path: &["container", "user"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_CONTAINER_ADMIN_USER",
        path: &["container", "admin_user"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "RUNBOX_COMMAND_MAIN",
        path: &["command", "main"],
        var_type: EnvVarType::Words,
    },
    EnvVarSpec {
        env_var: "RUNBOX_COMMAND_SHELL",
        path: &["command", "shell"],
        var_type: EnvVarType::Words,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `RUNBOX_*` variable without keeping a second
/// list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

fn discover_config_path(cli: &Cli) -> Option<Utf8PathBuf> {
    cli.config.clone().filter(|p| p.exists()).or_else(|| {
        let discovery = ConfigDiscovery::builder("runbox")
            .env_var("RUNBOX_CONFIG_PATH")
            .config_file_name("config.toml")
            .dotfile_name(".runbox.toml")
            .build();
        discovery
            .candidates()
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| Utf8PathBuf::try_from(p).ok())
    })
}

/// Load configuration with full layer precedence.
///
/// Sources, lowest precedence first:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (`--config`, `RUNBOX_CONFIG_PATH`, or discovery)
/// 3. Environment variables prefixed with `RUNBOX_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// # Errors
///
/// Returns `ConfigError` if a configuration file is malformed, a typed
/// environment variable cannot be parsed, or the merged layers do not
/// deserialize into `AppConfig`.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(ref path) = discover_config_path(cli) {
        load_config_file(path, &mut composer)?;
    }

    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;

    Ok(config)
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let value = match spec.var_type {
        EnvVarType::String => Value::String(raw_value),
        EnvVarType::U32 => match raw_value.trim().parse::<u32>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => {
                return Err(ConfigError::InvalidValue {
                    field: spec.env_var.to_owned(),
                    reason: format!("expected unsigned integer, got '{raw_value}'"),
                }
                .into());
            }
        },
        EnvVarType::Words => Value::Array(
            raw_value
                .split_whitespace()
                .map(|word| Value::String(word.to_owned()))
                .collect(),
        ),
    };
    Ok(value)
}

/// Collect `RUNBOX_*` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable has an
/// unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };
        let json_value = parse_env_value(spec, raw_value)?;
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map, creating parent objects.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref socket) = cli.engine_socket {
        overrides.insert("engine_socket".to_owned(), Value::String(socket.clone()));
    }

    if let Some(ref image) = cli.image {
        overrides.insert("image".to_owned(), Value::String(image.clone()));
    }

    if let Some(ref path) = cli.path {
        let mut env = Map::new();
        env.insert("PATH".to_owned(), Value::String(path.clone()));
        overrides.insert("env".to_owned(), Value::Object(env));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
