//! Shared fixtures and helper functions for config tests.

use crate::config::AppConfig;
use ortho_config::MergeComposer;
use rstest::fixture;
use std::sync::Arc;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/podman/podman.sock"
        image = "registry.example.com/toolbox:latest"
        container_prefix = "temper"
        podman_api_version = "4.4.0"

        [container]
        mount_path = "/workspace"
        uid = 1000
        gid = 100
        user = "dev"
        admin_user = "admin"

        [command]
        main = ["temper"]
        shell = ["/bin/zsh"]

        [env]
        TERM = "xterm-256color"
        LANG = "C.UTF-8"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(
        config.engine_socket.is_none(),
        "engine_socket should be None"
    );
    assert!(config.image.is_none(), "image should be None");
    assert_eq!(config.container_prefix(), "runbox");
    assert_eq!(config.podman_api_version(), "4.0.0");
    assert_eq!(config.container.mount_path.as_str(), "/work");
    assert_eq!(config.container.admin_user.as_deref(), Some("root"));
    assert!(config.command.main.is_empty(), "command.main should be empty");
    assert_eq!(config.command.shell, vec!["/bin/bash", "-l"]);
    assert!(config.env.is_empty(), "env should be empty");
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "engine_socket": "unix:///from/file.sock",
            "image": "file-image:latest"
        }),
        None,
    );

    composer.push_environment(json!({
        "engine_socket": "unix:///from/env.sock"
    }));

    Ok(composer)
}
