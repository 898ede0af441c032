//! libpod request and response bodies.

use serde::{Deserialize, Serialize};

/// Entry from `containers/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ListedContainer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
}

/// Entry from `images/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ListedImage {
    #[serde(default)]
    pub id: String,
}

/// One JSON record of the `images/pull` progress stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub(super) struct PullReport {
    #[serde(default)]
    pub stream: String,
    #[serde(default)]
    pub error: String,
}

/// Credentials sent in the `X-Registry-Auth` header.
#[derive(Debug, Serialize)]
pub(super) struct RegistryAuth<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub serveraddress: &'a str,
}

/// User namespace mode for a new container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct Namespace {
    pub nsmode: String,
    pub value: String,
}

/// Mount entry of a container spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct SpecMount {
    pub destination: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub options: Vec<String>,
}

/// Body of `containers/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(super) struct SpecGenerator {
    pub name: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userns: Option<Namespace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<SpecMount>,
}

/// Response of `containers/create`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct CreateResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Body of `containers/{id}/exec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ExecCreateConfig {
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// `[rows, columns]`.
    pub console_size: [u16; 2],
}

/// Response of `containers/{id}/exec`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ExecCreateResponse {
    #[serde(default)]
    pub id: String,
}

/// Body of `exec/{id}/start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(super) struct ExecStartConfig {
    #[serde(rename = "Detach")]
    pub detach: bool,
    #[serde(rename = "Tty")]
    pub tty: bool,
    pub h: u16,
    pub w: u16,
}

/// Response of `exec/{id}/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ExecInspect {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub pid: Option<i64>,
}
