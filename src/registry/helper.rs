//! External credential helper invocation.
//!
//! Helpers follow the `docker-credential-<name> get` protocol: the registry
//! hostname is written to stdin and a JSON object with `ServerURL`,
//! `Username` and `Secret` is read back from stdout.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::reference::normalize_key;
use crate::error::CredentialError;

const HELPER_PREFIX: &str = "docker-credential-";

/// Boxed future returned by [`HelperRunner::get`].
pub type HelperFuture<'a> = Pin<Box<dyn Future<Output = io::Result<HelperOutput>> + Send + 'a>>;

/// Captured result of running a helper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperOutput {
    /// Whether the helper exited successfully.
    pub success: bool,
    /// Everything the helper wrote to stdout.
    pub stdout: Vec<u8>,
    /// Everything the helper wrote to stderr.
    pub stderr: Vec<u8>,
}

/// Runs a credential helper program.
///
/// This seam keeps credential resolution testable without real helpers on
/// `PATH`.
pub trait HelperRunner: Send + Sync {
    /// Run `program get`, writing `server` to its stdin.
    fn get(&self, program: &str, server: &str) -> HelperFuture<'_>;
}

/// Runs helpers as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHelperRunner;

impl HelperRunner for ProcessHelperRunner {
    fn get(&self, program: &str, server: &str) -> HelperFuture<'_> {
        let program_owned = String::from(program);
        let server_owned = String::from(server);
        Box::pin(async move {
            let mut child = Command::new(&program_owned)
                .arg("get")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(server_owned.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            let output = child.wait_with_output().await?;
            Ok(HelperOutput {
                success: output.status.success(),
                stdout: output.stdout,
                stderr: output.stderr,
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct HelperResponse {
    #[serde(rename = "ServerURL", default)]
    server_url: Option<String>,
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Secret", default)]
    secret: String,
}

/// Whether a helper's `ServerURL` names `hostname`. A missing URL is taken
/// as agreement.
fn answers_for(server_url: Option<&str>, hostname: &str) -> bool {
    server_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .is_none_or(|url| normalize_key(url) == hostname)
}

/// Returns the helper executable for `name`, rejecting anything but `[a-z]+`.
pub(super) fn helper_program(name: &str) -> Result<String, CredentialError> {
    if name.is_empty() || !name.bytes().all(|byte| byte.is_ascii_lowercase()) {
        return Err(CredentialError::InvalidHelper {
            name: name.to_owned(),
        });
    }
    Ok(format!("{HELPER_PREFIX}{name}"))
}

/// Run the helper for `hostname` and parse its answer into `(username, secret)`.
pub(super) async fn fetch_from_helper<H: HelperRunner + ?Sized>(
    runner: &H,
    name: &str,
    hostname: &str,
) -> Result<(String, String), CredentialError> {
    let program = helper_program(name)?;
    let failed = |message: String| CredentialError::HelperFailed {
        helper: program.clone(),
        message,
    };

    let output = runner
        .get(&program, hostname)
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !output.success {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_owned()
        } else {
            stderr.trim().to_owned()
        };
        return Err(failed(format!("exited unsuccessfully: {detail}")));
    }

    let response: HelperResponse = serde_json::from_slice(&output.stdout)
        .map_err(|e| failed(format!("unreadable response: {e}")))?;
    if response.username.is_empty() && response.secret.is_empty() {
        return Err(failed(String::from("returned empty credentials")));
    }
    if !answers_for(response.server_url.as_deref(), hostname) {
        tracing::debug!(
            helper = %program,
            requested = hostname,
            answered = ?response.server_url,
            "credential helper answered for a different server"
        );
    }
    Ok((response.username, response.secret))
}
