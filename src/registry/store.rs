//! Credential-store file discovery and parsing.
//!
//! Both the containers-auth format (`{"auths": {...}}`) and the Docker CLI
//! format (which adds `credsStore` and `credHelpers`) deserialize into
//! [`AuthFile`].

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;

use super::reference::normalize_key;
use crate::error::CredentialError;

/// Parsed contents of a credential-store file.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AuthFile {
    #[serde(default)]
    pub(super) auths: BTreeMap<String, AuthEntry>,
    #[serde(default, rename = "credsStore")]
    pub(super) creds_store: Option<String>,
    #[serde(default, rename = "credHelpers")]
    pub(super) cred_helpers: BTreeMap<String, String>,
}

/// One `auths` entry.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

impl AuthFile {
    /// Find the entry for `hostname`, preferring an exact key over a legacy one.
    pub(super) fn entry_for(&self, hostname: &str) -> Option<&AuthEntry> {
        self.auths.get(hostname).or_else(|| {
            self.auths
                .iter()
                .find(|(key, _)| normalize_key(key) == hostname)
                .map(|(_, entry)| entry)
        })
    }

    /// Name of the helper responsible for `hostname`, if any.
    pub(super) fn helper_for(&self, hostname: &str) -> Option<&str> {
        self.cred_helpers
            .get(hostname)
            .or(self.creds_store.as_ref())
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

impl AuthEntry {
    /// Decode inline credentials, if the entry carries any.
    ///
    /// Returns `Ok(None)` for entries that defer to a helper.
    pub(super) fn credentials(&self, path: &Utf8Path) -> Result<Option<(String, String)>, CredentialError> {
        if let Some(encoded) = self.auth.as_deref().filter(|auth| !auth.is_empty()) {
            return decode_auth(encoded, path).map(Some);
        }
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Ok(Some((username.to_owned(), password.to_owned())))
            }
            _ => Ok(None),
        }
    }
}

fn decode_auth(encoded: &str, path: &Utf8Path) -> Result<(String, String), CredentialError> {
    let malformed = |message: String| CredentialError::Malformed {
        path: path.as_std_path().to_path_buf(),
        message,
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| malformed(format!("auth is not valid base64: {e}")))?;
    let decoded =
        String::from_utf8(bytes).map_err(|e| malformed(format!("auth is not UTF-8: {e}")))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| malformed(String::from("auth is not in user:password form")))?;
    Ok((username.to_owned(), password.to_owned()))
}

/// Candidate credential-store paths, most specific first.
///
/// When `REGISTRY_AUTH_FILE` is set it is the only candidate.
pub(super) fn candidate_paths<E: mockable::Env>(env: &E) -> Vec<Utf8PathBuf> {
    let non_empty = |key: &str| env.string(key).filter(|value| !value.is_empty());

    if let Some(explicit) = non_empty("REGISTRY_AUTH_FILE") {
        return vec![Utf8PathBuf::from(explicit)];
    }

    let home = non_empty("HOME").map(Utf8PathBuf::from).or_else(|| {
        dirs::home_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
    });

    let mut paths = Vec::new();
    if let Some(runtime_dir) = non_empty("XDG_RUNTIME_DIR") {
        paths.push(Utf8PathBuf::from(runtime_dir).join("containers/auth.json"));
    }
    if let Some(ref home_dir) = home {
        paths.push(home_dir.join(".config/containers/auth.json"));
    }
    match non_empty("DOCKER_CONFIG") {
        Some(docker_config) => paths.push(Utf8PathBuf::from(docker_config).join("config.json")),
        None => {
            if let Some(ref home_dir) = home {
                paths.push(home_dir.join(".docker/config.json"));
            }
        }
    }
    paths
}

/// Read and parse the credential-store file at `path`.
pub(super) fn load_auth_file(path: &Utf8Path) -> Result<AuthFile, CredentialError> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());
    let unreadable = |message: String| CredentialError::Unreadable {
        path: path.as_std_path().to_path_buf(),
        message,
    };

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|e| unreadable(format!("failed to open directory {parent}: {e}")))?;
    let content = dir
        .read_to_string(file_name)
        .map_err(|e| unreadable(e.to_string()))?;

    serde_json::from_str(&content).map_err(|e| CredentialError::Malformed {
        path: path.as_std_path().to_path_buf(),
        message: e.to_string(),
    })
}
