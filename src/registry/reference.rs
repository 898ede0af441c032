//! Registry hostname extraction and credential-key matching.

use crate::error::CredentialError;

/// Extract the registry hostname from an image reference.
///
/// The first path component names a registry when it contains `.` or `:` or
/// is exactly `localhost`. Anything else (for example `library/alpine`) is a
/// repository on the implicit default registry and yields `NoHostname`.
pub fn registry_hostname(reference: &str) -> Result<&str, CredentialError> {
    let trimmed = reference.trim();
    let no_hostname = || CredentialError::NoHostname {
        reference: reference.to_owned(),
    };
    let (first, _rest) = trimmed.split_once('/').ok_or_else(no_hostname)?;
    if first.contains('.') || first.contains(':') || first == "localhost" {
        Ok(first)
    } else {
        Err(no_hostname())
    }
}

/// Reduce a stored credential key to its bare hostname.
///
/// Older Docker clients stored keys such as `https://index.docker.io/v1/`.
pub fn normalize_key(key: &str) -> &str {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    without_scheme
        .split_once('/')
        .map_or(without_scheme, |(host, _path)| host)
}
