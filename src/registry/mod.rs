//! Registry credential resolution.
//!
//! Credentials for an image pull are looked up by registry hostname in the
//! first credential-store file that exists, falling back to an external
//! `docker-credential-*` helper when the store delegates to one. Every
//! failure is a [`CredentialError`]; callers treat these as non-fatal and
//! pull unauthenticated.

mod helper;
mod reference;
mod store;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;

pub use self::helper::{HelperFuture, HelperOutput, HelperRunner, ProcessHelperRunner};
pub use self::reference::registry_hostname;
use crate::error::CredentialError;

/// Username and secret for one registry.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    /// Account name.
    pub username: String,
    /// Password or token.
    pub secret: String,
    /// Registry hostname the credential was found for.
    pub hostname: String,
}

impl fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("hostname", &self.hostname)
            .finish()
    }
}

/// Boxed future returned by [`CredentialSource::lookup`].
pub type CredentialFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RegistryCredential, CredentialError>> + Send + 'a>>;

/// Anything that can produce credentials for an image pull.
///
/// The reconciler depends on this seam rather than on [`CredentialResolver`]
/// so its pull policy can be tested without credential files.
pub trait CredentialSource: Send + Sync {
    /// Look up credentials for the registry hosting `image_reference`.
    fn lookup(&self, image_reference: &str) -> CredentialFuture<'_>;
}

/// Looks up registry credentials for image references.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait.
/// * `H` - The credential helper runner.
pub struct CredentialResolver<'a, E: mockable::Env, H: HelperRunner = ProcessHelperRunner> {
    env: &'a E,
    helpers: H,
}

impl<'a, E: mockable::Env> CredentialResolver<'a, E> {
    /// Creates a resolver that runs helpers as child processes.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self {
            env,
            helpers: ProcessHelperRunner,
        }
    }
}

impl<'a, E: mockable::Env, H: HelperRunner> CredentialResolver<'a, E, H> {
    /// Creates a resolver with a custom helper runner.
    #[must_use]
    pub const fn with_helper_runner(env: &'a E, helpers: H) -> Self {
        Self { env, helpers }
    }

    /// Returns the credential-store file that would be consulted.
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::NoConfig` when none of the candidate files exist.
    pub fn config_path(&self) -> Result<Utf8PathBuf, CredentialError> {
        store::candidate_paths(self.env)
            .into_iter()
            .find(|path| path.exists())
            .ok_or(CredentialError::NoConfig)
    }

    /// Resolve credentials for `image_reference`.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialError`] when the reference has no registry host,
    /// no store file exists, the store cannot be read or parsed, it holds
    /// nothing for the host, or the delegated helper is invalid or fails.
    pub async fn resolve(&self, image_reference: &str) -> Result<RegistryCredential, CredentialError> {
        let hostname = registry_hostname(image_reference)?;
        let path = self.config_path()?;
        tracing::debug!(hostname, path = %path, "looking up registry credentials");
        let file = store::load_auth_file(&path)?;

        if let Some(entry) = file.entry_for(hostname) {
            if let Some((username, secret)) = entry.credentials(&path)? {
                return Ok(RegistryCredential {
                    username,
                    secret,
                    hostname: hostname.to_owned(),
                });
            }
        }

        let Some(helper_name) = file.helper_for(hostname) else {
            return Err(CredentialError::NoEntry {
                hostname: hostname.to_owned(),
            });
        };
        let (username, secret) =
            helper::fetch_from_helper(&self.helpers, helper_name, hostname).await?;
        Ok(RegistryCredential {
            username,
            secret,
            hostname: hostname.to_owned(),
        })
    }
}

impl<E, H> CredentialSource for CredentialResolver<'_, E, H>
where
    E: mockable::Env + Sync,
    H: HelperRunner,
{
    fn lookup(&self, image_reference: &str) -> CredentialFuture<'_> {
        let reference = String::from(image_reference);
        Box::pin(async move { self.resolve(&reference).await })
    }
}
