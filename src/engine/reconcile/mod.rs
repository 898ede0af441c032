//! Bring the named container into the state the caller asked for.
//!
//! [`ensure_container`] is the only place that decides between reusing,
//! recreating and pulling. It never retries: each step runs at most once and
//! the first failure is returned.

use super::{ContainerDetails, ContainerEngine, ContainerIdentity};
use crate::error::{ContainerError, RunboxError};
use crate::registry::CredentialSource;

/// Ensure a container matching `details` exists and return its identity.
///
/// An existing container is returned unchanged in `Reuse` mode and deleted
/// first in the other modes. A missing image is pulled (with whatever
/// credentials `credentials` can find) unless the mode is `NeverPull`.
///
/// # Errors
///
/// Returns the engine error from any failed step, or one of
/// `ContainerError::ImagePullDisallowed`, `ContainerError::PulledImageMissing`
/// and `ContainerError::CreatedContainerMissing` when the engine state does
/// not allow or does not reflect the requested change.
pub async fn ensure_container<G, C>(
    engine: &G,
    credentials: &C,
    details: &ContainerDetails,
) -> Result<ContainerIdentity, RunboxError>
where
    G: ContainerEngine + ?Sized,
    C: CredentialSource + ?Sized,
{
    if let Some(existing) = engine.find_container_by_name(details.name()).await? {
        if details.mode().reuses_existing() {
            tracing::debug!(name = %existing.name, id = %existing.id, "reusing existing container");
            return Ok(existing);
        }
        tracing::debug!(name = %existing.name, id = %existing.id, "deleting existing container");
        engine.delete_container(&existing.id).await?;
    }

    let image_id = ensure_image(engine, credentials, details).await?;
    tracing::debug!(image = details.image(), image_id, "image available");

    let created = engine.create_container(details).await?;
    let identity = created.ok_or_else(|| ContainerError::CreatedContainerMissing {
        name: String::from(details.name()),
    })?;
    tracing::debug!(name = %identity.name, id = %identity.id, "created container");
    Ok(identity)
}

/// Return the local image ID for `details`, pulling it when allowed.
async fn ensure_image<G, C>(
    engine: &G,
    credentials: &C,
    details: &ContainerDetails,
) -> Result<String, RunboxError>
where
    G: ContainerEngine + ?Sized,
    C: CredentialSource + ?Sized,
{
    let image = details.image();
    let existing = engine.find_image_id(image).await?;
    if !existing.is_empty() {
        return Ok(existing);
    }
    if !details.mode().allows_pull() {
        return Err(ContainerError::ImagePullDisallowed {
            image: String::from(image),
        }
        .into());
    }

    let (credential, credential_error) = match credentials.lookup(image).await {
        Ok(found) => {
            tracing::debug!(image, hostname = %found.hostname, "using registry credentials");
            (Some(found), None)
        }
        Err(error) => {
            tracing::warn!(image, error = %error, "no registry credentials; pulling anonymously");
            (None, Some(error.to_string()))
        }
    };

    let pulled = engine
        .pull_image(image, credential)
        .await
        .map_err(|error| with_credential_error(error, credential_error))?;
    if pulled.is_empty() {
        return Err(ContainerError::PulledImageMissing {
            image: String::from(image),
        }
        .into());
    }
    Ok(pulled)
}

/// Attach a retained credential failure to a pull failure.
fn with_credential_error(error: RunboxError, credential_error: Option<String>) -> RunboxError {
    match error {
        RunboxError::Container(ContainerError::PullFailed {
            image,
            message,
            credential_error: None,
        }) => RunboxError::from(ContainerError::PullFailed {
            image,
            message,
            credential_error,
        }),
        other => other,
    }
}
