//! Carry out a [`RunPlan`].

use tokio_util::sync::CancellationToken;

use super::{CommandOutcome, RunPlan};
use crate::config::AppConfig;
use crate::engine::{
    BackendSelector, ContainerEngine, ExecDetails, LocalStreams, LocalTerminal, SystemTerminal,
    ensure_container, run_session,
};
use crate::error::{ContainerError, Result as RunboxResult};
use crate::registry::{CredentialResolver, CredentialSource};

/// Parameters for [`run`].
pub struct RunParams<'a, E: mockable::Env> {
    /// Application configuration (engine socket and API version).
    pub config: &'a AppConfig,
    /// What to run.
    pub plan: RunPlan,
    /// Environment variable provider for engine selection and credentials.
    pub env: &'a E,
    /// Cancels the exec session when fired.
    pub cancel: &'a CancellationToken,
}

/// Select an engine and run `plan` on the process's own terminal.
///
/// # Errors
///
/// Returns `ContainerError::EngineUnavailable` when no engine answers, and
/// any error from [`run_with_engine`].
pub async fn run<E: mockable::Env + Sync>(params: RunParams<'_, E>) -> RunboxResult<CommandOutcome> {
    let RunParams {
        config,
        plan,
        env,
        cancel,
    } = params;

    let session = BackendSelector::new(env)
        .with_configured_socket(config.engine_socket.as_deref())
        .with_api_version(config.podman_api_version())
        .select()
        .await?;
    tracing::debug!(engine = session.name(), "engine selected");

    let streams = LocalStreams::process().map_err(|error| ContainerError::ExecFailed {
        container_id: String::from(plan.container.name()),
        message: format!("failed to read local input: {error}"),
    })?;
    let credentials = CredentialResolver::new(env);
    run_with_engine(
        &session,
        &credentials,
        plan,
        &SystemTerminal,
        streams,
        cancel,
    )
    .await
}

/// Ensure the container, start it and run the planned command in it.
///
/// # Errors
///
/// Returns reconciliation errors from
/// [`ensure_container`](crate::engine::ensure_container), the engine error
/// when the container cannot be started, and session errors from
/// [`run_session`](crate::engine::run_session). A non-zero remote exit code
/// is an outcome, not an error.
pub async fn run_with_engine<G, C, T>(
    engine: &G,
    credentials: &C,
    plan: RunPlan,
    terminal: &T,
    streams: LocalStreams,
    cancel: &CancellationToken,
) -> RunboxResult<CommandOutcome>
where
    G: ContainerEngine + ?Sized,
    C: CredentialSource + ?Sized,
    T: LocalTerminal + ?Sized,
{
    let RunPlan {
        container,
        command,
        env,
        working_dir,
        user,
    } = plan;

    tracing::debug!(name = container.name(), "ensuring container");
    let identity = ensure_container(engine, credentials, &container).await?;
    tracing::debug!(id = %identity.id, "starting container");
    engine.start_container(&identity.id).await?;

    let details = ExecDetails::new(identity.id, command)?
        .with_env(env)
        .with_working_dir(Some(working_dir.into_string()))
        .with_user(user);
    let result = run_session(engine, details, terminal, streams, cancel).await?;
    let exit_code = result.exit_code.unwrap_or_default();
    tracing::debug!(pid = ?result.pid, exit_code, "process exited");
    Ok(CommandOutcome::from_exit_code(exit_code))
}
