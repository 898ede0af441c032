//! Given/When steps for container reconciliation scenarios.

use std::sync::{Arc, Mutex, PoisonError};

use mockall::mock;
use runbox::engine::{
    ContainerDetails, ContainerEngine, ContainerIdentity, EngineFuture, ExecAttachment,
    ExecResult, ExecSpec, ReconcileMode, TerminalGeometry, ensure_container,
};
use runbox::error::{ContainerError, CredentialError, RunboxError};
use runbox::registry::{CredentialFuture, CredentialSource, RegistryCredential};
use rstest_bdd_macros::{given, when};

use super::state::{ReconcileOutcome, ReconcileState, StepResult};

const CONTAINER_NAME: &str = "temper_myproj";

mock! {
    Engine {}

    impl ContainerEngine for Engine {
        fn name(&self) -> &'static str;
        fn find_container_by_name(&self, name: &str) -> EngineFuture<'_, Option<ContainerIdentity>>;
        fn find_image_id(&self, reference: &str) -> EngineFuture<'_, String>;
        fn pull_image(
            &self,
            reference: &str,
            credential: Option<RegistryCredential>,
        ) -> EngineFuture<'_, String>;
        fn create_container(
            &self,
            details: &ContainerDetails,
        ) -> EngineFuture<'_, Option<ContainerIdentity>>;
        fn start_container(&self, id: &str) -> EngineFuture<'_, ()>;
        fn delete_container(&self, id: &str) -> EngineFuture<'_, ()>;
        fn create_exec(&self, spec: &ExecSpec) -> EngineFuture<'_, String>;
        fn start_exec(&self, exec_id: &str, tty: bool) -> EngineFuture<'_, ExecAttachment>;
        fn resize_exec(&self, exec_id: &str, geometry: TerminalGeometry) -> EngineFuture<'_, ()>;
        fn inspect_exec(&self, exec_id: &str) -> EngineFuture<'_, ExecResult>;
    }
}

mock! {
    Credentials {}

    impl CredentialSource for Credentials {
        fn lookup(&self, image_reference: &str) -> CredentialFuture<'_>;
    }
}

/// Ordered record of the engine calls a scenario made.
#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn record(&self, call: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn ready<T: Send + 'static>(value: Result<T, RunboxError>) -> EngineFuture<'static, T> {
    Box::pin(async move { value })
}

#[given("the configured image is {image}")]
fn configured_image_is(reconcile_state: &ReconcileState, image: String) {
    reconcile_state.image.set(image);
}

#[given("a container for the project already exists")]
fn container_already_exists(reconcile_state: &ReconcileState) {
    reconcile_state.container_exists.set(true);
}

#[given("reconciliation mode is {mode}")]
fn reconciliation_mode_is(reconcile_state: &ReconcileState, mode: String) -> StepResult<()> {
    let parsed = match mode.as_str() {
        "reuse" => ReconcileMode::Reuse,
        "recreate" => ReconcileMode::Recreate,
        "never-pull" => ReconcileMode::NeverPull,
        other => return Err(format!("unknown reconciliation mode '{other}'")),
    };
    reconcile_state.mode.set(parsed);
    Ok(())
}

#[given("the image is present locally")]
fn image_is_present_locally(reconcile_state: &ReconcileState) {
    reconcile_state.image_present.set(true);
}

#[given("registry credentials are stored for {username}")]
fn credentials_are_stored(reconcile_state: &ReconcileState, username: String) {
    reconcile_state.stored_username.set(username);
}

#[given("no registry credentials are stored")]
fn no_credentials_are_stored(reconcile_state: &ReconcileState) {
    drop(reconcile_state.stored_username.take());
}

#[given("the registry rejects the pull")]
fn registry_rejects_pull(reconcile_state: &ReconcileState) {
    reconcile_state.pull_rejected.set(true);
}

fn build_engine(reconcile_state: &ReconcileState, log: &CallLog) -> MockEngine {
    let container_exists = reconcile_state.container_exists.get().unwrap_or(false);
    let image_present = reconcile_state.image_present.get().unwrap_or(false);
    let pull_rejected = reconcile_state.pull_rejected.get().unwrap_or(false);
    let mut engine = MockEngine::new();

    let find_log = log.clone();
    engine.expect_find_container_by_name().returning(move |name| {
        find_log.record("find");
        let found = container_exists.then(|| ContainerIdentity::new(name, "old"));
        ready(Ok(found))
    });

    let delete_log = log.clone();
    engine.expect_delete_container().returning(move |id| {
        delete_log.record(format!("delete {id}"));
        ready(Ok(()))
    });

    let image_log = log.clone();
    engine.expect_find_image_id().returning(move |_| {
        image_log.record("find image");
        let id = if image_present { "sha256:abc" } else { "" };
        ready(Ok(String::from(id)))
    });

    let pull_log = log.clone();
    engine
        .expect_pull_image()
        .returning(move |reference, credential| {
            pull_log.record(credential.map_or_else(
                || String::from("pull anonymously"),
                |found| format!("pull as {}", found.username),
            ));
            if pull_rejected {
                return ready(Err(ContainerError::PullFailed {
                    image: String::from(reference),
                    message: String::from("unauthorized"),
                    credential_error: None,
                }
                .into()));
            }
            ready(Ok(String::from("sha256:pulled")))
        });

    let create_log = log.clone();
    engine.expect_create_container().returning(move |details| {
        create_log.record("create");
        ready(Ok(Some(ContainerIdentity::new(details.name(), "new"))))
    });

    engine
}

fn build_credentials(reconcile_state: &ReconcileState) -> MockCredentials {
    let stored = reconcile_state.stored_username.get();
    let mut credentials = MockCredentials::new();
    credentials.expect_lookup().returning(move |reference| {
        let hostname = reference.split('/').next().unwrap_or_default().to_owned();
        let result = stored.clone().map_or_else(
            || Err(CredentialError::NoEntry {
                hostname: hostname.clone(),
            }),
            |username| {
                Ok(RegistryCredential {
                    username,
                    secret: String::from("hunter2"),
                    hostname: hostname.clone(),
                })
            },
        );
        Box::pin(async move { result })
    });
    credentials
}

#[when("the container is ensured")]
fn container_is_ensured(reconcile_state: &ReconcileState) -> StepResult<()> {
    let image = reconcile_state
        .image
        .get()
        .ok_or_else(|| String::from("image should be configured"))?;
    let mode = reconcile_state.mode.get().unwrap_or_default();
    let details = ContainerDetails::new(image, CONTAINER_NAME)
        .map_err(|error| format!("failed to build details: {error}"))?
        .with_mode(mode);

    let log = CallLog::default();
    let engine = build_engine(reconcile_state, &log);
    let credentials = build_credentials(reconcile_state);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|error| format!("failed to create runtime: {error}"))?;
    let outcome = match runtime.block_on(ensure_container(&engine, &credentials, &details)) {
        Ok(identity) => ReconcileOutcome::Ensured { id: identity.id },
        Err(error) => ReconcileOutcome::Failed {
            message: error.to_string(),
        },
    };

    reconcile_state.calls.set(log.snapshot());
    reconcile_state.outcome.set(outcome);
    Ok(())
}
