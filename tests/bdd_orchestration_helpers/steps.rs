//! Given/When steps for orchestration scenarios.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use camino::Utf8PathBuf;
use futures_util::stream;
use mockall::mock;
use runbox::api::{CommandChoice, RunOptions, plan_run, run_with_engine};
use runbox::config::{AppConfig, CommandConfig, ContainerConfig};
use runbox::engine::{
    ContainerDetails, ContainerEngine, ContainerIdentity, EngineFuture, ExecAttachment,
    ExecResult, ExecSpec, LocalStreams, LocalTerminal, TerminalGeometry,
};
use runbox::error::{ContainerError, RunboxError};
use runbox::registry::{CredentialFuture, CredentialSource, RegistryCredential};
use rstest_bdd_macros::{given, when};
use tokio_util::sync::CancellationToken;

use super::state::{ExecRecord, OrchestrationState, RunOutcome, StepResult};

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

mock! {
    Terminal {}

    impl LocalTerminal for Terminal {
        fn is_terminal(&self) -> bool;
        fn size(&self) -> Option<TerminalGeometry>;
        fn enable_raw_mode(&self) -> io::Result<()>;
        fn disable_raw_mode(&self) -> io::Result<()>;
    }
}

fn ready<T: Send + 'static>(value: Result<T, RunboxError>) -> EngineFuture<'static, T> {
    Box::pin(async move { value })
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

#[given("a project at {root} configured with image {image}")]
fn project_configured(orchestration_state: &OrchestrationState, root: String, image: String) {
    orchestration_state.host_root.set(root);
    orchestration_state.image.set(image);
}

#[given("no image is configured")]
fn no_image_configured(orchestration_state: &OrchestrationState) {
    drop(orchestration_state.image.take());
}

#[given("the container for the project already exists")]
fn project_container_exists(orchestration_state: &OrchestrationState) {
    orchestration_state.container_exists.set(true);
}

#[given("the main command is {command}")]
fn main_command_is(orchestration_state: &OrchestrationState, command: String) {
    orchestration_state.main_command.set(words(&command));
}

#[given("the trailing arguments are {args}")]
fn trailing_arguments_are(orchestration_state: &OrchestrationState, args: String) {
    orchestration_state.args.set(words(&args));
}

#[given("the trailing arguments replace the main command")]
fn trailing_arguments_replace_main(orchestration_state: &OrchestrationState) {
    orchestration_state.choice.set(CommandChoice::Verbatim);
}

#[given("the admin shell is requested")]
fn admin_shell_requested(orchestration_state: &OrchestrationState) {
    orchestration_state.choice.set(CommandChoice::AdminShell);
}

#[given("the remote command exits with code {code}")]
fn remote_command_exits_with(orchestration_state: &OrchestrationState, code: i64) {
    orchestration_state.exit_code.set(code);
}

#[given("the engine cannot start the container")]
fn engine_cannot_start(orchestration_state: &OrchestrationState) {
    orchestration_state.start_fails.set(true);
}

fn project_config(orchestration_state: &OrchestrationState) -> AppConfig {
    AppConfig {
        image: orchestration_state.image.get(),
        container_prefix: Some(String::from("temper")),
        container: ContainerConfig {
            uid: Some(1000),
            gid: Some(1000),
            user: Some(String::from("dev")),
            ..ContainerConfig::default()
        },
        command: CommandConfig {
            main: orchestration_state.main_command.get().unwrap_or_default(),
            ..CommandConfig::default()
        },
        ..AppConfig::default()
    }
}

/// Shared records of what the engine was asked to do.
#[derive(Clone, Default)]
struct Observed {
    looked_up: Arc<Mutex<Vec<String>>>,
    started: Arc<Mutex<Vec<String>>>,
    exec: Arc<Mutex<Option<ExecRecord>>>,
}

fn build_engine(orchestration_state: &OrchestrationState, observed: &Observed) -> MockEngine {
    let container_exists = orchestration_state.container_exists.get().unwrap_or(false);
    let start_fails = orchestration_state.start_fails.get().unwrap_or(false);
    let exit_code = orchestration_state.exit_code.get().unwrap_or_default();
    let mut engine = MockEngine::new();

    let looked_up = Arc::clone(&observed.looked_up);
    engine.expect_find_container_by_name().returning(move |name| {
        looked_up
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(String::from(name));
        let found = container_exists.then(|| ContainerIdentity::new(name, "c1"));
        ready(Ok(found))
    });
    engine
        .expect_find_image_id()
        .returning(|_| ready(Ok(String::from("sha256:abc"))));
    engine
        .expect_create_container()
        .returning(|details| ready(Ok(Some(ContainerIdentity::new(details.name(), "c1")))));

    let started = Arc::clone(&observed.started);
    engine.expect_start_container().returning(move |id| {
        if start_fails {
            return ready(Err(ContainerError::StartFailed {
                container_id: String::from(id),
                message: String::from("crun: executable not found"),
            }
            .into()));
        }
        started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(String::from(id));
        ready(Ok(()))
    });

    let exec = Arc::clone(&observed.exec);
    engine.expect_create_exec().returning(move |spec| {
        *exec.lock().unwrap_or_else(PoisonError::into_inner) = Some(ExecRecord {
            command: spec.details.command().to_vec(),
            working_dir: spec.details.working_dir().map(String::from),
            user: spec.details.user().map(String::from),
        });
        ready(Ok(String::from("e1")))
    });
    engine.expect_start_exec().returning(|_, _| {
        ready(Ok(ExecAttachment {
            output: Box::pin(stream::empty()),
            input: Box::pin(tokio::io::sink()),
            multiplexed: true,
        }))
    });
    engine.expect_inspect_exec().returning(move |exec_id| {
        ready(Ok(ExecResult {
            exec_id: String::from(exec_id),
            pid: Some(4242),
            exit_code: Some(exit_code),
            running: false,
        }))
    });
    engine
}

fn plain_terminal() -> MockTerminal {
    let mut terminal = MockTerminal::new();
    terminal.expect_is_terminal().return_const(false);
    terminal.expect_size().return_const(None);
    terminal
}

fn quiet_streams() -> LocalStreams {
    LocalStreams {
        stdin: Box::pin(tokio::io::empty()),
        stdout: Box::pin(tokio::io::sink()),
        stderr: Box::pin(tokio::io::sink()),
    }
}

#[when("runbox runs")]
fn runbox_runs(orchestration_state: &OrchestrationState) -> StepResult<()> {
    let config = project_config(orchestration_state);
    let host_root = orchestration_state
        .host_root
        .get()
        .map(Utf8PathBuf::from)
        .ok_or_else(|| String::from("project root should be configured"))?;
    let options = RunOptions {
        choice: orchestration_state.choice.get().unwrap_or_default(),
        args: orchestration_state.args.get().unwrap_or_default(),
        ..RunOptions::default()
    };

    let observed = Observed::default();
    let outcome = match plan_run(&config, options, &host_root) {
        Ok(plan) => {
            let engine = build_engine(orchestration_state, &observed);
            let mut credentials = MockCredentials::new();
            credentials.expect_lookup().never();
            let terminal = plain_terminal();
            let cancel = CancellationToken::new();
            let runtime = tokio::runtime::Runtime::new()
                .map_err(|error| format!("failed to create runtime: {error}"))?;
            runtime.block_on(run_with_engine(
                &engine,
                &credentials,
                plan,
                &terminal,
                quiet_streams(),
                &cancel,
            ))
        }
        Err(error) => Err(error),
    };

    orchestration_state.outcome.set(match outcome {
        Ok(finished) => RunOutcome::Finished {
            exit_status: finished.exit_status(),
        },
        Err(error) => RunOutcome::Failed {
            message: error.to_string(),
        },
    });
    orchestration_state.looked_up.set(
        observed
            .looked_up
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    );
    orchestration_state.started.set(
        observed
            .started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    );
    if let Some(record) = observed
        .exec
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
    {
        orchestration_state.exec.set(record);
    }
    Ok(())
}
