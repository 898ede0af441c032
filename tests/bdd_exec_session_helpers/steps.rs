//! Given/When steps for exec session scenarios.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures_util::stream;
use mockall::mock;
use runbox::engine::{
    ContainerDetails, ContainerEngine, ContainerIdentity, EngineFuture, ExecAttachment,
    ExecDetails, ExecResult, ExecSpec, LocalStreams, LocalTerminal, OutputChunk, OutputStream,
    TerminalGeometry, run_session,
};
use runbox::error::RunboxError;
use runbox::registry::RegistryCredential;
use rstest_bdd_macros::{given, when};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;

use super::state::{ExecSessionState, RemoteBehaviour, SessionOutcome, StepResult};

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

#[given("the local terminal is interactive")]
fn terminal_is_interactive(exec_session_state: &ExecSessionState) {
    exec_session_state.interactive.set(true);
}

#[given("the local terminal is not interactive")]
fn terminal_is_not_interactive(exec_session_state: &ExecSessionState) {
    exec_session_state.interactive.set(false);
}

#[given("the command writes \"{stdout}\" to stdout and \"{stderr}\" to stderr")]
fn command_writes_both(exec_session_state: &ExecSessionState, stdout: String, stderr: String) {
    exec_session_state
        .remote
        .set(RemoteBehaviour::Writes { stdout, stderr });
}

#[given("the command writes \"{stdout}\" to stdout")]
fn command_writes_stdout(exec_session_state: &ExecSessionState, stdout: String) {
    exec_session_state.remote.set(RemoteBehaviour::Writes {
        stdout,
        stderr: String::new(),
    });
}

#[given("the command echoes its input")]
fn command_echoes_input(exec_session_state: &ExecSessionState) {
    exec_session_state.remote.set(RemoteBehaviour::Echo);
}

#[given("the output stream breaks")]
fn output_stream_breaks(exec_session_state: &ExecSessionState) {
    exec_session_state.remote.set(RemoteBehaviour::Breaks);
}

#[given("local input is \"{input}\"")]
fn local_input_is(exec_session_state: &ExecSessionState, input: String) {
    exec_session_state.local_input.set(input);
}

#[given("the command exits with code {code}")]
fn command_exits_with(exec_session_state: &ExecSessionState, code: i64) {
    exec_session_state.exit_code.set(code);
}

#[given("the engine omits the exit code")]
fn engine_omits_exit_code(exec_session_state: &ExecSessionState) {
    drop(exec_session_state.exit_code.take());
}

/// Build the remote output and input halves for `behaviour`.
fn attachment_for(behaviour: RemoteBehaviour) -> ExecAttachment {
    let (remote_input, mut received) = tokio::io::duplex(1024);
    let output: OutputStream = match behaviour {
        RemoteBehaviour::Writes { stdout, stderr } => Box::pin(stream::iter(vec![
            Ok(OutputChunk::Stdout(Bytes::from(stdout))),
            Ok(OutputChunk::Stderr(Bytes::from(stderr))),
        ])),
        RemoteBehaviour::Echo => Box::pin(stream::once(async move {
            let mut echoed = Vec::new();
            received.read_to_end(&mut echoed).await?;
            Ok(OutputChunk::Stdout(Bytes::from(echoed)))
        })),
        RemoteBehaviour::Breaks => Box::pin(stream::iter(vec![Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset",
        ))])),
    };
    ExecAttachment {
        output,
        input: Box::pin(remote_input),
        multiplexed: true,
    }
}

fn build_engine(exec_session_state: &ExecSessionState) -> StepResult<MockEngine> {
    let behaviour = exec_session_state
        .remote
        .get()
        .ok_or_else(|| String::from("remote behaviour should be configured"))?;
    let exit_code = exec_session_state.exit_code.get();
    let mut engine = MockEngine::new();
    engine
        .expect_create_exec()
        .times(1)
        .returning(|_| ready(Ok(String::from("bdd-exec"))));
    engine
        .expect_start_exec()
        .times(1)
        .return_once(move |_, _| ready(Ok(attachment_for(behaviour))));
    engine
        .expect_resize_exec()
        .times(0..)
        .returning(|_, _| ready(Ok(())));
    engine.expect_inspect_exec().returning(move |exec_id| {
        ready(Ok(ExecResult {
            exec_id: String::from(exec_id),
            pid: None,
            exit_code,
            running: false,
        }))
    });
    Ok(engine)
}

fn build_terminal(interactive: bool, raw_mode_exits: &Arc<AtomicUsize>) -> MockTerminal {
    let mut terminal = MockTerminal::new();
    terminal.expect_is_terminal().return_const(interactive);
    terminal.expect_size().return_const(Some(TerminalGeometry {
        rows: 40,
        columns: 132,
    }));
    terminal.expect_enable_raw_mode().returning(|| Ok(()));
    let exits = Arc::clone(raw_mode_exits);
    terminal.expect_disable_raw_mode().returning(move || {
        exits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    terminal
}

async fn read_all(mut stream: DuplexStream) -> io::Result<String> {
    let mut text = String::new();
    stream.read_to_string(&mut text).await?;
    Ok(text)
}

#[when("the session runs")]
fn session_runs(exec_session_state: &ExecSessionState) -> StepResult<()> {
    let interactive = exec_session_state.interactive.get().unwrap_or(false);
    let input = exec_session_state.local_input.get().unwrap_or_default();
    let engine = build_engine(exec_session_state)?;
    let raw_mode_exits = Arc::new(AtomicUsize::new(0));
    let terminal = build_terminal(interactive, &raw_mode_exits);
    let details = ExecDetails::new("bdd-container", vec![String::from("temper")])
        .map_err(|error| format!("failed to build exec details: {error}"))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|error| format!("failed to create runtime: {error}"))?;
    let outcome = runtime.block_on(async {
        let (mut stdin_peer, stdin) = tokio::io::duplex(1024);
        let (stdout_local, stdout) = tokio::io::duplex(4096);
        let (stderr_local, stderr) = tokio::io::duplex(4096);
        stdin_peer.write_all(input.as_bytes()).await?;
        drop(stdin_peer);

        let streams = LocalStreams {
            stdin: Box::pin(stdin),
            stdout: Box::pin(stdout_local),
            stderr: Box::pin(stderr_local),
        };
        let cancel = CancellationToken::new();
        let result = run_session(&engine, details, &terminal, streams, &cancel).await;
        let outcome = match result {
            Ok(finished) => SessionOutcome::Finished {
                exit_code: finished.exit_code.unwrap_or_default(),
                stdout: read_all(stdout).await?,
                stderr: read_all(stderr).await?,
            },
            Err(error) => SessionOutcome::Failed {
                message: error.to_string(),
            },
        };
        Ok::<_, io::Error>(outcome)
    });

    exec_session_state
        .outcome
        .set(outcome.map_err(|error| format!("failed to drive local streams: {error}"))?);
    exec_session_state
        .raw_mode_exits
        .set(raw_mode_exits.load(Ordering::SeqCst));
    Ok(())
}
