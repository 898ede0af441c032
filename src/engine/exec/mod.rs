//! Run a command in a container and wire it to the local terminal.
//!
//! A session moves through create, attach and streaming. Output is copied to
//! the local streams until the engine closes it; input is copied in a
//! background task that is never waited for. Both copies and the resize
//! watcher observe one [`CancellationToken`]. Once output ends the exec is
//! inspected for the authoritative exit code.

mod input;
mod resize;
mod terminal;

use std::io;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use self::input::detached_input;
use self::resize::ResizeNotifications;
pub use self::terminal::{LocalTerminal, RawModeGuard, SystemTerminal};
use super::{ContainerEngine, ExecDetails, ExecResult, ExecSpec, FALLBACK_GEOMETRY, OutputChunk};
use crate::error::{ContainerError, RunboxError};

/// Delay between inspections of an exec whose output closed before it exited.
const EXEC_INSPECT_POLL_INTERVAL_MS: u64 = 100;

/// Boxed local input stream.
pub type LocalInput = Pin<Box<dyn AsyncRead + Send>>;

/// Boxed local output stream.
pub type LocalOutput = Pin<Box<dyn AsyncWrite + Send>>;

/// The local streams a session reads from and writes to.
pub struct LocalStreams {
    /// Forwarded to the remote stdin.
    pub stdin: LocalInput,
    /// Receives remote stdout, and remote stderr when interactive.
    pub stdout: LocalOutput,
    /// Receives remote stderr when not interactive.
    pub stderr: LocalOutput,
}

impl LocalStreams {
    /// The standard streams of this process.
    ///
    /// Stdin is read on a detached thread, so an open terminal or pipe never
    /// keeps the runtime alive after the session ends.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from spawning the stdin reader thread.
    pub fn process() -> io::Result<Self> {
        Ok(Self {
            stdin: detached_input(io::stdin())?,
            stdout: Box::pin(tokio::io::stdout()),
            stderr: Box::pin(tokio::io::stderr()),
        })
    }
}

fn exec_failed(container_id: &str, message: impl Into<String>) -> RunboxError {
    RunboxError::from(ContainerError::ExecFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}

fn stream_failed(container_id: &str, message: impl Into<String>) -> RunboxError {
    RunboxError::from(ContainerError::StreamFailed {
        container_id: String::from(container_id),
        message: message.into(),
    })
}

fn cancelled(container_id: &str) -> RunboxError {
    RunboxError::from(ContainerError::ExecCancelled {
        container_id: String::from(container_id),
    })
}

/// Run `details` in its container and return the final exec state.
///
/// The session is interactive when `terminal` is a terminal: a TTY is
/// allocated, the local terminal is held in raw mode for the duration, remote
/// stderr is folded into stdout and resizes are forwarded.
///
/// # Errors
///
/// Returns engine errors from creating, attaching or inspecting the exec,
/// `ContainerError::StreamFailed` when either copy fails,
/// `ContainerError::ExecCancelled` when `cancel` fires first, and
/// `ContainerError::ExecFailed` when the finished exec reports no exit code.
pub async fn run_session<G, T>(
    engine: &G,
    details: ExecDetails,
    terminal: &T,
    streams: LocalStreams,
    cancel: &CancellationToken,
) -> Result<ExecResult, RunboxError>
where
    G: ContainerEngine + ?Sized,
    T: LocalTerminal + ?Sized,
{
    let container_id = String::from(details.container_id());
    let interactive = terminal.is_terminal();
    let spec = ExecSpec {
        details,
        tty: interactive,
        geometry: terminal.size().unwrap_or(FALLBACK_GEOMETRY),
    };

    let exec_id = engine.create_exec(&spec).await?;
    tracing::debug!(container = %container_id, exec_id, interactive, "created exec session");
    let attachment = engine.start_exec(&exec_id, interactive).await?;
    tracing::debug!(exec_id, multiplexed = attachment.multiplexed, "attached to exec session");

    let mut raw_mode = if interactive {
        Some(RawModeGuard::enable(terminal).map_err(|error| {
            exec_failed(&container_id, format!("failed to enable raw mode: {error}"))
        })?)
    } else {
        None
    };
    let mut resize = if interactive {
        ResizeNotifications::watch().unwrap_or_else(|error| {
            tracing::warn!(error = %error, "terminal resizes will not be forwarded");
            ResizeNotifications::disabled()
        })
    } else {
        ResizeNotifications::disabled()
    };

    let LocalStreams {
        stdin,
        mut stdout,
        mut stderr,
    } = streams;
    let mut input_task = spawn_input_copy(stdin, attachment.input, cancel.clone());
    let mut output = attachment.output;
    let session = StreamingSession {
        engine,
        terminal,
        container_id: &container_id,
        exec_id: &exec_id,
        fold_stderr: interactive,
    };
    let streamed = session
        .stream(
            &mut output,
            &mut input_task,
            &mut stdout,
            &mut stderr,
            &mut resize,
            cancel,
        )
        .await;
    input_task.abort();
    if let Some(guard) = raw_mode.as_mut() {
        guard.restore();
    }
    streamed?;

    wait_for_exit(engine, &container_id, &exec_id).await
}

/// Borrowed state shared by the streaming loop.
struct StreamingSession<'s, G: ?Sized, T: ?Sized> {
    engine: &'s G,
    terminal: &'s T,
    container_id: &'s str,
    exec_id: &'s str,
    fold_stderr: bool,
}

impl<G, T> StreamingSession<'_, G, T>
where
    G: ContainerEngine + ?Sized,
    T: LocalTerminal + ?Sized,
{
    /// Copy output until it closes, an error occurs or `cancel` fires.
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "false positive triggered inside tokio::select! expansion"
    )]
    async fn stream(
        &self,
        output: &mut super::OutputStream,
        input_task: &mut JoinHandle<io::Result<()>>,
        stdout: &mut LocalOutput,
        stderr: &mut LocalOutput,
        resize: &mut ResizeNotifications,
        cancel: &CancellationToken,
    ) -> Result<(), RunboxError> {
        let mut input_open = true;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(exec_id = self.exec_id, "exec session cancelled");
                    return Err(cancelled(self.container_id));
                }
                chunk = output.next() => match chunk {
                    None => {
                        tracing::debug!(exec_id = self.exec_id, "exec output closed");
                        return Ok(());
                    }
                    Some(Ok(received)) => {
                        self.write_chunk(received, stdout, stderr).await.map_err(|error| {
                            stream_failed(self.container_id, format!("writing local output: {error}"))
                        })?;
                    }
                    Some(Err(error)) => {
                        return Err(stream_failed(
                            self.container_id,
                            format!("reading exec output: {error}"),
                        ));
                    }
                },
                joined = &mut *input_task, if input_open => {
                    input_open = false;
                    match joined {
                        Ok(Ok(())) => tracing::debug!(exec_id = self.exec_id, "local input closed"),
                        Ok(Err(error)) => {
                            return Err(stream_failed(
                                self.container_id,
                                format!("writing exec input: {error}"),
                            ));
                        }
                        Err(error) => tracing::debug!(error = %error, "input copy task ended"),
                    }
                }
                geometry = resize.changed(self.terminal) => {
                    if let Err(error) = self.engine.resize_exec(self.exec_id, geometry).await {
                        tracing::warn!(exec_id = self.exec_id, error = %error, "failed to resize exec terminal");
                    }
                }
            }
        }
    }

    async fn write_chunk(
        &self,
        chunk: OutputChunk,
        stdout: &mut LocalOutput,
        stderr: &mut LocalOutput,
    ) -> io::Result<()> {
        let (target, bytes) = match chunk {
            OutputChunk::Stdout(bytes) => (stdout, bytes),
            OutputChunk::Stderr(bytes) if self.fold_stderr => (stdout, bytes),
            OutputChunk::Stderr(bytes) => (stderr, bytes),
        };
        target.write_all(&bytes).await?;
        target.flush().await
    }
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "false positive triggered inside tokio::select! expansion"
)]
fn spawn_input_copy(
    mut stdin: LocalInput,
    mut remote: super::InputSink,
    cancel: CancellationToken,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => Ok(()),
            copied = async {
                tokio::io::copy(&mut stdin, &mut remote).await?;
                remote.flush().await
            } => copied,
        }
    })
}

/// Inspect the exec until it reports that it has stopped.
async fn wait_for_exit<G: ContainerEngine + ?Sized>(
    engine: &G,
    container_id: &str,
    exec_id: &str,
) -> Result<ExecResult, RunboxError> {
    loop {
        let inspected = engine.inspect_exec(exec_id).await?;
        if inspected.running {
            tokio::time::sleep(Duration::from_millis(EXEC_INSPECT_POLL_INTERVAL_MS)).await;
            continue;
        }
        if inspected.exit_code.is_none() {
            return Err(exec_failed(
                container_id,
                format!("exec session '{exec_id}' completed without an exit code"),
            ));
        }
        tracing::debug!(exec_id, exit_code = ?inspected.exit_code, "exec session finished");
        return Ok(inspected);
    }
}
