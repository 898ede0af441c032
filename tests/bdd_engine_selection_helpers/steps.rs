//! Given/When steps for engine selection scenarios.

use std::path::{Path, PathBuf};

use mockable::MockEnv;
use runbox::engine::{BackendSelector, ContainerEngine, PodmanEndpoint};
use runbox::error::{ContainerError, RunboxError};
use rstest_bdd_macros::{given, when};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

use super::state::{Candidate, SelectionOutcome, SelectionState, StepResult};

const PING_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nOK";

fn push_candidate(selection_state: &SelectionState, candidate: Candidate) {
    let mut candidates = selection_state.candidates.get().unwrap_or_default();
    candidates.push(candidate);
    selection_state.candidates.set(candidates);
}

#[given("no Docker engine is listening")]
fn no_docker_engine(selection_state: &SelectionState) {
    selection_state.docker_uri.set(None);
}

#[given("the Docker endpoint is {uri}")]
fn docker_endpoint_is(selection_state: &SelectionState, uri: String) {
    selection_state.docker_uri.set(Some(uri));
}

#[given("a Podman candidate that is not listening")]
fn silent_candidate(selection_state: &SelectionState) {
    push_candidate(selection_state, Candidate::Silent);
}

#[given("a Podman candidate that answers pings")]
fn answering_candidate(selection_state: &SelectionState) {
    push_candidate(selection_state, Candidate::Answering);
}

#[given("the configured engine socket points at a missing socket")]
fn explicit_socket_is_missing(selection_state: &SelectionState) {
    selection_state.explicit_missing.set(true);
}

/// Answer every connection on `listener` with a successful libpod ping.
async fn answer_pings(listener: UnixListener) {
    while let Ok((mut stream, _)) = listener.accept().await {
        let mut received = Vec::new();
        let mut buffer = [0_u8; 1024];
        while !received.windows(4).any(|window| window == b"\r\n\r\n") {
            match stream.read(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(count) => received.extend_from_slice(buffer.get(..count).unwrap_or_default()),
            }
        }
        drop(stream.write_all(PING_RESPONSE).await);
        drop(stream.shutdown().await);
    }
}

fn env_with_docker_host(docker_uri: String) -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string()
        .returning(move |key| (key == "DOCKER_HOST").then(|| docker_uri.clone()));
    env
}

fn candidate_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("candidate-{index}.sock"))
}

fn attempt_kinds(error: RunboxError) -> (Vec<String>, String) {
    let message = error.to_string();
    let kinds = match error {
        RunboxError::Container(ContainerError::EngineUnavailable { attempts }) => attempts
            .into_iter()
            .map(|attempt| {
                attempt
                    .candidate
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_owned()
            })
            .collect(),
        _ => Vec::new(),
    };
    (kinds, message)
}

#[when("the engine is selected")]
fn engine_is_selected(selection_state: &SelectionState) -> StepResult<()> {
    let dir = tempfile::tempdir().map_err(|error| format!("failed to create tempdir: {error}"))?;
    let docker_uri = selection_state
        .docker_uri
        .get()
        .flatten()
        .unwrap_or_else(|| format!("unix://{}", dir.path().join("docker.sock").display()));
    let candidates = selection_state.candidates.get().unwrap_or_default();
    let explicit = selection_state
        .explicit_missing
        .get()
        .unwrap_or(false)
        .then(|| format!("unix://{}", dir.path().join("explicit.sock").display()));

    let env = env_with_docker_host(docker_uri);
    let endpoints = (0..candidates.len())
        .map(|index| PodmanEndpoint::Unix(candidate_path(dir.path(), index)))
        .collect();
    let selector = BackendSelector::new(&env)
        .with_configured_socket(explicit.as_deref())
        .with_candidates(endpoints);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|error| format!("failed to create runtime: {error}"))?;
    let outcome = runtime.block_on(async {
        let mut servers = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if *candidate == Candidate::Answering {
                let listener = UnixListener::bind(candidate_path(dir.path(), index))?;
                servers.push(tokio::spawn(answer_pings(listener)));
            }
        }
        let selected = selector.select().await;
        for server in servers {
            server.abort();
        }
        Ok::<_, std::io::Error>(match selected {
            Ok(session) => SelectionOutcome::Selected {
                engine: session.name(),
            },
            Err(error) => {
                let (attempts, message) = attempt_kinds(error);
                SelectionOutcome::Failed { attempts, message }
            }
        })
    });

    selection_state
        .outcome
        .set(outcome.map_err(|error| format!("failed to bind candidate socket: {error}"))?);
    Ok(())
}
