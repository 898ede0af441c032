//! Minimal libpod REST client over a per-request HTTP/1.1 connection.

use bytes::Bytes;
use http_body_util::{BodyExt, BodyStream, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::endpoint::PodmanEndpoint;

/// Failure talking to a Podman service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PodmanError {
    /// The endpoint could not be connected to.
    #[error("{message}")]
    Connect {
        /// Kind of the underlying I/O error.
        kind: std::io::ErrorKind,
        /// A description of the connection failure.
        message: String,
    },

    /// The HTTP exchange broke off.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with an unexpected status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// A request or response body could not be encoded or decoded.
    #[error("invalid payload: {0}")]
    Decode(String),
}

impl PodmanError {
    /// Return the HTTP status carried by the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Connect { .. } | Self::Transport(_) | Self::Decode(_) => None,
        }
    }
}

fn transport(error: impl std::fmt::Display) -> PodmanError {
    PodmanError::Transport(error.to_string())
}

fn decode(error: impl std::fmt::Display) -> PodmanError {
    PodmanError::Decode(error.to_string())
}

/// libpod error body.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: String,
}

/// Extract the most useful message from a failed response body.
pub(super) fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() => parsed.message,
        Ok(parsed) if !parsed.cause.is_empty() => parsed.cause,
        _ => String::from_utf8_lossy(body).trim().to_owned(),
    }
}

/// Client for the libpod REST API.
///
/// Each request opens its own connection, so the client holds no sockets and
/// is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodmanClient {
    endpoint: PodmanEndpoint,
    api_version: String,
}

impl PodmanClient {
    /// Create a client for `endpoint` speaking libpod API `api_version`.
    #[must_use]
    pub fn new(endpoint: PodmanEndpoint, api_version: impl Into<String>) -> Self {
        Self {
            endpoint,
            api_version: api_version.into(),
        }
    }

    /// Return the endpoint the client connects to.
    #[must_use]
    pub const fn endpoint(&self) -> &PodmanEndpoint {
        &self.endpoint
    }

    /// Return the libpod API version used in request paths.
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Build the versioned request path for `relative`.
    #[must_use]
    pub fn path(&self, relative: &str) -> String {
        format!(
            "/v{}/libpod/{}",
            self.api_version,
            relative.trim_start_matches('/')
        )
    }

    /// Check that the service answers.
    ///
    /// # Errors
    ///
    /// Returns `PodmanError` when the service cannot be reached or does not
    /// answer with success.
    pub async fn ping(&self) -> Result<(), PodmanError> {
        self.call(Method::GET, "_ping", None, &[], &[]).await?;
        Ok(())
    }

    /// Send a `GET` and decode the JSON response.
    pub(super) async fn get_json<T: DeserializeOwned>(
        &self,
        relative: &str,
    ) -> Result<T, PodmanError> {
        let body = self.call(Method::GET, relative, None, &[], &[]).await?;
        serde_json::from_slice(&body).map_err(decode)
    }

    /// Send a JSON `POST` and decode the JSON response.
    pub(super) async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        relative: &str,
        payload: &B,
    ) -> Result<T, PodmanError> {
        let encoded = serde_json::to_vec(payload).map_err(decode)?;
        let body = self
            .call(Method::POST, relative, Some(Bytes::from(encoded)), &[], &[])
            .await?;
        serde_json::from_slice(&body).map_err(decode)
    }

    /// Send a request and return the collected response body.
    ///
    /// A status outside 2xx is an error unless it is listed in `tolerated`.
    pub(super) async fn call(
        &self,
        method: Method,
        relative: &str,
        body: Option<Bytes>,
        headers: &[(HeaderName, String)],
        tolerated: &[u16],
    ) -> Result<Bytes, PodmanError> {
        let request = self.build_request(method, relative, body, headers)?;
        let response = self.send(request).await?;
        let status = response.status();
        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(transport)?
            .to_bytes();
        if status.is_success() || tolerated.contains(&status.as_u16()) {
            Ok(collected)
        } else {
            Err(PodmanError::Status {
                status: status.as_u16(),
                message: error_message(&collected),
            })
        }
    }

    /// Send a request and return the response body frame by frame.
    ///
    /// A status outside 2xx is collected into an error.
    pub(super) async fn call_streaming(
        &self,
        method: Method,
        relative: &str,
        headers: &[(HeaderName, String)],
    ) -> Result<BodyStream<Incoming>, PodmanError> {
        let request = self.build_request(method, relative, None, headers)?;
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let collected = response
                .into_body()
                .collect()
                .await
                .map_err(transport)?
                .to_bytes();
            return Err(PodmanError::Status {
                status: status.as_u16(),
                message: error_message(&collected),
            });
        }
        Ok(BodyStream::new(response.into_body()))
    }

    /// Send a JSON `POST` asking the service to hijack the connection.
    ///
    /// Returns the raw bidirectional stream once the service has switched
    /// protocols.
    pub(super) async fn upgrade<B: Serialize + Sync>(
        &self,
        relative: &str,
        payload: &B,
    ) -> Result<TokioIo<Upgraded>, PodmanError> {
        let encoded = serde_json::to_vec(payload).map_err(decode)?;
        let upgrade_headers = [
            (header::CONNECTION, String::from("Upgrade")),
            (header::UPGRADE, String::from("tcp")),
        ];
        let request = self.build_request(
            Method::POST,
            relative,
            Some(Bytes::from(encoded)),
            &upgrade_headers,
        )?;
        let response = self.send(request).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            let status = response.status().as_u16();
            let collected = response
                .into_body()
                .collect()
                .await
                .map_err(transport)?
                .to_bytes();
            return Err(PodmanError::Status {
                status,
                message: error_message(&collected),
            });
        }
        let upgraded = hyper::upgrade::on(response).await.map_err(transport)?;
        Ok(TokioIo::new(upgraded))
    }

    fn build_request(
        &self,
        method: Method,
        relative: &str,
        body: Option<Bytes>,
        headers: &[(HeaderName, String)],
    ) -> Result<Request<Full<Bytes>>, PodmanError> {
        let mut builder = Request::builder()
            .method(method)
            .uri(self.path(relative))
            .header(header::HOST, self.endpoint.host_header());
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        for (name, value) in headers {
            let header_value = HeaderValue::from_str(value).map_err(decode)?;
            builder = builder.header(name, header_value);
        }
        builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(decode)
    }

    async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Incoming>, PodmanError> {
        let stream = self
            .endpoint
            .connect()
            .await
            .map_err(|e| PodmanError::Connect {
                kind: e.kind(),
                message: format!("connecting to {}: {e}", self.endpoint),
            })?;
        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(transport)?;
        tokio::spawn(async move {
            if let Err(e) = connection.with_upgrades().await {
                tracing::debug!(error = %e, "podman connection closed with error");
            }
        });
        sender.send_request(request).await.map_err(transport)
    }
}
