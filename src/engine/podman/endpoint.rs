//! Podman endpoint parsing and raw transport connections.

use std::fmt;
use std::io;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ContainerError;

/// Byte stream to a Podman service.
pub trait EngineIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> EngineIo for T {}

/// Where a Podman service listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodmanEndpoint {
    /// A Unix domain socket.
    Unix(PathBuf),
    /// A plain TCP `host:port` address.
    Tcp(String),
    /// A Windows named pipe such as `\\.\pipe\podman-machine-default`.
    NamedPipe(String),
}

impl PodmanEndpoint {
    /// Parse an endpoint URI.
    ///
    /// Accepts `unix://`, `tcp://`, `http://` and `npipe://` URIs as well as
    /// bare socket paths. Named pipes are written either as `npipe:////./pipe/name`
    /// or as a bare `\\.\pipe\name`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::UnsupportedEndpoint` for empty input and for
    /// any other scheme (including `ssh://` and `https://`).
    pub fn parse(uri: &str) -> Result<Self, ContainerError> {
        let trimmed = uri.trim();
        let unsupported = || ContainerError::UnsupportedEndpoint {
            endpoint: uri.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(unsupported());
        }

        if let Some(path) = trimmed.strip_prefix("unix://") {
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if let Some(address) = trimmed
            .strip_prefix("tcp://")
            .or_else(|| trimmed.strip_prefix("http://"))
        {
            let host_port = address.trim_end_matches('/');
            if host_port.is_empty() {
                return Err(unsupported());
            }
            return Ok(Self::Tcp(host_port.to_owned()));
        }
        if let Some(pipe) = trimmed.strip_prefix("npipe://") {
            return Ok(Self::NamedPipe(pipe.replace('/', "\\")));
        }
        if trimmed.starts_with("\\\\") {
            return Ok(Self::NamedPipe(trimmed.to_owned()));
        }
        if trimmed.contains("://") {
            return Err(unsupported());
        }
        Ok(Self::Unix(PathBuf::from(trimmed)))
    }

    /// Value for the HTTP `Host` header.
    #[must_use]
    pub fn host_header(&self) -> &str {
        match self {
            Self::Tcp(address) => address,
            Self::Unix(_) | Self::NamedPipe(_) => "d",
        }
    }

    /// Open a new connection to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the connection cannot be opened,
    /// or `Unsupported` for a transport this platform lacks.
    pub async fn connect(&self) -> io::Result<Box<dyn EngineIo>> {
        match self {
            #[cfg(unix)]
            Self::Unix(path) => Ok(Box::new(tokio::net::UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            Self::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unix sockets are unavailable on this platform: {}", path.display()),
            )),
            Self::Tcp(address) => Ok(Box::new(tokio::net::TcpStream::connect(address).await?)),
            #[cfg(windows)]
            Self::NamedPipe(name) => Ok(Box::new(
                tokio::net::windows::named_pipe::ClientOptions::new().open(name)?,
            )),
            #[cfg(not(windows))]
            Self::NamedPipe(name) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("named pipes are unavailable on this platform: {name}"),
            )),
        }
    }
}

impl fmt::Display for PodmanEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(address) => write!(f, "tcp://{address}"),
            Self::NamedPipe(name) => write!(f, "npipe://{}", name.replace('\\', "/")),
        }
    }
}
