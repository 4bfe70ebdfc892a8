//! Client side of the control channel.
//!
//! Every request dials a fresh connection, sends one frame and reads one
//! frame back. No connection is shared, so concurrent callers never
//! serialize behind each other and a slow spawn cannot block a ping.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::time::timeout;

use appspawn_core::protocol::{ControlRequest, ControlResponse, decode_frame, encode_frame};
use appspawn_core::{Endpoint, ProtocolError, ServerError, StatusReport};

use crate::frame::{FrameError, read_frame, write_frame};

/// Error talking to an agent.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Nothing accepted the connection.
    #[error("cannot connect to {endpoint}: {source}")]
    Unreachable {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("{endpoint} did not answer within {timeout:?}")]
    TimedOut { endpoint: Endpoint, timeout: Duration },

    #[error("I/O error on {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<ChannelError> for ServerError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Protocol(e) => Self::Protocol(e),
            ChannelError::Unreachable { source, .. } | ChannelError::Io { source, .. } => {
                Self::Io(source)
            }
            timed_out @ ChannelError::TimedOut { .. } => Self::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                timed_out.to_string(),
            )),
        }
    }
}

/// Request/response client for one endpoint.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    endpoint: Endpoint,
    timeout: Duration,
}

impl ControlChannel {
    pub const fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Same endpoint with a different per-request timeout.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            timeout,
        }
    }

    /// Send one request and wait for its response.
    pub async fn request(&self, request: &ControlRequest) -> Result<ControlResponse, ChannelError> {
        let frame = encode_frame(request)?;
        timeout(self.timeout, self.exchange(&frame))
            .await
            .map_err(|_| ChannelError::TimedOut {
                endpoint: self.endpoint.clone(),
                timeout: self.timeout,
            })?
    }

    /// Liveness check. Returns the PID that answered.
    pub async fn ping(&self) -> Result<u32, ChannelError> {
        match self.request(&ControlRequest::Ping).await? {
            ControlResponse::Pong { pid } => Ok(pid),
            other => Err(unexpected("pong", &other)),
        }
    }

    /// Ping and require that `expected` is the process answering.
    pub async fn ping_pid(&self, expected: u32) -> Result<(), ChannelError> {
        let actual = self.ping().await?;
        if actual == expected {
            Ok(())
        } else {
            Err(ProtocolError::PidMismatch { expected, actual }.into())
        }
    }

    /// Ask the agent for its status report.
    pub async fn status(&self) -> Result<StatusReport, ChannelError> {
        match self.request(&ControlRequest::Status).await? {
            ControlResponse::Status { report } => Ok(report),
            other => Err(unexpected("status", &other)),
        }
    }

    /// Ask the agent to exit. Returns once the request is acknowledged.
    pub async fn shutdown(&self) -> Result<(), ChannelError> {
        match self.request(&ControlRequest::Shutdown).await? {
            ControlResponse::ShuttingDown => Ok(()),
            other => Err(unexpected("shutting_down", &other)),
        }
    }

    async fn exchange(&self, frame: &str) -> Result<ControlResponse, ChannelError> {
        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|source| self.unreachable(source))?;
                self.exchange_on(stream, frame).await
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .map_err(|source| self.unreachable(source))?;
                self.exchange_on(stream, frame).await
            }
        }
    }

    async fn exchange_on<S>(&self, stream: S, frame: &str) -> Result<ControlResponse, ChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);
        write_frame(&mut write_half, frame)
            .await
            .map_err(|source| self.io(source))?;

        let mut reader = BufReader::new(read_half);
        match read_frame(&mut reader).await {
            Ok(Some(line)) => Ok(decode_frame(&line)?),
            Ok(None) => Err(ProtocolError::Closed.into()),
            Err(FrameError::Protocol(e)) => Err(e.into()),
            Err(FrameError::Io(source)) => Err(self.io(source)),
        }
    }

    fn unreachable(&self, source: io::Error) -> ChannelError {
        ChannelError::Unreachable {
            endpoint: self.endpoint.clone(),
            source,
        }
    }

    fn io(&self, source: io::Error) -> ChannelError {
        ChannelError::Io {
            endpoint: self.endpoint.clone(),
            source,
        }
    }
}

fn unexpected(expected: &'static str, got: &ControlResponse) -> ChannelError {
    let got = match got {
        ControlResponse::Failed { message, .. } => format!("failed ({message})"),
        other => other.name().to_string(),
    };
    ProtocolError::UnexpectedResponse { expected, got }.into()
}
