//! Server side of the control channel.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use appspawn_core::Endpoint;
use appspawn_core::protocol::{
    ControlRequest, ControlResponse, FailureKind, decode_frame, encode_frame,
};

use crate::frame::{read_frame, write_frame};

/// How long in-flight connections may take to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Answers control requests for one agent role.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    async fn handle(&self, request: ControlRequest) -> ControlResponse;
}

/// A bound control endpoint.
///
/// A unix socket file is removed when the listener is dropped.
pub enum ControlListener {
    Unix { listener: UnixListener, path: PathBuf },
    Tcp(TcpListener),
}

enum Connection {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl ControlListener {
    /// Bind `endpoint`.
    ///
    /// A leftover unix socket file is removed first, unless a live process
    /// still accepts connections on it.
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Unix(path) => {
                if path.exists() {
                    if UnixStream::connect(path).await.is_ok() {
                        return Err(io::Error::new(
                            io::ErrorKind::AddrInUse,
                            format!("{endpoint} is served by a live process"),
                        ));
                    }
                    debug!(path = %path.display(), "Removing stale socket file");
                    std::fs::remove_file(path)?;
                }
                let listener = UnixListener::bind(path)?;
                Ok(Self::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            Endpoint::Tcp(addr) => Ok(Self::Tcp(TcpListener::bind(addr).await?)),
        }
    }

    /// The endpoint clients should dial (the real port for TCP).
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Self::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
            Self::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?)),
        }
    }

    async fn accept(&self) -> io::Result<Connection> {
        match self {
            Self::Unix { listener, .. } => Ok(Connection::Unix(listener.accept().await?.0)),
            Self::Tcp(listener) => Ok(Connection::Tcp(listener.accept().await?.0)),
        }
    }

    /// Serve requests until `shutdown` is cancelled.
    ///
    /// Each connection runs in its own task, so a slow request never blocks
    /// another. After cancellation, in-flight replies get a short window to
    /// be written.
    pub async fn serve(self, handler: Arc<dyn ControlHandler>, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = self.accept() => accepted,
            };

            match accepted {
                Ok(Connection::Unix(stream)) => {
                    tracker.spawn(serve_stream(stream, Arc::clone(&handler), shutdown.clone()));
                }
                Ok(Connection::Tcp(stream)) => {
                    tracker.spawn(serve_stream(stream, Arc::clone(&handler), shutdown.clone()));
                }
                Err(e) => warn!(error = %e, "Failed to accept control connection"),
            }
        }

        tracker.close();
        if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait()).await.is_err() {
            debug!("Abandoning unfinished control connections");
        }
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        if let Self::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

async fn serve_stream<S>(stream: S, handler: Arc<dyn ControlHandler>, shutdown: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let response = match read_frame(&mut reader).await {
            Ok(None) => break,
            Ok(Some(line)) => match decode_frame::<ControlRequest>(&line) {
                Ok(request) => handler.handle(request).await,
                Err(e) => ControlResponse::failed(FailureKind::Unsupported, e.to_string()),
            },
            Err(e) => {
                debug!(error = %e, "Dropping control connection");
                break;
            }
        };

        let frame = match encode_frame(&response) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Cannot encode control response");
                break;
            }
        };
        if let Err(e) = write_frame(&mut write_half, &frame).await {
            debug!(error = %e, "Client went away before the reply");
            break;
        }
        if shutdown.is_cancelled() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ControlChannel;
    use tempfile::TempDir;

    struct Echo {
        shutdown: CancellationToken,
    }

    #[async_trait]
    impl ControlHandler for Echo {
        async fn handle(&self, request: ControlRequest) -> ControlResponse {
            match request {
                ControlRequest::Ping => ControlResponse::Pong { pid: 42 },
                ControlRequest::Shutdown => {
                    self.shutdown.cancel();
                    ControlResponse::ShuttingDown
                }
                _ => ControlResponse::failed(FailureKind::Unsupported, "nope"),
            }
        }
    }

    #[tokio::test]
    async fn serves_until_shutdown_and_removes_socket() {
        let tmp = TempDir::new().unwrap();
        let endpoint = Endpoint::Unix(tmp.path().join("agent.sock"));
        let listener = ControlListener::bind(&endpoint).await.unwrap();
        let shutdown = CancellationToken::new();
        let handler = Arc::new(Echo {
            shutdown: shutdown.clone(),
        });
        let server = tokio::spawn(listener.serve(handler, shutdown));

        let channel = ControlChannel::new(endpoint.clone(), Duration::from_secs(2));
        assert_eq!(channel.ping().await.unwrap(), 42);
        channel.shutdown().await.unwrap();

        server.await.unwrap();
        assert!(!endpoint.unix_path().unwrap().exists());
    }

    #[tokio::test]
    async fn refuses_live_socket_and_replaces_stale_one() {
        let tmp = TempDir::new().unwrap();
        let endpoint = Endpoint::Unix(tmp.path().join("agent.sock"));

        let first = ControlListener::bind(&endpoint).await.unwrap();
        let err = ControlListener::bind(&endpoint).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        drop(first);
        assert!(!endpoint.unix_path().unwrap().exists());

        // A socket file nobody listens on any more.
        let stale = Endpoint::Unix(tmp.path().join("stale.sock"));
        drop(std::os::unix::net::UnixListener::bind(stale.unix_path().unwrap()).unwrap());
        assert!(stale.unix_path().unwrap().exists());
        assert!(ControlListener::bind(&stale).await.is_ok());
    }

    #[tokio::test]
    async fn tcp_reports_real_port() {
        let listener = ControlListener::bind(&Endpoint::loopback_unbound())
            .await
            .unwrap();
        let endpoint = listener.local_endpoint().unwrap();
        assert!(!endpoint.is_unbound());
    }
}
