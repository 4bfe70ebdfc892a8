//! The `appspawn-agent` process.
//!
//! One binary, two roles. A **preloader** loads the application once and
//! starts warm workers on request. A **worker** is the application
//! process a dispatcher talks to; it boots either cold (loading the
//! application itself) or warm (from a preloader's state).
//!
//! Both roles follow the same sequence: read the boot frame from stdin,
//! load, bind the endpoint, write the handshake to stdout, serve until
//! told to stop. Logs go to stderr only.

mod listener;
mod loader;
mod preloader;
mod worker;

use std::io;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, BufReader, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use appspawn_core::protocol::{Handshake, decode_frame, encode_frame};
use appspawn_core::{Endpoint, ProtocolError};

use crate::frame::{read_frame, write_frame};

pub use listener::{ControlHandler, ControlListener};
pub use loader::{LoadFailure, load_application, parse_exports};
pub use preloader::{PreloaderConfig, run_preloader};
pub use worker::run_worker;

/// Why an agent exited with a failure.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid boot frame: {0}")]
    Boot(String),

    #[error("{0}")]
    Load(String),

    #[error("cannot listen on {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

type StdinReader = BufReader<Stdin>;

fn stdin_reader() -> StdinReader {
    BufReader::new(tokio::io::stdin())
}

/// Read and decode the boot frame. Failures are also reported as a
/// `failed` handshake so the supervisor sees the reason.
async fn read_boot<T, R>(reader: &mut R) -> Result<T, AgentError>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    let message = match read_frame(reader).await {
        Ok(Some(line)) => match decode_frame(&line) {
            Ok(boot) => return Ok(boot),
            Err(e) => e.to_string(),
        },
        Ok(None) => "stdin closed before the boot frame".to_string(),
        Err(e) => e.to_string(),
    };
    Err(report_failure(AgentError::Boot(message), None).await)
}

/// Write the handshake line.
async fn report(handshake: &Handshake) -> Result<(), AgentError> {
    let frame = encode_frame(handshake)?;
    let mut stdout = tokio::io::stdout();
    write_frame(&mut stdout, &frame).await?;
    Ok(())
}

/// Report `err` as a failed handshake and hand it back.
async fn report_failure(err: AgentError, app_output: Option<String>) -> AgentError {
    let handshake = Handshake::Failed {
        message: err.to_string(),
        app_output,
    };
    if let Err(e) = report(&handshake).await {
        warn!(error = %e, "Could not report failure on stdout");
    }
    err
}

/// Bind the endpoint, reporting a failed handshake if that is impossible.
async fn bind_or_report(endpoint: &Endpoint) -> Result<ControlListener, AgentError> {
    match ControlListener::bind(endpoint).await {
        Ok(listener) => Ok(listener),
        Err(source) => Err(report_failure(
            AgentError::Bind {
                endpoint: endpoint.clone(),
                source,
            },
            None,
        )
        .await),
    }
}

/// Report readiness for `listener`'s endpoint.
async fn report_ready(listener: &ControlListener) -> Result<Endpoint, AgentError> {
    let endpoint = listener.local_endpoint()?;
    report(&Handshake::Ready {
        pid: std::process::id(),
        endpoint: endpoint.clone(),
    })
    .await?;
    Ok(endpoint)
}

/// Cancel `token` on SIGTERM or SIGINT.
fn cancel_on_signals(token: CancellationToken) {
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut term), Ok(mut int)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            warn!("Cannot install signal handlers");
            return;
        };
        tokio::select! {
            _ = term.recv() => info!("SIGTERM received, shutting down"),
            _ = int.recv() => info!("SIGINT received, shutting down"),
        }
        token.cancel();
    });

    #[cfg(not(unix))]
    let _ = token;
}
