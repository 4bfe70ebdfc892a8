//! Async stream readers for child output (non-UTF8-safe).
//!
//! Applications can emit arbitrary bytes on stderr. `BufReader::lines()`
//! would end the reader on invalid UTF-8, so lines are read as bytes and
//! decoded lossily.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

use super::logs::DiagnosticsBuffer;

/// Drain `stream` line by line into `buffer` until EOF.
pub fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pid: u32,
    stream_type: &'static str,
    buffer: Arc<DiagnosticsBuffer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let line = String::from_utf8_lossy(&buf).into_owned();
                    debug!(pid, %stream_type, "{}", line);
                    buffer.push(line);
                }
                Err(e) => {
                    debug!(pid, %stream_type, error = %e, "stream reader exiting due to read error");
                    break;
                }
            }
        }
    })
}
