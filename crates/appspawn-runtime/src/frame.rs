//! Bounded line reading for control traffic.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use appspawn_core::ProtocolError;
use appspawn_core::protocol::MAX_FRAME_LEN;

/// Error reading or writing one frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Read one newline-terminated frame.
///
/// Returns `Ok(None)` at EOF. Never buffers more than [`MAX_FRAME_LEN`]
/// bytes, so a peer that never sends a newline cannot exhaust memory.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(MAX_FRAME_LEN).unwrap_or(u64::MAX);
    let n = (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') && n >= MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            limit: MAX_FRAME_LEN,
        }
        .into());
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| ProtocolError::Malformed(e.to_string()).into())
}

/// Write one already-encoded frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_frames_then_eof() {
        let data: &[u8] = b"{\"command\":\"ping\"}\n{\"command\":\"status\"}";
        let mut reader = BufReader::new(data);

        assert_eq!(
            read_frame(&mut reader).await.unwrap().as_deref(),
            Some("{\"command\":\"ping\"}\n")
        );
        assert_eq!(
            read_frame(&mut reader).await.unwrap().as_deref(),
            Some("{\"command\":\"status\"}")
        );
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let data = vec![b'a'; MAX_FRAME_LEN + 10];
        let mut reader = BufReader::new(data.as_slice());

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::Protocol(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
