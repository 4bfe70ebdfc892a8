//! Spawning through a backend started by an earlier `appspawn start`.

use async_trait::async_trait;

use appspawn_core::protocol::{ControlRequest, ControlResponse};
use appspawn_core::{
    Diagnostics, ProcessHandle, ProtocolError, Settings, SpawnError, SpawnOptions, Spawner,
    SpawnerError,
};
use appspawn_runtime::pidfile::read_pidfile;
use appspawn_runtime::{BackendLocation, ChannelError, ControlChannel, spawn_reply_deadline};

/// A detached backend found through its pid file.
#[derive(Debug, Clone)]
pub struct RecordedBackend {
    pid: u32,
    channel: ControlChannel,
}

impl RecordedBackend {
    /// The backend recorded at `location`, if it answers with the recorded PID.
    pub async fn find(location: &BackendLocation, settings: &Settings) -> Option<Self> {
        let record = read_pidfile(&location.pidfile).ok()?;
        let channel = ControlChannel::new(record.endpoint, settings.ping_timeout());
        channel.ping_pid(record.pid).await.ok()?;
        Some(Self {
            pid: record.pid,
            channel: channel.with_timeout(spawn_reply_deadline(
                settings.spawn_timeout(),
                settings.ping_timeout(),
            )),
        })
    }

    pub const fn new(pid: u32, channel: ControlChannel) -> Self {
        Self { pid, channel }
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

#[async_trait]
impl Spawner for RecordedBackend {
    async fn spawn_application(
        &self,
        options: &SpawnOptions,
    ) -> Result<ProcessHandle, SpawnerError> {
        options.validate()?;
        let request = ControlRequest::Spawn {
            options: options.clone(),
        };
        match self.channel.request(&request).await {
            Ok(ControlResponse::Spawned { handle }) => Ok(handle),
            Ok(ControlResponse::Failed {
                message,
                app_output,
                ..
            }) => {
                let mut diagnostics = Diagnostics::default();
                diagnostics.app_output = app_output;
                Err(SpawnError::new(message).with_diagnostics(diagnostics).into())
            }
            Ok(other) => Err(ProtocolError::UnexpectedResponse {
                expected: "spawned",
                got: other.name().to_string(),
            }
            .into()),
            Err(ChannelError::Protocol(e)) => Err(e.into()),
            Err(e) => Err(SpawnerError::BackendUnavailable(format!(
                "backend (PID {}) is not answering: {e}",
                self.pid
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use appspawn_core::Endpoint;
    use appspawn_core::protocol::{FailureKind, encode_frame};
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixListener;

    fn app_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("startup.sh"), "true\n").unwrap();
        dir
    }

    /// Answer one request with `response`.
    fn one_shot(path: &std::path::Path, response: ControlResponse) -> tokio::task::JoinHandle<()> {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = tokio::io::split(stream);
            let mut line = String::new();
            BufReader::new(read_half).read_line(&mut line).await.unwrap();
            let frame = encode_frame(&response).unwrap();
            write_half.write_all(frame.as_bytes()).await.unwrap();
        })
    }

    #[tokio::test]
    async fn failed_spawn_keeps_application_output() {
        let tmp = TempDir::new().unwrap();
        let app = app_dir();
        let socket = tmp.path().join("backend.sock");
        let server = one_shot(
            &socket,
            ControlResponse::Failed {
                kind: FailureKind::Spawn,
                message: "worker failed".to_string(),
                app_output: Some("boom\n".to_string()),
            },
        );

        let backend = RecordedBackend::new(
            1,
            ControlChannel::new(Endpoint::Unix(socket), Duration::from_secs(2)),
        );
        let err = backend
            .spawn_application(&SpawnOptions::new(app.path()))
            .await
            .unwrap_err();
        match err {
            SpawnerError::Spawn(err) => assert_eq!(err.app_output(), Some("boom\n")),
            other => panic!("expected a spawn error, got {other:?}"),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_backend_is_unavailable() {
        let tmp = TempDir::new().unwrap();
        let app = app_dir();
        let backend = RecordedBackend::new(
            4242,
            ControlChannel::new(
                Endpoint::Unix(tmp.path().join("gone.sock")),
                Duration::from_millis(200),
            ),
        );
        let err = backend
            .spawn_application(&SpawnOptions::new(app.path()))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, SpawnerError::BackendUnavailable(msg) if msg.contains("4242")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn find_without_pid_file() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            run_dir: Some(tmp.path().to_path_buf()),
            ..Settings::with_defaults()
        };
        let app = app_dir();
        let location = BackendLocation::for_app(app.path(), &settings).unwrap();
        assert!(RecordedBackend::find(&location, &settings).await.is_none());
    }
}
