//! Spawn command handler.
//!
//! Smart spawns go through the backend recorded for the application when
//! one is running, otherwise through a backend started for this one
//! request and stopped again once the worker is up.

use tracing::debug;

use appspawn_core::{ProcessHandle, Settings, SpawnOptions, Spawner};
use appspawn_runtime::{
    BackendLocation, ConservativeSpawner, PreloadingSpawnServer, resolve_agent_path, stop_worker,
};

use crate::backend::RecordedBackend;
use crate::commands::SpawnArgs;
use crate::error::CliError;
use crate::handlers::stop_worker::report_stop;
use crate::presentation::format_handle;

/// Spawn one worker with `spawner` and print its handle.
pub async fn execute(spawner: &dyn Spawner, options: &SpawnOptions) -> Result<ProcessHandle, CliError> {
    let handle = spawner.spawn_application(options).await?;
    let json = format_handle(&handle).map_err(|e| CliError::Process(e.to_string()))?;
    println!("{json}");
    Ok(handle)
}

/// Pick a spawner for `args`, spawn, and unless detached keep the worker
/// until Ctrl-C.
pub async fn run(settings: &Settings, args: &SpawnArgs) -> Result<(), CliError> {
    let options = args.to_options();

    let handle = if args.conservative {
        let spawner = ConservativeSpawner::new(settings)?;
        execute(&spawner, &options).await?
    } else {
        let location = BackendLocation::for_app(&options.app_root, settings)?;
        match RecordedBackend::find(&location, settings).await {
            Some(backend) => {
                debug!(pid = backend.pid(), "Spawning through running backend");
                execute(&backend, &options).await?
            }
            None => {
                let server = PreloadingSpawnServer::new(options.clone(), settings)?;
                server.start().await?;
                let spawned = execute(&server, &options).await;
                server.stop().await?;
                spawned?
            }
        }
    };

    if args.detach {
        return Ok(());
    }

    eprintln!(
        "Worker PID {} is attached to this terminal; press Ctrl-C to stop it.",
        handle.pid
    );
    tokio::signal::ctrl_c().await?;

    let agent = resolve_agent_path(settings).ok();
    let outcome = stop_worker(
        &handle,
        agent.as_deref(),
        settings.stop_grace(),
        settings.ping_timeout(),
    )
    .await?;
    report_stop(handle.pid, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appspawn_core::{Endpoint, OptionsError, SpawnMethod, SpawnerError};
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::always;

    mock! {
        pub TestSpawner {}

        #[async_trait]
        impl Spawner for TestSpawner {
            async fn spawn_application(
                &self,
                options: &SpawnOptions,
            ) -> Result<ProcessHandle, SpawnerError>;
        }
    }

    fn endpoint() -> Endpoint {
        "unix:/tmp/appspawn-test/worker.sock".parse().unwrap()
    }

    #[tokio::test]
    async fn returns_the_spawned_handle() {
        let mut spawner = MockTestSpawner::new();
        spawner
            .expect_spawn_application()
            .withf(|options| options.env.get("WORKERS").map(String::as_str) == Some("2"))
            .times(1)
            .returning(|_| Ok(ProcessHandle::new(4242, endpoint(), SpawnMethod::Smart)));

        let options = SpawnOptions::new("/srv/app").with_env("WORKERS", "2");
        let handle = execute(&spawner, &options).await.unwrap();
        assert_eq!(handle.pid, 4242);
        assert_eq!(handle.endpoint, endpoint());
    }

    #[tokio::test]
    async fn invalid_options_become_argument_errors() {
        let mut spawner = MockTestSpawner::new();
        spawner
            .expect_spawn_application()
            .with(always())
            .times(1)
            .returning(|_| Err(OptionsError::EmptyEnvironment.into()));

        let err = execute(&spawner, &SpawnOptions::new("/srv/app"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn unavailable_backend_is_reported() {
        let mut spawner = MockTestSpawner::new();
        spawner
            .expect_spawn_application()
            .times(1)
            .returning(|_| Err(SpawnerError::BackendUnavailable("backend is not running".into())));

        let err = execute(&spawner, &SpawnOptions::new("/srv/app"))
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Unavailable(_)));
        assert_eq!(err.to_string(), "backend is not running");
    }
}
