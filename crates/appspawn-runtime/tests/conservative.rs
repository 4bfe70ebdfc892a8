//! Conservative spawning: one cold boot per worker.

#![cfg(unix)]

mod common;

use std::time::Duration;

use appspawn_core::{
    AgentRole, BootKind, Settings, SpawnMethod, Spawner, SpawnerError, Transport,
};
use appspawn_runtime::pidfile::is_live_process;
use appspawn_runtime::process::wait_for_exit;
use appspawn_runtime::{ConservativeSpawner, ControlChannel, WorkerStop, stop_worker};

use common::fixtures::AppStub;
use common::{Harness, agent_path, cleanup};

fn spawner(harness: &Harness) -> ConservativeSpawner {
    ConservativeSpawner::new(&harness.settings()).expect("spawner setup")
}

#[tokio::test]
async fn every_spawn_boots_from_scratch() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let spawner = spawner(&harness);
    let options = app.options().with_spawn_method(SpawnMethod::Conservative);

    let first = spawner.spawn_application(&options).await.unwrap();
    let second = spawner.spawn_application(&options).await.unwrap();

    assert_ne!(first.pid, second.pid);
    assert_ne!(first.endpoint, second.endpoint);
    assert_eq!(first.spawn_method, SpawnMethod::Conservative);
    assert_eq!(app.load_count(), 2);

    let report = ControlChannel::new(first.endpoint.clone(), Duration::from_secs(2))
        .status()
        .await
        .unwrap();
    assert_eq!(report.role, AgentRole::Worker);
    assert_eq!(report.boot, BootKind::Cold);
    assert_eq!(report.app_env["APP_NAME"], "stub");

    cleanup(&first).await;
    cleanup(&second).await;
}

#[tokio::test]
async fn workers_are_independent() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let spawner = spawner(&harness);

    let first = spawner.spawn_application(&app.options()).await.unwrap();
    let second = spawner.spawn_application(&app.options()).await.unwrap();

    let stop = stop_worker(
        &first,
        Some(&agent_path()),
        Duration::from_secs(2),
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert_eq!(stop, WorkerStop::Stopped);
    assert!(!is_live_process(first.pid));

    let pid = ControlChannel::new(second.endpoint.clone(), Duration::from_secs(2))
        .ping()
        .await
        .expect("second worker still answers");
    assert_eq!(pid, second.pid);
    cleanup(&second).await;
}

#[tokio::test]
async fn failing_application_is_a_spawn_error() {
    let harness = Harness::new();
    let app = AppStub::failing();
    let spawner = spawner(&harness);

    let err = spawner.spawn_application(&app.options()).await.unwrap_err();
    match err {
        SpawnerError::Spawn(err) => {
            let output = err.app_output().expect("application output");
            assert!(output.contains("LoadError: cannot load such file -- missing_dep"));
        }
        other => panic!("expected a spawn error, got {other:?}"),
    }

    // A failure leaves no socket behind.
    let sockets = std::fs::read_dir(harness.run_dir().join("sockets")).unwrap();
    assert_eq!(sockets.count(), 0);
}

#[tokio::test]
async fn timed_out_cold_boot_leaves_no_application_process() {
    let harness = Harness::new();
    let app = AppStub::slow(45);
    let spawner = ConservativeSpawner::new(&Settings {
        spawn_timeout_secs: Some(2),
        ..harness.settings()
    })
    .unwrap();

    let err = spawner.spawn_application(&app.options()).await.unwrap_err();
    assert!(matches!(err, SpawnerError::Spawn(_)), "{err:?}");

    let sleeper = app.sleeper_pid().expect("startup file was running");
    assert!(wait_for_exit(sleeper, Duration::from_secs(2)).await);
}

#[tokio::test]
async fn closing_owner_pipe_stops_worker() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let spawner = spawner(&harness);

    let handle = spawner.spawn_application(&app.options()).await.unwrap();
    assert!(handle.has_owner_pipe());

    if let Some(pipe) = &handle.owner_pipe {
        pipe.close();
    }
    assert!(wait_for_exit(handle.pid, Duration::from_secs(5)).await);
    assert!(
        handle
            .endpoint
            .unix_path()
            .is_none_or(|path| !path.exists())
    );
}

#[tokio::test]
async fn detached_worker_survives_its_handle() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let spawner = spawner(&harness);

    let handle = spawner
        .spawn_application(&app.options().detached(true))
        .await
        .unwrap();
    assert!(!handle.has_owner_pipe());

    let pid = handle.pid;
    let endpoint = handle.endpoint.clone();
    drop(handle);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let answered = ControlChannel::new(endpoint.clone(), Duration::from_secs(2))
        .ping()
        .await
        .expect("detached worker still answers");
    assert_eq!(answered, pid);

    let handle = appspawn_core::ProcessHandle::new(pid, endpoint, SpawnMethod::Conservative);
    cleanup(&handle).await;
}

#[tokio::test]
async fn invalid_options_create_no_process() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let spawner = spawner(&harness);

    let err = spawner
        .spawn_application(&app.options().with_environment(" "))
        .await
        .unwrap_err();
    assert!(matches!(err, SpawnerError::InvalidOptions(_)));
    assert_eq!(app.load_count(), 0);
}

#[tokio::test]
async fn tcp_workers_report_their_port() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let settings = appspawn_core::Settings {
        transport: Some(Transport::Tcp),
        ..harness.settings()
    };
    let spawner = ConservativeSpawner::new(&settings).unwrap();

    let handle = spawner.spawn_application(&app.options()).await.unwrap();
    assert_eq!(handle.endpoint.transport(), Transport::Tcp);
    assert!(!handle.endpoint.is_unbound());

    let pid = ControlChannel::new(handle.endpoint.clone(), Duration::from_secs(2))
        .ping()
        .await
        .unwrap();
    assert_eq!(pid, handle.pid);
    cleanup(&handle).await;
}
