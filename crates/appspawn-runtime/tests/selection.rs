//! Strategy selection from the spawn method hint.

#![cfg(unix)]

mod common;

use appspawn_core::{SpawnMethod, Spawner};
use appspawn_runtime::select_spawner;

use common::fixtures::AppStub;
use common::{Harness, cleanup};

#[tokio::test]
async fn smart_hint_preloads_once() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let options = app.options().with_spawn_method(SpawnMethod::Smart);

    let strategy = select_spawner(&options, &harness.settings()).unwrap();
    assert_eq!(strategy.method(), SpawnMethod::Smart);
    strategy.prepare().await.expect("start backend");

    let first = strategy.spawn_application(&options).await.unwrap();
    let second = strategy.spawn_application(&options).await.unwrap();
    assert_eq!(first.spawn_method, SpawnMethod::Smart);
    assert_eq!(app.load_count(), 1);

    cleanup(&first).await;
    cleanup(&second).await;
    strategy.shutdown().await.unwrap();
}

#[tokio::test]
async fn conservative_hint_needs_no_backend() {
    let harness = Harness::new();
    let app = AppStub::valid();
    let options = app
        .options()
        .with_spawn_method(SpawnMethod::Conservative);

    let strategy = select_spawner(&options, &harness.settings()).unwrap();
    assert_eq!(strategy.method(), SpawnMethod::Conservative);
    strategy.prepare().await.unwrap();

    let handle = strategy.spawn_application(&options).await.unwrap();
    assert_eq!(handle.spawn_method, SpawnMethod::Conservative);
    assert_eq!(app.load_count(), 1);

    cleanup(&handle).await;
    strategy.shutdown().await.unwrap();
}

#[test]
fn smart_hint_with_invalid_root_fails_setup() {
    let harness = Harness::new();
    let options = appspawn_core::SpawnOptions::new("/nonexistent/appspawn/app");
    assert!(select_spawner(&options, &harness.settings()).is_err());
}
