//! Common test utilities.
//!
//! Application stubs on disk and settings that point the runtime at the
//! freshly built agent binary and a throwaway run directory.

#![allow(dead_code)]

pub mod fixtures;

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use appspawn_core::Settings;
use appspawn_runtime::{WorkerStop, stop_worker};
use appspawn_core::ProcessHandle;

/// Path of the agent built for this test run.
pub fn agent_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_appspawn-agent"))
}

/// Run directory plus settings using it.
pub struct Harness {
    run_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            run_dir: TempDir::new().expect("create run dir"),
        }
    }

    /// Settings with short timeouts, the test agent and this run directory.
    pub fn settings(&self) -> Settings {
        Settings {
            start_timeout_secs: Some(15),
            spawn_timeout_secs: Some(15),
            stop_grace_secs: Some(2),
            agent_path: Some(agent_path()),
            run_dir: Some(self.run_dir.path().to_path_buf()),
            ..Settings::with_defaults()
        }
    }

    pub fn run_dir(&self) -> &std::path::Path {
        self.run_dir.path()
    }
}

/// Stop a worker and make sure it is gone.
pub async fn cleanup(handle: &ProcessHandle) {
    let stop = stop_worker(
        handle,
        Some(&agent_path()),
        Duration::from_secs(2),
        Duration::from_secs(1),
    )
    .await
    .expect("stop worker");
    assert_ne!(stop, WorkerStop::NotOurs);
}
