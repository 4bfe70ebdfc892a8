//! Application stubs.
//!
//! Each stub is a directory with a `startup.sh` in the shape the agent
//! expects: exports on stdout, a non-zero exit on failure.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use appspawn_core::SpawnOptions;

/// Name of the file each load appends a line to.
pub const LOAD_LOG: &str = "loads.log";

/// Name of the file a slow stub records its sleeping process in.
pub const SLEEPER_PID: &str = "sleeper.pid";

pub struct AppStub {
    dir: TempDir,
}

impl AppStub {
    fn with_script(script: &str) -> Self {
        let dir = TempDir::new().expect("create app dir");
        fs::write(dir.path().join("startup.sh"), script).expect("write startup file");
        Self { dir }
    }

    /// Loads fine, exports `APP_NAME` and records every load.
    pub fn valid() -> Self {
        Self::with_script(&format!(
            "echo \"loaded $$\" >> {LOAD_LOG}\necho 'booting stub'\necho APP_NAME=stub\n"
        ))
    }

    /// Fails to load with a recognisable error on stderr.
    pub fn failing() -> Self {
        Self::with_script(
            "echo 'LoadError: cannot load such file -- missing_dep' >&2\necho '  from startup.sh:1' >&2\nexit 1\n",
        )
    }

    /// Takes `secs` seconds to load, in a background `sleep` whose PID is
    /// recorded in [`SLEEPER_PID`].
    pub fn slow(secs: u64) -> Self {
        Self::with_script(&format!(
            "sleep {secs} &\necho $! > {SLEEPER_PID}\nwait\necho READY=1\n"
        ))
    }

    /// Exports the given pairs, plus `MODE` echoing `APP_ENV`.
    pub fn exporting(pairs: &[(&str, &str)]) -> Self {
        let mut script = String::from("echo \"MODE=$APP_ENV\"\n");
        for (key, value) in pairs {
            script.push_str(&format!("echo 'export {key}={value}'\n"));
        }
        Self::with_script(&script)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn options(&self) -> SpawnOptions {
        SpawnOptions::new(self.path())
    }

    /// PID of the process a slow stub is sleeping in, once it started.
    pub fn sleeper_pid(&self) -> Option<u32> {
        fs::read_to_string(self.path().join(SLEEPER_PID))
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }

    /// How many times the startup file ran.
    pub fn load_count(&self) -> usize {
        fs::read_to_string(self.path().join(LOAD_LOG))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }
}
