//! Handles to spawned application processes.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::process::ChildStdin;

use super::endpoint::Endpoint;
use super::options::SpawnMethod;

/// Lifecycle state of a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Process exists but has not completed its handshake
    Starting,
    /// Process completed its handshake and answers on its endpoint
    Running,
    /// Process was stopped on request
    Stopped,
    /// Process exited without being asked to
    Crashed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

/// Write end of a worker's stdin, held by whoever owns the worker.
///
/// A worker booted with an owner pipe shuts itself down once it reads EOF,
/// which happens when the last clone of this pipe is closed or dropped.
#[derive(Clone)]
pub struct OwnerPipe {
    inner: Arc<Mutex<Option<ChildStdin>>>,
}

impl OwnerPipe {
    /// Wrap a child's stdin.
    pub fn new(stdin: ChildStdin) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(stdin))),
        }
    }

    /// Close the pipe for every clone. The worker sees EOF and exits.
    pub fn close(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.take();
        }
    }

    /// Whether the pipe is still open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for OwnerPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerPipe")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Handle to a spawned, addressable application process.
///
/// Returned by every [`Spawner`](crate::ports::Spawner). The dispatcher
/// connects to `endpoint` to forward requests; the spawner that produced
/// the handle keeps the right to kill `pid` during its own shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessHandle {
    /// Process ID of the worker.
    pub pid: u32,
    /// Control endpoint the worker answers on.
    pub endpoint: Endpoint,
    /// Lifecycle state at the time the handle was produced or last updated.
    pub state: ProcessState,
    /// Strategy that produced this worker.
    pub spawn_method: SpawnMethod,
    /// Unix timestamp (seconds) when the worker became ready.
    pub started_at: u64,
    /// Owner pipe, when the worker watches its stdin for EOF.
    #[serde(skip)]
    pub owner_pipe: Option<OwnerPipe>,
}

impl ProcessHandle {
    /// Create a handle for a worker that just completed its handshake.
    pub fn new(pid: u32, endpoint: Endpoint, spawn_method: SpawnMethod) -> Self {
        Self {
            pid,
            endpoint,
            state: ProcessState::Running,
            spawn_method,
            started_at: now_secs(),
            owner_pipe: None,
        }
    }

    /// Attach the worker's owner pipe.
    #[must_use]
    pub fn with_owner_pipe(mut self, pipe: OwnerPipe) -> Self {
        self.owner_pipe = Some(pipe);
        self
    }

    /// Whether this handle holds an open owner pipe.
    pub fn has_owner_pipe(&self) -> bool {
        self.owner_pipe.as_ref().is_some_and(OwnerPipe::is_open)
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
