//! Status reports returned over the control channel.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role an agent process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Long-lived backend holding preloaded application state
    Preloader,
    /// Application worker
    Worker,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preloader => write!(f, "preloader"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// How the application was brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootKind {
    /// Loaded in this process
    Cold,
    /// Inherited from a preloading backend
    Warm,
}

/// Snapshot of an agent's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub pid: u32,
    pub role: AgentRole,
    pub boot: BootKind,
    pub app_root: PathBuf,
    pub environment: String,
    pub loaded_at: DateTime<Utc>,
    pub uptime_secs: u64,
    /// Workers started so far (preloader only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers_spawned: Option<u64>,
    /// Application environment the worker runs with (worker only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub app_env: BTreeMap<String, String>,
}
