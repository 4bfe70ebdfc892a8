//! Control-channel wire format.
//!
//! Every message is one JSON object on one line. A spawned process writes a
//! [`Handshake`] as the first line of its stdout; afterwards all traffic
//! goes over its endpoint as [`ControlRequest`] / [`ControlResponse`] pairs.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::{Endpoint, ProcessHandle, SpawnOptions, StatusReport};
use crate::error::ProtocolError;

/// Maximum length of a single frame, newline included.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Readiness report written by a child on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Handshake {
    /// The child is listening on `endpoint`.
    Ready { pid: u32, endpoint: Endpoint },
    /// The child could not become ready.
    Failed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_output: Option<String>,
    },
}

/// Command sent to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlRequest {
    Ping,
    Spawn { options: SpawnOptions },
    Status,
    Shutdown,
}

/// Category of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Starting the worker failed; the backend is still serviceable.
    Spawn,
    /// The request was rejected before any process was created.
    InvalidOptions,
    /// The agent does not support this command in its role.
    Unsupported,
}

/// Reply from an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlResponse {
    Pong {
        pid: u32,
    },
    Spawned {
        handle: ProcessHandle,
    },
    Status {
        report: StatusReport,
    },
    ShuttingDown,
    Failed {
        kind: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_output: Option<String>,
    },
}

impl ControlResponse {
    /// Short name used in protocol error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pong { .. } => "pong",
            Self::Spawned { .. } => "spawned",
            Self::Status { .. } => "status",
            Self::ShuttingDown => "shutting_down",
            Self::Failed { .. } => "failed",
        }
    }

    /// Build a failure reply.
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
            app_output: None,
        }
    }
}

/// Encode a message as a single newline-terminated frame.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line =
        serde_json::to_string(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    line.push('\n');
    if line.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            limit: MAX_FRAME_LEN,
        });
    }
    Ok(line)
}

/// Decode one frame (trailing newline optional).
pub fn decode_frame<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    if line.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            limit: MAX_FRAME_LEN,
        });
    }
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(ProtocolError::Closed);
    }
    serde_json::from_str(trimmed).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
