//! Control endpoints: where a spawned process can be reached.
//!
//! Text form (used on the wire, in pid files and on the command line):
//! ```text
//! unix:/run/appspawn/sockets/backend-1a2b.sock
//! tcp://127.0.0.1:41234
//! ```

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Transport used by a control channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Unix domain socket (default).
    #[default]
    Unix,
    /// Loopback TCP.
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => write!(f, "unix"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

impl FromStr for Transport {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unix" => Ok(Self::Unix),
            "tcp" => Ok(Self::Tcp),
            other => Err(EndpointParseError::UnknownTransport(other.to_string())),
        }
    }
}

/// Errors from parsing an endpoint or transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("unknown transport '{0}' (expected 'unix' or 'tcp')")]
    UnknownTransport(String),

    #[error("endpoint '{0}' must start with 'unix:' or 'tcp://'")]
    MissingScheme(String),

    #[error("unix endpoint path must be absolute: {0}")]
    RelativePath(String),

    #[error("invalid TCP address '{0}'")]
    InvalidAddress(String),

    #[error("TCP endpoints must be bound to loopback, got {0}")]
    NotLoopback(SocketAddr),
}

/// Address of a control channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Unix domain socket at an absolute path.
    Unix(PathBuf),
    /// Loopback TCP address.
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Loopback TCP endpoint with port 0; the child binds and reports the real port.
    pub const fn loopback_unbound() -> Self {
        Self::Tcp(SocketAddr::new(
            std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
        ))
    }

    /// Transport of this endpoint.
    pub const fn transport(&self) -> Transport {
        match self {
            Self::Unix(_) => Transport::Unix,
            Self::Tcp(_) => Transport::Tcp,
        }
    }

    /// Socket file path for unix endpoints.
    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp(_) => None,
        }
    }

    /// True for a TCP endpoint whose port is still to be assigned.
    pub const fn is_unbound(&self) -> bool {
        matches!(self, Self::Tcp(addr) if addr.port() == 0)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix:") {
            let path = PathBuf::from(path);
            if !path.is_absolute() {
                return Err(EndpointParseError::RelativePath(path.display().to_string()));
            }
            return Ok(Self::Unix(path));
        }

        if let Some(addr) = s.strip_prefix("tcp://") {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|_| EndpointParseError::InvalidAddress(addr.to_string()))?;
            if !addr.ip().is_loopback() {
                return Err(EndpointParseError::NotLoopback(addr));
            }
            return Ok(Self::Tcp(addr));
        }

        Err(EndpointParseError::MissingScheme(s.to_string()))
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
