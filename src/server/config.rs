use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::connection::DEFAULT_MAX_FRAME_SIZE;
use crate::common::error::{SyncError, SyncResult};

/// Complete session server configuration loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// [server]
/// address = "0.0.0.0:20501"
/// password = "planetarium"
///
/// [session]
/// auth_timeout_ms = 5000
/// outbound_queue_capacity = 256
/// write_grace_ms = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerInfo,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Address the listener binds to (e.g. "0.0.0.0:20501")
    pub address: String,
    /// Shared session password; `None` admits every peer
    #[serde(default)]
    pub password: Option<String>,
}

/// Timing and resource limits of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long a new peer may take to authenticate (milliseconds)
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    /// Messages buffered per peer before it is dropped for backpressure
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Largest accepted frame content (bytes)
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// How long a removed peer's writer may keep flushing queued frames
    /// before its socket is dropped (milliseconds)
    #[serde(default = "default_write_grace_ms")]
    pub write_grace_ms: u64,
}

fn default_auth_timeout_ms() -> u64 {
    5_000
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_write_grace_ms() -> u64 {
    1_000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_timeout_ms: default_auth_timeout_ms(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            max_frame_size: default_max_frame_size(),
            write_grace_ms: default_write_grace_ms(),
        }
    }
}

impl SessionConfig {
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn write_grace(&self) -> Duration {
        Duration::from_millis(self.write_grace_ms)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.outbound_queue_capacity == 0 {
            return Err(SyncError::InvalidConfig("outbound_queue_capacity must be at least 1"));
        }
        Ok(())
    }
}
