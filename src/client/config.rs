use serde::{Deserialize, Serialize};

use crate::common::connection::DEFAULT_MAX_FRAME_SIZE;
use crate::common::error::{SyncError, SyncResult};

/// Configuration of a connecting instance, loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// [client]
/// name = "Dome"
/// server_address = "127.0.0.1:20501"
/// password = "planetarium"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client: ClientInfo,
    #[serde(default)]
    pub session: ClientSessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Display name announced to the other instances
    pub name: String,
    /// Address of the session server (e.g. "127.0.0.1:20501")
    pub server_address: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSessionConfig {
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    /// Decoded events buffered for the renderer
    #[serde(default = "default_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Frames buffered for sending
    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for ClientSessionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            event_queue_capacity: default_queue_capacity(),
            outbound_queue_capacity: default_queue_capacity(),
        }
    }
}

impl ClientSessionConfig {
    /// Reject values the peer cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.event_queue_capacity == 0 {
            return Err(SyncError::InvalidConfig("event_queue_capacity must be at least 1"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(SyncError::InvalidConfig("outbound_queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Build a configuration without a file.
    pub fn new(name: impl Into<String>, server_address: impl Into<String>, password: Option<String>) -> Self {
        Self {
            client: ClientInfo {
                name: name.into(),
                server_address: server_address.into(),
                password,
            },
            session: ClientSessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::load_config;
    use std::io::Write;

    #[test]
    fn test_load_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[client]\nname = \"Dome\"\nserver_address = \"127.0.0.1:20501\""
        )
        .unwrap();

        let config: ClientConfig = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.client.name, "Dome");
        assert!(config.client.password.is_none());
        assert!(config.session.validate().is_ok());
    }

    #[test]
    fn test_zero_capacities_are_rejected() {
        let mut config = ClientConfig::new("Dome", "127.0.0.1:20501", None);
        config.session.event_queue_capacity = 0;
        assert!(matches!(
            config.session.validate(),
            Err(SyncError::InvalidConfig(_))
        ));

        config.session.event_queue_capacity = 1;
        config.session.outbound_queue_capacity = 0;
        assert!(matches!(
            config.session.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
