//! Connection status shared by the coordinator and the connecting peer.

use serde::Serialize;

use super::error::{SyncError, SyncResult};

/// Status of one participant in the session.
///
/// The discriminants are the values carried in `ConnectionStatus` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Status {
    Disconnected = 0,
    Connecting = 1,
    ClientWithoutHost = 2,
    ClientWithHost = 3,
    Host = 4,
}

impl Status {
    pub fn is_host(self) -> bool {
        self == Status::Host
    }

    /// Authenticated participants (everything past `Connecting`).
    pub fn is_authenticated(self) -> bool {
        matches!(
            self,
            Status::ClientWithoutHost | Status::ClientWithHost | Status::Host
        )
    }
}

impl TryFrom<u32> for Status {
    type Error = SyncError;

    fn try_from(value: u32) -> SyncResult<Self> {
        match value {
            0 => Ok(Status::Disconnected),
            1 => Ok(Status::Connecting),
            2 => Ok(Status::ClientWithoutHost),
            3 => Ok(Status::ClientWithHost),
            4 => Ok(Status::Host),
            other => Err(SyncError::MalformedPayload(format!(
                "unknown status value {}",
                other
            ))),
        }
    }
}
