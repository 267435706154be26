//! # Session Errors
//!
//! Error taxonomy shared by the codec, the transport, the coordinator and the
//! connecting peer. Errors are split into two families:
//!
//! - **Connection-fatal**: the offending link is closed and its peer removed
//!   from the session (`MalformedFrame`, `AuthenticationTimeout`,
//!   `AuthenticationFailed`, `BackpressureOverflow`, `ConnectionClosed`, `Io`)
//! - **Recoverable**: a single message is dropped or a local request is
//!   refused, the link stays up (`UnknownDataSubtype`, `MalformedPayload`,
//!   `FrameTooLarge`, `NotHost`, `HostshipRequestDenied`, `InvalidTransition`)
//!
//! `InvalidConfig` is raised before any link exists.

use thiserror::Error;

use super::status::Status;

/// Errors produced by the session synchronization layer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The frame header or its declared length does not describe a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The content of a known message could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The peer did not authenticate within the configured deadline.
    #[error("peer did not authenticate in time")]
    AuthenticationTimeout,

    /// The peer presented the wrong session password.
    #[error("authentication rejected")]
    AuthenticationFailed,

    /// A Data message carried a subtype this build does not understand.
    #[error("unknown data subtype {0}")]
    UnknownDataSubtype(u32),

    /// An outgoing message does not fit in one frame; nothing was written.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The peer's outbound queue was full.
    #[error("outbound queue overflow")]
    BackpressureOverflow,

    /// A host-only operation was attempted by a non-host.
    #[error("operation requires host status")]
    NotHost,

    /// Another peer already holds hostship.
    #[error("hostship request denied")]
    HostshipRequestDenied,

    /// The peer state machine does not allow this event in its current status.
    #[error("invalid transition {event} from {from:?}")]
    InvalidTransition { from: Status, event: &'static str },

    /// The link is already closed.
    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether this error must tear down the connection it occurred on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::MalformedFrame(_)
                | SyncError::AuthenticationTimeout
                | SyncError::AuthenticationFailed
                | SyncError::BackpressureOverflow
                | SyncError::ConnectionClosed
                | SyncError::Io(_)
        )
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
