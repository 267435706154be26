//! # Message Protocol
//!
//! Defines the frames exchanged between the session server and its peers and
//! the frame codec that puts them on the wire:
//! - Authentication of a freshly connected peer
//! - Host arbitration (hostship request / resignation)
//! - Status and connection-count broadcasts from the server
//! - Opaque `Data` payloads carrying synchronized state
//!
//! ## Wire Layout
//!
//! ```text
//! [4 bytes: message type] [4 bytes: content length] [N bytes: content]
//! ```
//!
//! Both header fields are big-endian `u32`. Content is never interpreted by
//! the codec itself.

use bytes::{Buf, BufMut};

use super::error::{SyncError, SyncResult};
use super::status::Status;
use super::wire;

/// Size of the fixed frame header (type + length).
pub const HEADER_SIZE: usize = 8;

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Discriminant of a frame. Values are the on-wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    /// First message from a peer: session password and display name.
    Authentication = 0,
    /// Synchronized state; only the host's are fanned out.
    Data = 1,
    /// Server to peer: the recipient's status, the host name and the epoch.
    ConnectionStatus = 2,
    /// Peer asks to become host.
    HostshipRequest = 3,
    /// Host gives up hostship.
    HostshipResignation = 4,
    /// Server to peer: number of authenticated peers in the session.
    NConnections = 5,
}

impl TryFrom<u32> for MessageType {
    type Error = SyncError;

    fn try_from(tag: u32) -> SyncResult<Self> {
        match tag {
            0 => Ok(MessageType::Authentication),
            1 => Ok(MessageType::Data),
            2 => Ok(MessageType::ConnectionStatus),
            3 => Ok(MessageType::HostshipRequest),
            4 => Ok(MessageType::HostshipResignation),
            5 => Ok(MessageType::NConnections),
            other => Err(SyncError::MalformedFrame(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub content: Vec<u8>,
}

/// Decoded and validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: MessageType,
    pub length: usize,
}

impl FrameHeader {
    /// Parse the 8-byte header, rejecting unknown tags and frames larger
    /// than `max_frame_size`.
    pub fn parse(bytes: [u8; HEADER_SIZE], max_frame_size: usize) -> SyncResult<Self> {
        let mut buf = &bytes[..];
        let kind = MessageType::try_from(buf.get_u32())?;
        let length = buf.get_u32() as usize;

        if length > max_frame_size {
            return Err(SyncError::MalformedFrame(format!(
                "frame of {} bytes exceeds limit of {} bytes",
                length, max_frame_size
            )));
        }

        Ok(Self { kind, length })
    }
}

impl Message {
    pub fn new(kind: MessageType, content: Vec<u8>) -> Self {
        Self { kind, content }
    }

    /// A message with no content (hostship request / resignation).
    pub fn empty(kind: MessageType) -> Self {
        Self::new(kind, Vec::new())
    }

    /// Serialize this message into one complete frame.
    ///
    /// The length field is 32 bits wide; [`Message::ensure_fits`] must have
    /// accepted the message for the header to describe the content.
    ///
    /// # Example
    /// ```ignore
    /// let frame = Message::empty(MessageType::HostshipRequest).encode();
    /// assert_eq!(frame.len(), 8);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + self.content.len());
        frame.put_u32(self.kind as u32);
        frame.put_u32(self.content.len() as u32);
        frame.put_slice(&self.content);
        frame
    }

    /// Deserialize exactly one frame.
    ///
    /// # Returns
    /// - `Ok(Message)`: the frame was well formed
    /// - `Err(MalformedFrame)`: unknown tag, or the declared length does not
    ///   match the number of bytes supplied
    pub fn decode(frame: &[u8]) -> SyncResult<Self> {
        if frame.len() < HEADER_SIZE {
            return Err(SyncError::MalformedFrame(format!(
                "frame of {} bytes is shorter than its header",
                frame.len()
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&frame[..HEADER_SIZE]);
        let header = FrameHeader::parse(header, usize::MAX)?;

        let content = &frame[HEADER_SIZE..];
        if content.len() != header.length {
            return Err(SyncError::MalformedFrame(format!(
                "declared length {} but {} bytes available",
                header.length,
                content.len()
            )));
        }

        Ok(Self::new(header.kind, content.to_vec()))
    }

    /// Check that the content fits a frame under `limit` bytes.
    ///
    /// # Returns
    /// - `Err(FrameTooLarge)`: the content exceeds `limit` or the 32-bit
    ///   length field
    pub fn ensure_fits(&self, limit: usize) -> SyncResult<()> {
        let size = self.content.len();
        if size > limit || u32::try_from(size).is_err() {
            return Err(SyncError::FrameTooLarge { size, limit });
        }
        Ok(())
    }
}

// ============================================================================
// CONTROL PAYLOADS
// ============================================================================

/// Content of an `Authentication` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub password: String,
    pub name: String,
}

impl Authentication {
    pub fn to_message(&self) -> Message {
        let mut content = Vec::new();
        wire::put_string(&mut content, &self.password);
        wire::put_string(&mut content, &self.name);
        Message::new(MessageType::Authentication, content)
    }

    pub fn parse(content: &[u8]) -> SyncResult<Self> {
        let mut buf = content;
        let password = wire::get_string(&mut buf, "password")?;
        let name = wire::get_string(&mut buf, "peer name")?;
        wire::expect_end(buf, "authentication")?;
        Ok(Self { password, name })
    }
}

/// Content of a `ConnectionStatus` message.
///
/// `epoch` increases with every hostship grant. Receivers keep the newest
/// epoch they have seen and ignore anything older.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub status: Status,
    pub host_name: Option<String>,
    pub epoch: u64,
}

impl ConnectionStatus {
    pub fn to_message(&self) -> Message {
        let mut content = Vec::new();
        content.put_u32(self.status as u32);
        wire::put_string(&mut content, self.host_name.as_deref().unwrap_or(""));
        content.put_u64(self.epoch);
        Message::new(MessageType::ConnectionStatus, content)
    }

    pub fn parse(content: &[u8]) -> SyncResult<Self> {
        let mut buf = content;
        let status = Status::try_from(wire::get_u32(&mut buf, "status")?)?;
        let host_name = wire::get_string(&mut buf, "host name")?;
        let epoch = wire::get_u64(&mut buf, "epoch")?;
        wire::expect_end(buf, "connection status")?;

        Ok(Self {
            status,
            host_name: (!host_name.is_empty()).then_some(host_name),
            epoch,
        })
    }
}

/// Build an `NConnections` message.
pub fn connection_count_message(count: u32) -> Message {
    Message::new(MessageType::NConnections, count.to_be_bytes().to_vec())
}

/// Parse the content of an `NConnections` message.
pub fn parse_connection_count(content: &[u8]) -> SyncResult<u32> {
    let mut buf = content;
    let count = wire::get_u32(&mut buf, "connection count")?;
    wire::expect_end(buf, "connection count")?;
    Ok(count)
}
