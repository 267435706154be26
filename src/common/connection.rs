//! # TCP Connection Abstraction
//!
//! Wraps a TCP stream with the session frame codec.
//!
//! ## Wire Protocol
//!
//! ```text
//! [4 bytes: message type] [4 bytes: content length] [N bytes: content]
//! ```
//!
//! A [`Connection`] can be used whole, or split with
//! [`Connection::into_split`] so that one task reads while another writes.
//! Both halves share a [`LinkState`] that reports whether the socket is still
//! usable.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::error::{SyncError, SyncResult};
use super::messages::{FrameHeader, Message, HEADER_SIZE};

/// Default maximum accepted frame size (16MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const CONNECTING: u8 = 0;
const CONNECTED: u8 = 1;
const CLOSED: u8 = 2;

/// Shared open/closed flag of one socket.
///
/// Cheap to clone; every clone observes the same socket.
#[derive(Debug, Clone)]
pub struct LinkState(Arc<AtomicU8>);

impl LinkState {
    pub fn connecting() -> Self {
        Self(Arc::new(AtomicU8::new(CONNECTING)))
    }

    pub fn connected() -> Self {
        Self(Arc::new(AtomicU8::new(CONNECTED)))
    }

    pub fn mark_connected(&self) {
        // A closed link never reopens.
        let _ = self
            .0
            .compare_exchange(CONNECTING, CONNECTED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn mark_closed(&self) {
        self.0.store(CLOSED, Ordering::Release);
    }

    pub fn is_connected_or_connecting(&self) -> bool {
        self.0.load(Ordering::Acquire) != CLOSED
    }
}

/// Reading half of a connection.
pub struct FrameReader {
    stream: OwnedReadHalf,
    state: LinkState,
    max_frame_size: usize,
}

/// Writing half of a connection.
pub struct FrameWriter {
    stream: OwnedWriteHalf,
    state: LinkState,
    max_frame_size: usize,
}

/// TCP connection carrying whole protocol messages.
pub struct Connection {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Connection {
    /// Wrap an established TCP stream.
    pub fn new(stream: TcpStream, max_frame_size: usize) -> Self {
        Self::with_state(stream, LinkState::connected(), max_frame_size)
    }

    fn with_state(stream: TcpStream, state: LinkState, max_frame_size: usize) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FrameReader {
                stream: read_half,
                state: state.clone(),
                max_frame_size,
            },
            writer: FrameWriter {
                stream: write_half,
                state,
                max_frame_size,
            },
        }
    }

    /// Open a TCP connection to `address`.
    ///
    /// # Example
    /// ```ignore
    /// let mut conn = Connection::connect("127.0.0.1:20501", DEFAULT_MAX_FRAME_SIZE).await?;
    /// ```
    pub async fn connect<A: ToSocketAddrs>(address: A, max_frame_size: usize) -> SyncResult<Self> {
        let state = LinkState::connecting();
        let stream = TcpStream::connect(address).await.map_err(|e| {
            state.mark_closed();
            SyncError::Io(e)
        })?;
        stream.set_nodelay(true)?;
        state.mark_connected();
        Ok(Self::with_state(stream, state, max_frame_size))
    }

    pub async fn send(&mut self, message: &Message) -> SyncResult<()> {
        self.writer.send(message).await
    }

    pub async fn receive(&mut self) -> SyncResult<Option<Message>> {
        self.reader.receive().await
    }

    pub async fn close(&mut self) {
        self.writer.close().await;
    }

    pub fn is_connected_or_connecting(&self) -> bool {
        self.writer.state.is_connected_or_connecting()
    }

    /// Handle on the shared open/closed flag.
    pub fn state(&self) -> LinkState {
        self.writer.state.clone()
    }

    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}

impl FrameReader {
    /// Read one complete message.
    ///
    /// # Returns
    /// - `Ok(Some(Message))`: a whole frame arrived
    /// - `Ok(None)`: the peer closed the stream on a frame boundary
    /// - `Err(MalformedFrame)`: the header was invalid; the link is unusable
    /// - `Err(Io)`: read failure, including EOF inside a frame
    pub async fn receive(&mut self) -> SyncResult<Option<Message>> {
        let result = self.read_frame().await;
        if !matches!(result, Ok(Some(_))) {
            self.state.mark_closed();
        }
        result
    }

    async fn read_frame(&mut self) -> SyncResult<Option<Message>> {
        let mut header = [0u8; HEADER_SIZE];

        // Distinguish a clean close (zero bytes of a new frame) from a
        // truncated frame.
        let first = self.stream.read(&mut header).await?;
        if first == 0 {
            debug!("🔌 Peer closed the stream");
            return Ok(None);
        }
        self.stream.read_exact(&mut header[first..]).await?;

        let header = FrameHeader::parse(header, self.max_frame_size)?;

        let mut content = vec![0u8; header.length];
        self.stream.read_exact(&mut content).await?;

        Ok(Some(Message::new(header.kind, content)))
    }

    pub fn state(&self) -> LinkState {
        self.state.clone()
    }
}

impl FrameWriter {
    /// Write one complete message and flush it.
    ///
    /// # Returns
    /// - `Err(FrameTooLarge)`: nothing was written, the link stays usable
    /// - `Err(Io)`: the write failed and the link is closed
    pub async fn send(&mut self, message: &Message) -> SyncResult<()> {
        if !self.state.is_connected_or_connecting() {
            return Err(SyncError::ConnectionClosed);
        }
        message.ensure_fits(self.max_frame_size)?;

        let frame = message.encode();
        let result = async {
            self.stream.write_all(&frame).await?;
            self.stream.flush().await
        }
        .await;

        if let Err(e) = result {
            self.state.mark_closed();
            return Err(SyncError::Io(e));
        }
        Ok(())
    }

    /// Shut down the write side and mark the link closed.
    pub async fn close(&mut self) {
        self.state.mark_closed();
        let _ = self.stream.shutdown().await;
    }

    pub fn state(&self) -> LinkState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::messages::MessageType;
    use tokio::net::TcpListener;

    async fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let client = Connection::connect(address, DEFAULT_MAX_FRAME_SIZE);
        let (client, accepted) = tokio::join!(client, listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_send_and_receive_whole_frames() {
        let (mut client, server) = pair().await;
        let mut server = Connection::new(server, DEFAULT_MAX_FRAME_SIZE);

        let first = Message::new(MessageType::Data, vec![7; 1024]);
        let second = Message::empty(MessageType::HostshipRequest);
        client.send(&first).await.unwrap();
        client.send(&second).await.unwrap();

        assert_eq!(server.receive().await.unwrap(), Some(first));
        assert_eq!(server.receive().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_clean_close_yields_none() {
        let (mut client, server) = pair().await;
        let mut server = Connection::new(server, DEFAULT_MAX_FRAME_SIZE);

        client.close().await;
        assert!(!client.is_connected_or_connecting());

        assert!(server.receive().await.unwrap().is_none());
        assert!(!server.is_connected_or_connecting());
    }

    #[tokio::test]
    async fn test_unknown_tag_is_malformed() {
        let (client, mut server) = pair().await;
        let (mut reader, _writer) = client.into_split();

        server.write_all(&[0, 0, 0, 9, 0, 0, 0, 0]).await.unwrap();

        assert!(matches!(
            reader.receive().await,
            Err(SyncError::MalformedFrame(_))
        ));
        assert!(!reader.state().is_connected_or_connecting());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_refused_before_writing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(Connection::connect(address, 16), listener.accept());
        let mut client = client.unwrap();
        let mut server = Connection::new(accepted.unwrap().0, DEFAULT_MAX_FRAME_SIZE);

        assert!(matches!(
            client.send(&Message::new(MessageType::Data, vec![0; 17])).await,
            Err(SyncError::FrameTooLarge { size: 17, limit: 16 })
        ));
        assert!(client.is_connected_or_connecting());

        // The stream is still aligned on a frame boundary.
        let small = Message::new(MessageType::Data, vec![1; 16]);
        client.send(&small).await.unwrap();
        assert_eq!(server.receive().await.unwrap(), Some(small));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_an_error() {
        let (client, mut server) = pair().await;
        let (mut reader, _writer) = client.into_split();

        let frame = Message::new(MessageType::Data, vec![1, 2, 3, 4]).encode();
        server.write_all(&frame[..10]).await.unwrap();
        drop(server);

        assert!(matches!(reader.receive().await, Err(SyncError::Io(_))));
    }
}
