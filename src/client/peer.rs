//! # Sync Peer
//!
//! The connecting side of a session: one visualization instance that joins a
//! [`SessionServer`](crate::server::SessionServer), follows the host's state
//! and, while it is host itself, publishes its own.
//!
//! ## Responsibilities
//!
//! - **Admission**: connects and authenticates with name and password
//! - **Status tracking**: applies `ConnectionStatus` broadcasts, newest epoch
//!   wins
//! - **Delivery**: decodes the host's `Data` frames into [`SyncEvent`]s for
//!   the renderer
//! - **Publishing**: refuses locally with [`SyncError::NotHost`] unless this
//!   instance is host
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (peer, mut events) = SyncPeer::connect(&config).await?;
//! peer.request_hostship().await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Sync(event) => renderer.apply(event),
//!         SessionEvent::Disconnected => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, RwLock};

use super::config::ClientConfig;
use crate::common::connection::{Connection, FrameReader, FrameWriter, LinkState};
use crate::common::error::{SyncError, SyncResult};
use crate::common::messages::{
    parse_connection_count, Authentication, ConnectionStatus, Message, MessageType,
};
use crate::common::status::Status;
use crate::sync::{DataDispatcher, SyncEvent};

/// Notifications delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged {
        status: Status,
        host: Option<String>,
        epoch: u64,
    },
    ConnectionCount(u32),
    /// A hostship request of ours was turned down.
    HostshipDenied,
    Sync(SyncEvent),
    Disconnected,
}

/// What this instance currently knows about the session.
#[derive(Debug, Clone)]
struct PeerState {
    status: Status,
    host_name: Option<String>,
    epoch: u64,
    connections: u32,
    hostship_pending: bool,
}

impl Default for PeerState {
    fn default() -> Self {
        Self {
            status: Status::Connecting,
            host_name: None,
            epoch: 0,
            connections: 0,
            hostship_pending: false,
        }
    }
}

/// One instance taking part in a synchronized session.
pub struct SyncPeer {
    name: String,
    outbound: mpsc::Sender<Message>,
    state: Arc<RwLock<PeerState>>,
    link: LinkState,
    max_frame_size: usize,
}

impl SyncPeer {
    /// Connect to the session server and authenticate.
    ///
    /// # Returns
    /// - The peer handle, used to request hostship and publish events
    /// - The receiver of [`SessionEvent`]s decoded from the session
    pub async fn connect(config: &ClientConfig) -> SyncResult<(Self, mpsc::Receiver<SessionEvent>)> {
        config.session.validate()?;
        let mut connection =
            Connection::connect(&config.client.server_address, config.session.max_frame_size).await?;

        let auth = Authentication {
            password: config.client.password.clone().unwrap_or_default(),
            name: config.client.name.clone(),
        };
        connection.send(&auth.to_message()).await?;
        info!(
            "🤝 '{}' connected to {}",
            config.client.name, config.client.server_address
        );

        let link = connection.state();
        let (reader, writer) = connection.into_split();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.session.outbound_queue_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.session.event_queue_capacity);
        let state = Arc::new(RwLock::new(PeerState::default()));

        tokio::spawn(write_frames(writer, outbound_rx));
        tokio::spawn(read_frames(reader, state.clone(), events_tx));

        let peer = Self {
            name: config.client.name.clone(),
            outbound: outbound_tx,
            state,
            link,
            max_frame_size: config.session.max_frame_size,
        };
        Ok((peer, events_rx))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn status(&self) -> Status {
        self.state.read().await.status
    }

    pub async fn host_name(&self) -> Option<String> {
        self.state.read().await.host_name.clone()
    }

    pub async fn epoch(&self) -> u64 {
        self.state.read().await.epoch
    }

    pub async fn connection_count(&self) -> u32 {
        self.state.read().await.connections
    }

    pub fn is_connected_or_connecting(&self) -> bool {
        self.link.is_connected_or_connecting()
    }

    /// Ask the server for hostship. The answer arrives as a
    /// [`SessionEvent::StatusChanged`] or [`SessionEvent::HostshipDenied`].
    pub async fn request_hostship(&self) -> SyncResult<()> {
        {
            let mut state = self.state.write().await;
            if state.status.is_host() {
                return Ok(());
            }
            state.hostship_pending = true;
        }
        info!("🙋 '{}' requesting hostship", self.name);
        self.send(Message::empty(MessageType::HostshipRequest)).await
    }

    /// Give up hostship.
    pub async fn resign_hostship(&self) -> SyncResult<()> {
        if !self.status().await.is_host() {
            return Err(SyncError::NotHost);
        }
        info!("👋 '{}' resigning hostship", self.name);
        self.send(Message::empty(MessageType::HostshipResignation)).await
    }

    /// Publish a state snapshot to every other instance.
    ///
    /// Rejected locally with [`SyncError::NotHost`] unless this instance is
    /// host, and with [`SyncError::FrameTooLarge`] if the snapshot does not
    /// fit one frame; nothing is sent in either case.
    pub async fn publish(&self, event: &SyncEvent) -> SyncResult<()> {
        if !self.status().await.is_host() {
            return Err(SyncError::NotHost);
        }
        let message = DataDispatcher::encode(event).to_message();
        message.ensure_fits(self.max_frame_size)?;
        self.send(message).await
    }

    /// Close the connection. Queued frames are flushed first.
    pub fn disconnect(self) {
        info!("🔌 '{}' leaving the session", self.name);
        // Dropping `outbound` ends the writer task, which shuts the socket.
    }

    async fn send(&self, message: Message) -> SyncResult<()> {
        if !self.link.is_connected_or_connecting() {
            return Err(SyncError::ConnectionClosed);
        }
        self.outbound
            .send(message)
            .await
            .map_err(|_| SyncError::ConnectionClosed)
    }
}

async fn write_frames(mut writer: FrameWriter, mut outbound: mpsc::Receiver<Message>) {
    while let Some(message) = outbound.recv().await {
        match writer.send(&message).await {
            Ok(()) => {}
            Err(e @ SyncError::FrameTooLarge { .. }) => {
                warn!("⚠️  Not sending {:?}: {}", message.kind, e);
            }
            Err(e) => {
                error!("❌ Failed to send {:?}: {}", message.kind, e);
                return;
            }
        }
    }
    writer.close().await;
}

async fn read_frames(
    mut reader: FrameReader,
    state: Arc<RwLock<PeerState>>,
    events: mpsc::Sender<SessionEvent>,
) {
    loop {
        match reader.receive().await {
            Ok(Some(message)) => {
                if let Some(event) = handle_message(&state, message).await {
                    if events.send(event).await.is_err() {
                        debug!("Event receiver dropped");
                    }
                }
            }
            Ok(None) => {
                info!("🔌 Session server closed the connection");
                break;
            }
            Err(e) => {
                error!("❌ Connection to session server failed: {}", e);
                break;
            }
        }
    }

    state.write().await.status = Status::Disconnected;
    let _ = events.send(SessionEvent::Disconnected).await;
}

/// Apply one frame from the server. Returns the event to surface, if any.
async fn handle_message(state: &RwLock<PeerState>, message: Message) -> Option<SessionEvent> {
    match message.kind {
        MessageType::ConnectionStatus => {
            let update = match ConnectionStatus::parse(&message.content) {
                Ok(update) => update,
                Err(e) => {
                    warn!("⚠️  Dropping status update: {}", e);
                    return None;
                }
            };
            apply_status(&mut *state.write().await, update)
        }
        MessageType::NConnections => match parse_connection_count(&message.content) {
            Ok(count) => {
                state.write().await.connections = count;
                Some(SessionEvent::ConnectionCount(count))
            }
            Err(e) => {
                warn!("⚠️  Dropping connection count: {}", e);
                None
            }
        },
        MessageType::Data => match DataDispatcher::decode_message(&message) {
            Ok(event) => Some(SessionEvent::Sync(event)),
            Err(e) => {
                warn!("⚠️  Dropping data message: {}", e);
                None
            }
        },
        other => {
            debug!("Ignoring unexpected {:?} from server", other);
            None
        }
    }
}

fn apply_status(state: &mut PeerState, update: ConnectionStatus) -> Option<SessionEvent> {
    if update.epoch < state.epoch {
        debug!(
            "Ignoring stale status (epoch {} < {})",
            update.epoch, state.epoch
        );
        return None;
    }

    let previous = state.status;
    state.status = update.status;
    state.host_name = update.host_name.clone();
    state.epoch = update.epoch;

    if state.hostship_pending {
        // A denial restates our status unchanged; any other broadcast moves it.
        if update.status.is_host() {
            state.hostship_pending = false;
        } else if update.status == previous {
            state.hostship_pending = false;
            info!("🚫 {}", SyncError::HostshipRequestDenied);
            return Some(SessionEvent::HostshipDenied);
        }
    }

    match &update.host_name {
        Some(host) => info!("📡 Status {:?}, host '{}' (epoch {})", update.status, host, update.epoch),
        None => info!("📡 Status {:?}, no host (epoch {})", update.status, update.epoch),
    }

    Some(SessionEvent::StatusChanged {
        status: update.status,
        host: update.host_name,
        epoch: update.epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: Status, host: Option<&str>, epoch: u64) -> ConnectionStatus {
        ConnectionStatus {
            status,
            host_name: host.map(String::from),
            epoch,
        }
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let mut state = PeerState::default();
        apply_status(&mut state, status(Status::ClientWithHost, Some("B"), 2)).unwrap();

        assert!(apply_status(&mut state, status(Status::ClientWithHost, Some("A"), 1)).is_none());
        assert_eq!(state.host_name.as_deref(), Some("B"));
        assert_eq!(state.epoch, 2);

        // Host cleared keeps the epoch; equal epochs still apply.
        let event = apply_status(&mut state, status(Status::ClientWithoutHost, None, 2));
        assert_eq!(
            event,
            Some(SessionEvent::StatusChanged {
                status: Status::ClientWithoutHost,
                host: None,
                epoch: 2
            })
        );
    }

    #[test]
    fn test_unchanged_status_after_request_is_denial() {
        let mut state = PeerState::default();
        apply_status(&mut state, status(Status::ClientWithHost, Some("A"), 1));
        state.hostship_pending = true;

        let event = apply_status(&mut state, status(Status::ClientWithHost, Some("A"), 1));
        assert_eq!(event, Some(SessionEvent::HostshipDenied));
        assert!(!state.hostship_pending);
    }

    #[test]
    fn test_grant_clears_pending_request() {
        let mut state = PeerState::default();
        apply_status(&mut state, status(Status::ClientWithoutHost, None, 0));
        state.hostship_pending = true;

        let event = apply_status(&mut state, status(Status::Host, Some("Me"), 1));
        assert!(matches!(
            event,
            Some(SessionEvent::StatusChanged { status: Status::Host, .. })
        ));
        assert!(!state.hostship_pending);
    }

    #[tokio::test]
    async fn test_unknown_data_subtype_is_dropped() {
        let state = RwLock::new(PeerState::default());
        let message = crate::sync::DataMessage {
            subtype: 99,
            content: vec![1, 2, 3],
        }
        .to_message();

        assert!(handle_message(&state, message).await.is_none());
    }

    #[tokio::test]
    async fn test_connect_rejects_zero_queue_capacity() {
        // Validation happens before any connection attempt.
        let mut config = ClientConfig::new("Dome", "127.0.0.1:1", None);
        config.session.outbound_queue_capacity = 0;

        assert!(matches!(
            SyncPeer::connect(&config).await,
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_count_is_tracked() {
        let state = RwLock::new(PeerState::default());
        let message = crate::common::messages::connection_count_message(3);

        assert_eq!(
            handle_message(&state, message).await,
            Some(SessionEvent::ConnectionCount(3))
        );
        assert_eq!(state.read().await.connections, 3);
    }
}
