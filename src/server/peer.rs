//! # Peer Connection
//!
//! Server-side record of one connected instance: its identity, its status in
//! the session and the link used to reach it.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected --Connect--> Connecting
//! Connecting --Authenticated (no host)--> ClientWithoutHost
//! Connecting --Authenticated (host present)--> ClientWithHost
//! ClientWithoutHost --HostGranted--> Host
//! ClientWithoutHost --HostAnnounced--> ClientWithHost
//! ClientWithHost --HostLost--> ClientWithoutHost
//! Host --Resigned--> ClientWithoutHost
//! any --Closed--> Disconnected
//! ```
//!
//! The peer only records transitions. Whether a transition happens (for
//! instance who becomes host) is decided by the
//! [`SessionCoordinator`](super::coordinator::SessionCoordinator).

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::common::connection::LinkState;
use crate::common::error::{SyncError, SyncResult};
use crate::common::messages::Message;
use crate::common::status::Status;

/// Stable identifier of a peer within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inputs of the peer state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Connect,
    Authenticated { host_present: bool },
    HostGranted,
    HostAnnounced,
    HostLost,
    Resigned,
    Closed,
}

impl PeerEvent {
    fn name(self) -> &'static str {
        match self {
            PeerEvent::Connect => "connect",
            PeerEvent::Authenticated { .. } => "authenticated",
            PeerEvent::HostGranted => "host granted",
            PeerEvent::HostAnnounced => "host announced",
            PeerEvent::HostLost => "host lost",
            PeerEvent::Resigned => "resigned",
            PeerEvent::Closed => "closed",
        }
    }
}

/// Outbound side of a peer's socket as seen from the coordinator.
///
/// Dropping the link releases the connection. Both socket tasks watch
/// `release`: the reader stops at once, the writer gets a grace period to
/// flush what is already queued and then drops its half even if a send is
/// still blocked.
pub struct PeerLink {
    outbound: mpsc::Sender<Message>,
    state: LinkState,
    _release: watch::Sender<()>,
}

impl PeerLink {
    pub fn new(outbound: mpsc::Sender<Message>, state: LinkState, release: watch::Sender<()>) -> Self {
        Self {
            outbound,
            state,
            _release: release,
        }
    }

    /// Queue a message without waiting.
    ///
    /// # Returns
    /// - `Err(BackpressureOverflow)`: the queue is full
    /// - `Err(ConnectionClosed)`: the socket or its writer task is gone
    pub fn try_send(&self, message: Message) -> SyncResult<()> {
        if !self.state.is_connected_or_connecting() {
            return Err(SyncError::ConnectionClosed);
        }

        self.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SyncError::BackpressureOverflow,
            mpsc::error::TrySendError::Closed(_) => SyncError::ConnectionClosed,
        })
    }
}

/// One remote instance participating in the session.
pub struct PeerConnection {
    id: PeerId,
    name: String,
    address: SocketAddr,
    status: Status,
    link: PeerLink,
    /// Pending authentication deadline timer.
    deadline: Option<AbortHandle>,
}

impl PeerConnection {
    pub fn new(id: PeerId, address: SocketAddr, link: PeerLink) -> Self {
        Self {
            id,
            name: format!("Peer {}", id.0),
            address,
            status: Status::Disconnected,
            link,
            deadline: None,
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        if !name.is_empty() {
            self.name = name;
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn link(&self) -> &PeerLink {
        &self.link
    }

    pub fn set_deadline(&mut self, timer: AbortHandle) {
        self.cancel_deadline();
        self.deadline = Some(timer);
    }

    /// Stop the authentication timer, if one is still running.
    pub fn cancel_deadline(&mut self) {
        if let Some(timer) = self.deadline.take() {
            timer.abort();
        }
    }

    /// Apply a state machine event.
    ///
    /// Invalid events leave the status unchanged and return
    /// [`SyncError::InvalidTransition`].
    pub fn apply(&mut self, event: PeerEvent) -> SyncResult<Status> {
        use PeerEvent::*;
        use Status::*;

        let next = match (self.status, event) {
            (_, Closed) => Disconnected,
            (Disconnected, Connect) => Connecting,
            (Connecting, Authenticated { host_present: false }) => ClientWithoutHost,
            (Connecting, Authenticated { host_present: true }) => ClientWithHost,
            (ClientWithoutHost, HostGranted) => Host,
            (ClientWithoutHost, HostAnnounced) => ClientWithHost,
            (ClientWithHost, HostLost) => ClientWithoutHost,
            (Host, Resigned) => ClientWithoutHost,
            (from, event) => {
                return Err(SyncError::InvalidTransition {
                    from,
                    event: event.name(),
                })
            }
        };

        self.status = next;
        Ok(next)
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.cancel_deadline();
    }
}
