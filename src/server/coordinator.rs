//! # Session Coordinator
//!
//! The single owner of session-wide state: the peer table, the host slot and
//! the hostship epoch.
//!
//! ## Core Responsibilities
//!
//! ### 1. Admission
//! - Registers new peers in `Connecting` and arms an authentication deadline
//! - Checks the session password, names the peer, sends its first status
//!
//! ### 2. Host Arbitration
//! - First come, first served: a `HostshipRequest` is granted iff the slot is
//!   empty, in the order the coordinator processes requests
//! - Only the current host may resign
//!
//! ### 3. Propagation
//! - Every host-slot change is followed by one `ConnectionStatus` broadcast
//! - `Data` from the host is forwarded verbatim to every other authenticated
//!   peer; `Data` from anyone else is dropped
//!
//! ### 4. Failure Handling
//! - Closed links, malformed frames, missed deadlines and full outbound
//!   queues all remove the peer; losing the host clears the slot
//!
//! ## Concurrency
//!
//! All events arrive on one mpsc inbox and are handled one at a time by
//! [`SessionCoordinator::run`]. Nothing here awaits network I/O: outbound
//! messages are pushed with `try_send` into each peer's bounded queue, so a
//! slow peer can never stall the others.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::config::SessionConfig;
use super::peer::{PeerConnection, PeerEvent, PeerId, PeerLink};
use crate::common::error::SyncError;
use crate::common::messages::{
    connection_count_message, Authentication, ConnectionStatus, Message, MessageType,
};
use crate::common::status::Status;

/// Capacity of the coordinator inbox.
const INBOX_CAPACITY: usize = 1024;

/// Everything the coordinator reacts to.
pub enum CoordinatorEvent {
    /// A socket was accepted.
    Connected {
        id: PeerId,
        address: SocketAddr,
        link: PeerLink,
    },
    /// A whole frame arrived from a peer.
    Received { id: PeerId, message: Message },
    /// A peer's link ended. `reason` is `None` for a clean close.
    Closed { id: PeerId, reason: Option<SyncError> },
    /// The authentication deadline of a peer expired.
    AuthenticationDeadline { id: PeerId },
    /// Close every link and stop.
    Shutdown,
}

/// Session-wide state. Only ever touched from the coordinator task.
#[derive(Default)]
pub struct Session {
    peers: BTreeMap<PeerId, PeerConnection>,
    host: Option<PeerId>,
    epoch: u64,
}

impl Session {
    pub fn host(&self) -> Option<PeerId> {
        self.host
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn peer(&self, id: PeerId) -> Option<&PeerConnection> {
        self.peers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn host_name(&self) -> Option<String> {
        self.host
            .and_then(|id| self.peers.get(&id))
            .map(|peer| peer.name().to_string())
    }

    fn authenticated_count(&self) -> u32 {
        self.peers
            .values()
            .filter(|peer| peer.status().is_authenticated())
            .count() as u32
    }
}

/// Cloneable handle for feeding events into the coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub async fn send(&self, event: CoordinatorEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(CoordinatorEvent::Shutdown).await;
    }
}

/// Serialized owner of the [`Session`].
pub struct SessionCoordinator {
    config: SessionConfig,
    password: Option<String>,
    session: Session,
    inbox: mpsc::Receiver<CoordinatorEvent>,
    handle: CoordinatorHandle,
    /// Peers to drop once the current event is fully handled.
    doomed: Vec<(PeerId, SyncError)>,
}

impl SessionCoordinator {
    /// Create a coordinator and the handle used to reach it.
    ///
    /// # Example
    /// ```ignore
    /// let (coordinator, handle) = SessionCoordinator::new(SessionConfig::default(), None);
    /// tokio::spawn(coordinator.run());
    /// ```
    pub fn new(config: SessionConfig, password: Option<String>) -> (Self, CoordinatorHandle) {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let handle = CoordinatorHandle { tx };
        let coordinator = Self {
            config,
            password,
            session: Session::default(),
            inbox,
            handle: handle.clone(),
            doomed: Vec::new(),
        };
        (coordinator, handle)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Process events until `Shutdown`.
    pub async fn run(mut self) {
        info!("🧭 Session coordinator started");

        while let Some(event) = self.inbox.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }

        self.close_all();
        info!("🛑 Session coordinator stopped");
    }

    /// Handle one event. Returns `false` once the session is shutting down.
    pub fn handle_event(&mut self, event: CoordinatorEvent) -> bool {
        match event {
            CoordinatorEvent::Connected { id, address, link } => self.on_connected(id, address, link),
            CoordinatorEvent::Received { id, message } => self.on_received(id, message),
            CoordinatorEvent::Closed { id, reason } => {
                if let Some(reason) = reason {
                    self.doomed.push((id, reason));
                } else {
                    self.disconnect(id, None);
                }
            }
            CoordinatorEvent::AuthenticationDeadline { id } => {
                if let Some(peer) = self.session.peers.get(&id) {
                    if peer.status() == Status::Connecting {
                        self.doomed.push((id, SyncError::AuthenticationTimeout));
                    }
                }
            }
            CoordinatorEvent::Shutdown => return false,
        }

        self.flush_disconnects();
        true
    }

    // ========================================================================
    // ADMISSION
    // ========================================================================

    fn on_connected(&mut self, id: PeerId, address: SocketAddr, link: PeerLink) {
        let mut peer = PeerConnection::new(id, address, link);
        if let Err(e) = peer.apply(PeerEvent::Connect) {
            error!("❌ Peer {} could not enter Connecting: {}", id, e);
            return;
        }

        let handle = self.handle.clone();
        let timeout = self.config.auth_timeout();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            handle.send(CoordinatorEvent::AuthenticationDeadline { id }).await;
        });
        peer.set_deadline(timer.abort_handle());

        self.session.peers.insert(id, peer);
        info!("🔗 Peer {} connected from {}", id, address);
    }

    fn on_authentication(&mut self, id: PeerId, content: &[u8]) {
        let auth = match Authentication::parse(content) {
            Ok(auth) => auth,
            Err(e) => {
                self.doomed.push((id, SyncError::MalformedFrame(e.to_string())));
                return;
            }
        };

        if let Some(expected) = &self.password {
            if *expected != auth.password {
                warn!("🔒 Peer {} presented a wrong password", id);
                self.doomed.push((id, SyncError::AuthenticationFailed));
                return;
            }
        }

        let host_present = self.session.host.is_some();
        let Some(peer) = self.session.peers.get_mut(&id) else {
            return;
        };
        peer.set_name(auth.name);
        if let Err(e) = peer.apply(PeerEvent::Authenticated { host_present }) {
            warn!("⚠️  Peer {} authentication ignored: {}", id, e);
            return;
        }
        peer.cancel_deadline();
        info!("✅ Peer {} authenticated as '{}'", id, peer.name());

        self.send_status(id);
        self.broadcast_connection_count();
    }

    // ========================================================================
    // MESSAGE HANDLING
    // ========================================================================

    fn on_received(&mut self, id: PeerId, message: Message) {
        let Some(status) = self.session.peers.get(&id).map(|peer| peer.status()) else {
            debug!("Dropping {:?} from unknown peer {}", message.kind, id);
            return;
        };

        if status == Status::Connecting {
            if message.kind == MessageType::Authentication {
                self.on_authentication(id, &message.content);
            } else {
                debug!("Ignoring {:?} from unauthenticated peer {}", message.kind, id);
            }
            return;
        }

        match message.kind {
            MessageType::Authentication => {
                warn!("⚠️  Peer {} authenticated twice, ignoring", id);
            }
            MessageType::HostshipRequest => self.on_hostship_request(id),
            MessageType::HostshipResignation => self.on_hostship_resignation(id),
            MessageType::Data => {
                if self.session.host == Some(id) {
                    self.fan_out(id, message);
                } else {
                    debug!("🗑️  Discarding data from non-host peer {}", id);
                }
            }
            MessageType::ConnectionStatus | MessageType::NConnections => {
                debug!("Ignoring server-only {:?} from peer {}", message.kind, id);
            }
        }
    }

    fn on_hostship_request(&mut self, id: PeerId) {
        if let Some(host) = self.session.host {
            info!(
                "🚫 Peer {} requested hostship: {} (held by {})",
                id,
                SyncError::HostshipRequestDenied,
                host
            );
            // Restate the unchanged status as the acknowledgement.
            self.send_status(id);
            return;
        }

        let Some(peer) = self.session.peers.get_mut(&id) else {
            return;
        };
        if let Err(e) = peer.apply(PeerEvent::HostGranted) {
            warn!("⚠️  Hostship for peer {} rejected: {}", id, e);
            self.send_status(id);
            return;
        }

        self.session.host = Some(id);
        self.session.epoch += 1;
        info!(
            "👑 Peer {} is now HOST (epoch {})",
            id, self.session.epoch
        );

        for (other, peer) in self.session.peers.iter_mut() {
            if *other != id && peer.status() == Status::ClientWithoutHost {
                let _ = peer.apply(PeerEvent::HostAnnounced);
            }
        }
        self.broadcast_status();
    }

    fn on_hostship_resignation(&mut self, id: PeerId) {
        if self.session.host != Some(id) {
            warn!("⚠️  Peer {} resigned hostship it does not hold", id);
            return;
        }

        if let Some(peer) = self.session.peers.get_mut(&id) {
            let _ = peer.apply(PeerEvent::Resigned);
        }
        info!("👋 Host {} resigned", id);
        self.clear_host();
    }

    /// Empty the host slot, demote everyone and announce it.
    fn clear_host(&mut self) {
        self.session.host = None;
        for peer in self.session.peers.values_mut() {
            if peer.status() == Status::ClientWithHost {
                let _ = peer.apply(PeerEvent::HostLost);
            }
        }
        self.broadcast_status();
    }

    // ========================================================================
    // OUTBOUND
    // ========================================================================

    /// Queue a message for one peer, scheduling its removal on failure.
    fn deliver(&mut self, id: PeerId, message: Message) {
        let Some(peer) = self.session.peers.get(&id) else {
            return;
        };
        if let Err(e) = peer.link().try_send(message) {
            if !self.doomed.iter().any(|(doomed, _)| *doomed == id) {
                self.doomed.push((id, e));
            }
        }
    }

    fn status_for(&self, id: PeerId) -> Option<Message> {
        let peer = self.session.peers.get(&id)?;
        Some(
            ConnectionStatus {
                status: peer.status(),
                host_name: self.session.host_name(),
                epoch: self.session.epoch,
            }
            .to_message(),
        )
    }

    fn send_status(&mut self, id: PeerId) {
        if let Some(message) = self.status_for(id) {
            self.deliver(id, message);
        }
    }

    fn authenticated_ids(&self) -> Vec<PeerId> {
        self.session
            .peers
            .values()
            .filter(|peer| peer.status().is_authenticated())
            .map(|peer| peer.id())
            .collect()
    }

    /// Send every authenticated peer its own status.
    fn broadcast_status(&mut self) {
        debug!(
            "📣 Broadcasting status (host: {:?}, epoch {})",
            self.session.host_name(),
            self.session.epoch
        );
        for id in self.authenticated_ids() {
            self.send_status(id);
        }
    }

    fn broadcast_connection_count(&mut self) {
        let count = self.session.authenticated_count();
        for id in self.authenticated_ids() {
            self.deliver(id, connection_count_message(count));
        }
    }

    fn fan_out(&mut self, from: PeerId, message: Message) {
        let targets: Vec<PeerId> = self
            .authenticated_ids()
            .into_iter()
            .filter(|id| *id != from)
            .collect();

        for id in targets {
            self.deliver(id, message.clone());
        }
    }

    // ========================================================================
    // DISCONNECTION
    // ========================================================================

    fn flush_disconnects(&mut self) {
        while !self.doomed.is_empty() {
            let (id, reason) = self.doomed.remove(0);
            self.disconnect(id, Some(reason));
        }
    }

    /// Remove a peer. Dropping it closes its link.
    fn disconnect(&mut self, id: PeerId, reason: Option<SyncError>) {
        let Some(mut peer) = self.session.peers.remove(&id) else {
            return;
        };
        let was_authenticated = peer.status().is_authenticated();
        let _ = peer.apply(PeerEvent::Closed);

        match &reason {
            Some(e) => warn!("⚠️  Peer {} ('{}') disconnected: {}", id, peer.name(), e),
            None => info!("🔌 Peer {} ('{}') disconnected", id, peer.name()),
        }
        drop(peer);

        if self.session.host == Some(id) {
            warn!("⚠️  HOST {} left the session", id);
            self.clear_host();
        }
        if was_authenticated {
            self.broadcast_connection_count();
        }
    }

    fn close_all(&mut self) {
        let count = self.session.peers.len();
        self.session.peers.clear();
        self.session.host = None;
        self.doomed.clear();
        info!("🔌 Closed {} peer connection(s)", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::connection::LinkState;
    use crate::common::messages::parse_connection_count;
    use std::time::Duration;
    use tokio::sync::watch;

    struct TestPeer {
        id: PeerId,
        rx: mpsc::Receiver<Message>,
        state: LinkState,
        release: watch::Receiver<()>,
    }

    impl TestPeer {
        fn drain(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                out.push(message);
            }
            out
        }

        fn statuses(&mut self) -> Vec<ConnectionStatus> {
            self.drain()
                .into_iter()
                .filter(|m| m.kind == MessageType::ConnectionStatus)
                .map(|m| ConnectionStatus::parse(&m.content).unwrap())
                .collect()
        }

        fn data(&mut self) -> Vec<Message> {
            self.drain()
                .into_iter()
                .filter(|m| m.kind == MessageType::Data)
                .collect()
        }
    }

    fn coordinator(capacity: usize) -> (SessionCoordinator, usize) {
        let config = SessionConfig {
            auth_timeout_ms: 60_000,
            outbound_queue_capacity: capacity,
            ..SessionConfig::default()
        };
        (SessionCoordinator::new(config, Some("secret".into())).0, capacity)
    }

    fn connect(c: &mut SessionCoordinator, id: u32, capacity: usize) -> TestPeer {
        let (tx, rx) = mpsc::channel(capacity);
        let (release_tx, release) = watch::channel(());
        let state = LinkState::connected();
        let link = PeerLink::new(tx, state.clone(), release_tx);
        let id = PeerId(id);
        c.handle_event(CoordinatorEvent::Connected {
            id,
            address: "127.0.0.1:5000".parse().unwrap(),
            link,
        });
        TestPeer { id, rx, state, release }
    }

    fn receive(c: &mut SessionCoordinator, peer: &TestPeer, message: Message) {
        c.handle_event(CoordinatorEvent::Received { id: peer.id, message });
    }

    fn join(c: &mut SessionCoordinator, id: u32, name: &str, capacity: usize) -> TestPeer {
        let peer = connect(c, id, capacity);
        let auth = Authentication {
            password: "secret".into(),
            name: name.into(),
        };
        receive(c, &peer, auth.to_message());
        peer
    }

    fn host_count(c: &SessionCoordinator) -> usize {
        c.session()
            .peers
            .values()
            .filter(|p| p.status() == Status::Host)
            .count()
    }

    fn time_update(t: f64) -> Message {
        use crate::sync::{DataDispatcher, SyncEvent, TimeKeyframe};
        DataDispatcher::encode(&SyncEvent::Time(TimeKeyframe {
            time: t,
            dt: 1.0,
            paused: false,
            requires_time_jump: false,
            timestamp: 0.0,
        }))
        .to_message()
    }

    #[tokio::test]
    async fn test_authentication_sends_status_and_count() {
        let (mut c, cap) = coordinator(16);
        let mut a = join(&mut c, 1, "A", cap);

        let messages = a.drain();
        assert_eq!(messages.len(), 2);
        let status = ConnectionStatus::parse(&messages[0].content).unwrap();
        assert_eq!(status.status, Status::ClientWithoutHost);
        assert_eq!(status.host_name, None);
        assert_eq!(messages[1].kind, MessageType::NConnections);
        assert_eq!(parse_connection_count(&messages[1].content).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wrong_password_disconnects() {
        let (mut c, cap) = coordinator(16);
        let mut peer = connect(&mut c, 1, cap);
        let auth = Authentication {
            password: "guess".into(),
            name: "Mallory".into(),
        };
        receive(&mut c, &peer, auth.to_message());

        assert!(c.session().is_empty());
        assert!(peer.drain().is_empty());
        // Dropping the peer released its socket tasks.
        assert!(peer.release.has_changed().is_err());
    }

    #[tokio::test]
    async fn test_authentication_deadline() {
        let (mut c, cap) = coordinator(16);
        let silent = connect(&mut c, 1, cap);
        let _a = join(&mut c, 2, "A", cap);

        c.handle_event(CoordinatorEvent::AuthenticationDeadline { id: silent.id });
        c.handle_event(CoordinatorEvent::AuthenticationDeadline { id: PeerId(2) });

        assert!(c.session().peer(silent.id).is_none());
        assert!(c.session().peer(PeerId(2)).is_some());
    }

    #[tokio::test]
    async fn test_deadline_is_not_raised_after_authentication() {
        let config = SessionConfig {
            auth_timeout_ms: 50,
            ..SessionConfig::default()
        };
        let (mut c, _handle) = SessionCoordinator::new(config, Some("secret".into()));
        let _a = join(&mut c, 1, "A", 16);
        let _silent = connect(&mut c, 2, 16);

        tokio::time::sleep(Duration::from_millis(300)).await;

        // Only the silent peer's timer fired.
        let mut raised = Vec::new();
        while let Ok(event) = c.inbox.try_recv() {
            if let CoordinatorEvent::AuthenticationDeadline { id } = event {
                raised.push(id);
            }
        }
        assert_eq!(raised, vec![PeerId(2)]);
    }

    #[tokio::test]
    async fn test_unauthenticated_peer_cannot_take_hostship() {
        let (mut c, cap) = coordinator(16);
        let peer = connect(&mut c, 1, cap);
        receive(&mut c, &peer, Message::empty(MessageType::HostshipRequest));

        assert_eq!(c.session().host(), None);
        assert_eq!(c.session().peer(peer.id).unwrap().status(), Status::Connecting);
    }

    #[tokio::test]
    async fn test_first_request_wins_second_is_denied() {
        let (mut c, cap) = coordinator(16);
        let mut a = join(&mut c, 1, "A", cap);
        let mut b = join(&mut c, 2, "B", cap);
        a.drain();
        b.drain();

        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        receive(&mut c, &b, Message::empty(MessageType::HostshipRequest));

        assert_eq!(c.session().host(), Some(a.id));
        assert_eq!(c.session().epoch(), 1);
        assert_eq!(host_count(&c), 1);
        assert_eq!(c.session().peer(b.id).unwrap().status(), Status::ClientWithHost);

        let a_statuses = a.statuses();
        assert_eq!(a_statuses.len(), 1);
        assert_eq!(a_statuses[0].status, Status::Host);

        // Grant broadcast, then the denial acknowledgement.
        let b_statuses = b.statuses();
        assert_eq!(b_statuses.len(), 2);
        for status in b_statuses {
            assert_eq!(status.status, Status::ClientWithHost);
            assert_eq!(status.host_name.as_deref(), Some("A"));
            assert_eq!(status.epoch, 1);
        }
    }

    #[tokio::test]
    async fn test_data_only_fans_out_from_host() {
        let (mut c, cap) = coordinator(16);
        let mut a = join(&mut c, 1, "A", cap);
        let mut b = join(&mut c, 2, "B", cap);
        let mut cc = join(&mut c, 3, "C", cap);
        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        a.drain();
        b.drain();
        cc.drain();

        receive(&mut c, &b, time_update(50.0));
        assert!(a.data().is_empty());
        assert!(cc.data().is_empty());

        let update = time_update(100.0);
        receive(&mut c, &a, update.clone());
        receive(&mut c, &a, time_update(101.0));
        assert!(a.data().is_empty());
        assert_eq!(b.data(), vec![update.clone(), time_update(101.0)]);
        assert_eq!(cc.data(), vec![update, time_update(101.0)]);
    }

    #[tokio::test]
    async fn test_host_disconnect_clears_slot_with_one_broadcast() {
        let (mut c, cap) = coordinator(16);
        let a = join(&mut c, 1, "A", cap);
        let mut b = join(&mut c, 2, "B", cap);
        let mut cc = join(&mut c, 3, "C", cap);
        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        b.drain();
        cc.drain();

        c.handle_event(CoordinatorEvent::Closed { id: a.id, reason: None });

        assert_eq!(c.session().host(), None);
        for peer in [&mut b, &mut cc] {
            let messages = peer.drain();
            let statuses: Vec<_> = messages
                .iter()
                .filter(|m| m.kind == MessageType::ConnectionStatus)
                .map(|m| ConnectionStatus::parse(&m.content).unwrap())
                .collect();
            assert_eq!(statuses.len(), 1);
            assert_eq!(statuses[0].status, Status::ClientWithoutHost);
            assert_eq!(statuses[0].host_name, None);

            let counts: Vec<u32> = messages
                .iter()
                .filter(|m| m.kind == MessageType::NConnections)
                .map(|m| parse_connection_count(&m.content).unwrap())
                .collect();
            assert_eq!(counts, vec![2]);
        }
        assert_eq!(c.session().peer(b.id).unwrap().status(), Status::ClientWithoutHost);

        receive(&mut c, &b, Message::empty(MessageType::HostshipRequest));
        assert_eq!(c.session().host(), Some(b.id));
        assert_eq!(c.session().epoch(), 2);
    }

    #[tokio::test]
    async fn test_only_host_may_resign() {
        let (mut c, cap) = coordinator(16);
        let a = join(&mut c, 1, "A", cap);
        let mut b = join(&mut c, 2, "B", cap);
        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        b.drain();

        receive(&mut c, &b, Message::empty(MessageType::HostshipResignation));
        assert_eq!(c.session().host(), Some(a.id));
        assert!(b.drain().is_empty());

        receive(&mut c, &a, Message::empty(MessageType::HostshipResignation));
        assert_eq!(c.session().host(), None);
        assert_eq!(c.session().peer(a.id).unwrap().status(), Status::ClientWithoutHost);
        let statuses = b.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, Status::ClientWithoutHost);
    }

    #[tokio::test]
    async fn test_late_joiner_sees_existing_host() {
        let (mut c, cap) = coordinator(16);
        let a = join(&mut c, 1, "A", cap);
        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));

        let mut d = join(&mut c, 4, "D", cap);
        let statuses = d.statuses();
        assert_eq!(statuses[0].status, Status::ClientWithHost);
        assert_eq!(statuses[0].host_name.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn test_slow_peer_is_dropped_without_stalling_others() {
        let (mut c, _) = coordinator(16);
        let a = join(&mut c, 1, "A", 64);
        let mut fast = join(&mut c, 2, "Fast", 64);
        // Room for its status, the count update caused by its own join, and
        // the hostship broadcast.
        let mut slow = join(&mut c, 3, "Slow", 3);
        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        fast.drain();

        receive(&mut c, &a, time_update(1.0));
        receive(&mut c, &a, time_update(2.0));

        assert!(c.session().peer(slow.id).is_none());
        assert_eq!(host_count(&c), 1);
        let fast_data = fast.data();
        assert_eq!(fast_data.len(), 2);
        assert_eq!(slow.drain().len(), 3);
    }

    #[tokio::test]
    async fn test_dead_link_is_removed_on_delivery() {
        let (mut c, cap) = coordinator(16);
        let a = join(&mut c, 1, "A", cap);
        let b = join(&mut c, 2, "B", cap);
        b.state.mark_closed();

        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        assert!(c.session().peer(b.id).is_none());
        assert_eq!(c.session().host(), Some(a.id));
    }

    #[tokio::test]
    async fn test_malformed_frame_removes_host() {
        let (mut c, cap) = coordinator(16);
        let a = join(&mut c, 1, "A", cap);
        let mut b = join(&mut c, 2, "B", cap);
        receive(&mut c, &a, Message::empty(MessageType::HostshipRequest));
        b.drain();

        c.handle_event(CoordinatorEvent::Closed {
            id: a.id,
            reason: Some(SyncError::MalformedFrame("bad tag".into())),
        });

        assert_eq!(c.session().host(), None);
        assert_eq!(b.statuses()[0].status, Status::ClientWithoutHost);
    }

    #[tokio::test]
    async fn test_shutdown_stops_processing() {
        let (mut c, cap) = coordinator(16);
        let _a = join(&mut c, 1, "A", cap);
        assert!(!c.handle_event(CoordinatorEvent::Shutdown));
    }
}
