//! # Session Server
//!
//! Accepts TCP connections and wires each one to the
//! [`SessionCoordinator`](super::coordinator::SessionCoordinator).
//!
//! ## Tasks
//!
//! ```text
//! listener ──accept──> reader task (per peer) ──CoordinatorEvent──> coordinator
//!                      writer task (per peer) <──bounded queue────── coordinator
//! ```
//!
//! The coordinator is the only task that touches session state. Reader and
//! writer tasks only move frames between their socket and a channel. When
//! the coordinator drops a peer, both tasks end and the socket is closed,
//! even if the remote side has stopped reading.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use super::config::ServerConfig;
use super::coordinator::{CoordinatorEvent, CoordinatorHandle, SessionCoordinator};
use super::peer::{PeerId, PeerLink};
use crate::common::connection::{Connection, FrameReader, FrameWriter};
use crate::common::error::{SyncError, SyncResult};
use crate::common::messages::Message;

/// Handle for stopping a running [`SessionServer`].
#[derive(Clone)]
pub struct SessionHandle {
    coordinator: CoordinatorHandle,
    local_addr: SocketAddr,
}

impl SessionHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close every peer connection and stop the coordinator.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }
}

/// TCP front end of one synchronization session.
pub struct SessionServer {
    config: ServerConfig,
    listener: TcpListener,
    coordinator: SessionCoordinator,
    handle: SessionHandle,
    next_id: Arc<AtomicU32>,
}

impl SessionServer {
    /// Bind the listener described by `config`.
    ///
    /// # Example
    /// ```ignore
    /// let server = SessionServer::bind(config).await?;
    /// let handle = server.handle();
    /// tokio::spawn(server.run());
    /// ```
    pub async fn bind(config: ServerConfig) -> SyncResult<Self> {
        config.session.validate()?;
        let listener = TcpListener::bind(&config.server.address).await?;
        let local_addr = listener.local_addr()?;
        let (coordinator, coordinator_handle) =
            SessionCoordinator::new(config.session.clone(), config.server.password.clone());

        Ok(Self {
            config,
            listener,
            coordinator,
            handle: SessionHandle {
                coordinator: coordinator_handle,
                local_addr,
            },
            next_id: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run until the session is shut down.
    pub async fn run(self) {
        let Self {
            config,
            listener,
            coordinator,
            handle,
            next_id,
        } = self;

        info!(
            "🚀 Session server listening on {} ({})",
            handle.local_addr,
            if config.server.password.is_some() {
                "password protected"
            } else {
                "open"
            }
        );

        let accept_task = accept_loop(listener, config, handle.coordinator.clone(), next_id);

        // The coordinator only returns after Shutdown.
        tokio::select! {
            _ = coordinator.run() => info!("🛑 Session closed"),
            _ = accept_task => error!("❌ Listener task terminated"),
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    coordinator: CoordinatorHandle,
    next_id: Arc<AtomicU32>,
) {
    loop {
        match listener.accept().await {
            Ok((socket, address)) => {
                let id = PeerId(next_id.fetch_add(1, Ordering::Relaxed));
                if !register_peer(id, socket, address, &config, &coordinator).await {
                    break;
                }
            }
            Err(e) => error!("❌ Accept error: {}", e),
        }
    }
}

/// Split the socket, announce the peer and start its reader and writer.
///
/// Returns `false` if the coordinator is gone.
async fn register_peer(
    id: PeerId,
    socket: TcpStream,
    address: SocketAddr,
    config: &ServerConfig,
    coordinator: &CoordinatorHandle,
) -> bool {
    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", address, e);
    }

    let connection = Connection::new(socket, config.session.max_frame_size);
    let state = connection.state();
    let (reader, writer) = connection.into_split();

    let (outbound_tx, outbound_rx) = mpsc::channel(config.session.outbound_queue_capacity);
    let (release_tx, release_rx) = watch::channel(());
    let link = PeerLink::new(outbound_tx, state, release_tx);

    // Registration is queued before the reader starts, so the coordinator
    // always knows the peer before its first frame.
    if !coordinator
        .send(CoordinatorEvent::Connected { id, address, link })
        .await
    {
        return false;
    }

    tokio::spawn(read_frames(id, reader, release_rx.clone(), coordinator.clone()));
    tokio::spawn(write_frames(
        id,
        writer,
        outbound_rx,
        release_rx,
        config.session.write_grace(),
        coordinator.clone(),
    ));
    true
}

/// Resolves once the peer's link has been dropped by the coordinator.
async fn released(mut release: watch::Receiver<()>) {
    // Nothing is ever sent; the only wake-up is the sender going away.
    while release.changed().await.is_ok() {}
}

/// Forward frames from one peer to the coordinator until the link ends or
/// the coordinator drops the peer.
async fn read_frames(
    id: PeerId,
    mut reader: FrameReader,
    release: watch::Receiver<()>,
    coordinator: CoordinatorHandle,
) {
    let released = released(release);
    tokio::pin!(released);

    loop {
        tokio::select! {
            _ = &mut released => {
                debug!("Reader for peer {} released", id);
                return;
            }
            result = reader.receive() => {
                let event = match result {
                    Ok(Some(message)) => CoordinatorEvent::Received { id, message },
                    Ok(None) => CoordinatorEvent::Closed { id, reason: None },
                    Err(e) => CoordinatorEvent::Closed { id, reason: Some(e) },
                };
                let closed = matches!(event, CoordinatorEvent::Closed { .. });
                if !coordinator.send(event).await || closed {
                    return;
                }
            }
        }
    }
}

/// Drain the peer's outbound queue onto its socket.
///
/// Once the link is released the queue closes and whatever is left gets
/// `grace` to go out. After that the writer half is dropped, abandoning any
/// send still blocked on a peer that stopped reading.
async fn write_frames(
    id: PeerId,
    mut writer: FrameWriter,
    outbound: mpsc::Receiver<Message>,
    release: watch::Receiver<()>,
    grace: Duration,
    coordinator: CoordinatorHandle,
) {
    let deadline = async {
        released(release).await;
        tokio::time::sleep(grace).await;
    };

    let drained = tokio::select! {
        result = pump(id, &mut writer, outbound) => Some(result),
        _ = deadline => None,
    };

    match drained {
        Some(Ok(())) => writer.close().await,
        Some(Err(e)) => {
            debug!("Write to peer {} failed: {}", id, e);
            coordinator
                .send(CoordinatorEvent::Closed { id, reason: Some(e) })
                .await;
        }
        None => warn!("⏱️  Peer {} stopped reading, dropping its socket", id),
    }
}

async fn pump(
    id: PeerId,
    writer: &mut FrameWriter,
    mut outbound: mpsc::Receiver<Message>,
) -> SyncResult<()> {
    while let Some(message) = outbound.recv().await {
        match writer.send(&message).await {
            Ok(()) => {}
            Err(e @ SyncError::FrameTooLarge { .. }) => {
                warn!("⚠️  Not forwarding {:?} to peer {}: {}", message.kind, id, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
