//! # Session Server Components
//!
//! ## Session Coordinator ([`coordinator`])
//! Owns the peer table and the host slot, arbitrates hostship and fans out
//! the host's data.
//!
//! ## Peer Connection ([`peer`])
//! Per-peer identity, status state machine and outbound link.
//!
//! ## Session Server ([`server`])
//! TCP accept loop plus the per-peer reader and writer tasks.

pub mod config;
pub mod coordinator;
pub mod peer;
pub mod server;

pub use config::{ServerConfig, SessionConfig};
pub use coordinator::{CoordinatorEvent, SessionCoordinator};
pub use peer::{PeerConnection, PeerId};
pub use server::{SessionHandle, SessionServer};
