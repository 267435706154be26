//! # Client Components
//!
//! ## Sync Peer ([`peer`])
//! Joins a session, tracks this instance's status and moves synchronized
//! state between the session and the renderer.
//!
//! ## Configuration ([`config`])
//! Identity, server address and queue sizes loaded from TOML.

pub mod config;
pub mod peer;

pub use config::ClientConfig;
pub use peer::{SessionEvent, SyncPeer};
