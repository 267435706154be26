//! # Common Components
//!
//! Shared building blocks used by both the session server and the connecting
//! peer.
//!
//! ## Modules
//!
//! - [`messages`]: Frame codec and control payloads
//! - [`connection`]: TCP connection carrying whole frames
//! - [`config`]: Configuration parsing utilities
//! - [`error`]: Error taxonomy
//! - [`status`]: Participant status values

pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod status;
pub mod wire;
