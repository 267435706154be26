//! # Parallel Session
//!
//! Keeps several visualization instances in lock-step. One instance at a time
//! is **host**: its camera, clock and scripts are authoritative and are
//! forwarded by the session server to every other instance.
//!
//! - [`common`]: frame codec, TCP connection, configuration, errors
//! - [`sync`]: typed state snapshots and the data dispatcher
//! - [`server`]: session coordinator and TCP front end
//! - [`client`]: the connecting instance

pub mod client;
pub mod common;
pub mod server;
pub mod sync;

pub use client::{ClientConfig, SessionEvent, SyncPeer};
pub use common::error::{SyncError, SyncResult};
pub use common::messages::{Message, MessageType};
pub use common::status::Status;
pub use server::{ServerConfig, SessionServer};
pub use sync::{DataDispatcher, SyncEvent};
