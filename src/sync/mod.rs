//! # Synchronized State
//!
//! - [`events`]: typed snapshots of camera, time and script state
//! - [`data`]: the dispatcher translating them to and from `Data` frames

pub mod data;
pub mod events;

pub use data::{DataDispatcher, DataMessage, DataType};
pub use events::{CameraKeyframe, ScriptMessage, SyncEvent, TimeKeyframe};
