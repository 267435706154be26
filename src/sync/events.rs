//! # Synchronized State Snapshots
//!
//! The typed events exchanged between instances: camera keyframes, time
//! keyframes and script invocations. The renderer fills these in on the host
//! and consumes them on every client.

use bytes::BufMut;
use serde::Serialize;

use crate::common::error::SyncResult;
use crate::common::wire;

/// Camera pose at a given timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraKeyframe {
    /// World position.
    pub position: [f64; 3],
    /// Orientation quaternion as `[x, y, z, w]`.
    pub rotation: [f64; 4],
    /// Whether the camera follows the rotation of its focus node.
    pub follow_node_rotation: bool,
    /// Name of the scene node the camera is anchored to.
    pub focus_node: String,
    pub scale: f32,
    /// Application time at which the keyframe was captured (seconds).
    pub timestamp: f64,
}

/// Simulation clock state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeKeyframe {
    /// Simulation time (seconds past J2000).
    pub time: f64,
    /// Simulation seconds per real second.
    pub dt: f64,
    pub paused: bool,
    /// Clients must jump to `time` instead of interpolating towards it.
    pub requires_time_jump: bool,
    pub timestamp: f64,
}

/// A script the host ran that every client must run too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptMessage {
    pub script: String,
}

/// One decoded unit of synchronized state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Camera(CameraKeyframe),
    Time(TimeKeyframe),
    Script(ScriptMessage),
}

impl CameraKeyframe {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        for value in self.position.iter().chain(self.rotation.iter()) {
            buf.put_f64(*value);
        }
        wire::put_bool(buf, self.follow_node_rotation);
        wire::put_string(buf, &self.focus_node);
        buf.put_f32(self.scale);
        buf.put_f64(self.timestamp);
    }

    pub(crate) fn read(buf: &mut &[u8]) -> SyncResult<Self> {
        let mut position = [0.0; 3];
        for value in position.iter_mut() {
            *value = wire::get_f64(buf, "camera position")?;
        }
        let mut rotation = [0.0; 4];
        for value in rotation.iter_mut() {
            *value = wire::get_f64(buf, "camera rotation")?;
        }

        Ok(Self {
            position,
            rotation,
            follow_node_rotation: wire::get_bool(buf, "follow node rotation")?,
            focus_node: wire::get_string(buf, "focus node")?,
            scale: wire::get_f32(buf, "camera scale")?,
            timestamp: wire::get_f64(buf, "camera timestamp")?,
        })
    }
}

impl TimeKeyframe {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.put_f64(self.time);
        buf.put_f64(self.dt);
        wire::put_bool(buf, self.paused);
        wire::put_bool(buf, self.requires_time_jump);
        buf.put_f64(self.timestamp);
    }

    pub(crate) fn read(buf: &mut &[u8]) -> SyncResult<Self> {
        Ok(Self {
            time: wire::get_f64(buf, "time")?,
            dt: wire::get_f64(buf, "delta time")?,
            paused: wire::get_bool(buf, "paused")?,
            requires_time_jump: wire::get_bool(buf, "requires time jump")?,
            timestamp: wire::get_f64(buf, "time timestamp")?,
        })
    }
}

impl ScriptMessage {
    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        wire::put_string(buf, &self.script);
    }

    pub(crate) fn read(buf: &mut &[u8]) -> SyncResult<Self> {
        Ok(Self {
            script: wire::get_string(buf, "script")?,
        })
    }
}
