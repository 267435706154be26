//! # Data Dispatcher
//!
//! Translates between the `Data` frames carried by the session and the typed
//! [`SyncEvent`]s consumed by the renderer.
//!
//! ```text
//! Data frame content: [4 bytes: subtype] [inner content]
//! ```
//!
//! The subtype space belongs to the application and may grow. A subtype this
//! build does not know yields [`SyncError::UnknownDataSubtype`]; callers drop
//! that one message and keep the connection.

use bytes::{Buf, BufMut};

use super::events::{CameraKeyframe, ScriptMessage, SyncEvent, TimeKeyframe};
use crate::common::error::{SyncError, SyncResult};
use crate::common::messages::{Message, MessageType};
use crate::common::wire;

/// Known data subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    CameraData = 0,
    TimeData = 1,
    ScriptData = 2,
}

impl TryFrom<u32> for DataType {
    type Error = SyncError;

    fn try_from(value: u32) -> SyncResult<Self> {
        match value {
            0 => Ok(DataType::CameraData),
            1 => Ok(DataType::TimeData),
            2 => Ok(DataType::ScriptData),
            other => Err(SyncError::UnknownDataSubtype(other)),
        }
    }
}

/// Payload of a `Data` frame.
///
/// The subtype is kept raw so messages from newer peers can still be carried
/// and forwarded even when they cannot be decoded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub subtype: u32,
    pub content: Vec<u8>,
}

impl DataMessage {
    pub fn new(subtype: DataType, content: Vec<u8>) -> Self {
        Self {
            subtype: subtype as u32,
            content,
        }
    }

    pub fn to_message(&self) -> Message {
        let mut content = Vec::with_capacity(4 + self.content.len());
        content.put_u32(self.subtype);
        content.put_slice(&self.content);
        Message::new(MessageType::Data, content)
    }

    /// Extract the data payload from a `Data` frame.
    pub fn from_message(message: &Message) -> SyncResult<Self> {
        if message.kind != MessageType::Data {
            return Err(SyncError::MalformedPayload(format!(
                "expected a Data frame, got {:?}",
                message.kind
            )));
        }

        let mut buf = message.content.as_slice();
        let subtype = wire::get_u32(&mut buf, "data subtype")?;
        Ok(Self {
            subtype,
            content: buf.chunk().to_vec(),
        })
    }
}

/// Stateless translation between [`DataMessage`] and [`SyncEvent`].
pub struct DataDispatcher;

impl DataDispatcher {
    /// Decode a data payload into a typed event.
    ///
    /// # Returns
    /// - `Err(UnknownDataSubtype)`: subtype not known to this build
    /// - `Err(MalformedPayload)`: known subtype, but the content is invalid
    pub fn decode(data: &DataMessage) -> SyncResult<SyncEvent> {
        let mut buf = data.content.as_slice();

        let event = match DataType::try_from(data.subtype)? {
            DataType::CameraData => SyncEvent::Camera(CameraKeyframe::read(&mut buf)?),
            DataType::TimeData => SyncEvent::Time(TimeKeyframe::read(&mut buf)?),
            DataType::ScriptData => SyncEvent::Script(ScriptMessage::read(&mut buf)?),
        };

        wire::expect_end(buf, "data message")?;
        Ok(event)
    }

    /// Encode a typed event into a data payload.
    pub fn encode(event: &SyncEvent) -> DataMessage {
        let mut content = Vec::new();
        let subtype = match event {
            SyncEvent::Camera(keyframe) => {
                keyframe.write(&mut content);
                DataType::CameraData
            }
            SyncEvent::Time(keyframe) => {
                keyframe.write(&mut content);
                DataType::TimeData
            }
            SyncEvent::Script(script) => {
                script.write(&mut content);
                DataType::ScriptData
            }
        };
        DataMessage::new(subtype, content)
    }

    /// Decode an event straight from a `Data` frame.
    pub fn decode_message(message: &Message) -> SyncResult<SyncEvent> {
        Self::decode(&DataMessage::from_message(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> SyncEvent {
        SyncEvent::Camera(CameraKeyframe {
            position: [1.5e11, -2.0, 3.25],
            rotation: [0.0, 0.0, 0.7071, 0.7071],
            follow_node_rotation: true,
            focus_node: "Earth".into(),
            scale: 1.0,
            timestamp: 12.5,
        })
    }

    #[test]
    fn test_events_round_trip_through_frames() {
        let events = vec![
            camera(),
            SyncEvent::Time(TimeKeyframe {
                time: 100.0,
                dt: 60.0,
                paused: false,
                requires_time_jump: true,
                timestamp: 13.0,
            }),
            SyncEvent::Script(ScriptMessage {
                script: "setPropertyValue('Scene.Earth.Enabled', false)".into(),
            }),
        ];

        for event in events {
            let message = DataDispatcher::encode(&event).to_message();
            assert_eq!(DataDispatcher::decode_message(&message).unwrap(), event);
        }
    }

    #[test]
    fn test_subtype_tags() {
        assert_eq!(DataDispatcher::encode(&camera()).subtype, 0);
        let script = SyncEvent::Script(ScriptMessage { script: String::new() });
        assert_eq!(DataDispatcher::encode(&script).subtype, 2);
    }

    #[test]
    fn test_unknown_subtype_is_recoverable() {
        let data = DataMessage {
            subtype: 17,
            content: vec![1, 2, 3],
        };

        // Still representable on the wire.
        let message = data.to_message();
        assert_eq!(DataMessage::from_message(&message).unwrap(), data);

        let err = DataDispatcher::decode(&data).unwrap_err();
        assert!(matches!(err, SyncError::UnknownDataSubtype(17)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_truncated_keyframe_is_malformed_payload() {
        let mut data = DataDispatcher::encode(&camera());
        data.content.truncate(20);

        assert!(matches!(
            DataDispatcher::decode(&data),
            Err(SyncError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_data_without_subtype_is_rejected() {
        let message = Message::new(MessageType::Data, vec![0, 1]);
        assert!(DataMessage::from_message(&message).is_err());
    }
}
