/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Live-update transport boundary.
//!
//! One [`TransportClient`] is built by the composition root and shared by
//! every open dashboard view. Room membership is reference-counted here, so
//! a view leaving a device room never cuts off another view of that device.

mod websocket;

pub use websocket::WebSocketTransport;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::graph::ChannelValue;
use crate::services::backend::{DeviceChannel, DeviceId};

pub const JOIN_DEVICE_ROOM: &str = "join_device_room";
pub const LEAVE_DEVICE_ROOM: &str = "leave_device_room";
pub const UPDATE_DEVICE_CHANNEL: &str = "update_device_pin";
pub const DEVICE_DATA: &str = "device_data";
pub const JOINED_DEVICE_ROOM: &str = "joined_device_room";
pub const LEFT_DEVICE_ROOM: &str = "leaved_device_room";

/// Capacity of the inbound event fan-out.
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport is closed")]
    Closed,
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid auth header: {0}")]
    InvalidHeader(String),
}

/// `{ "event", "data" }` text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub name: String,
    pub value: ChannelValue,
}

/// Outbound channel command, keyed by channel name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub id: DeviceId,
    pub channels: Vec<ChannelUpdate>,
}

impl DeviceUpdate {
    pub fn single(id: DeviceId, name: impl Into<String>, value: ChannelValue) -> Self {
        Self {
            id,
            channels: vec![ChannelUpdate {
                name: name.into(),
                value,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Join(DeviceId),
    Leave(DeviceId),
    Update(DeviceUpdate),
}

impl OutboundFrame {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundFrame::Join(_) => JOIN_DEVICE_ROOM,
            OutboundFrame::Leave(_) => LEAVE_DEVICE_ROOM,
            OutboundFrame::Update(_) => UPDATE_DEVICE_CHANNEL,
        }
    }

    pub fn to_wire(&self) -> Result<WireFrame, TransportError> {
        let data = match self {
            OutboundFrame::Join(id) | OutboundFrame::Leave(id) => serde_json::to_value(id)?,
            OutboundFrame::Update(update) => serde_json::to_value(update)?,
        };
        Ok(WireFrame {
            event: self.event_name().to_string(),
            data,
        })
    }
}

/// Full or partial device state pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePayload {
    pub id: DeviceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub channels: Vec<DeviceChannel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DeviceData(DevicePayload),
    JoinedRoom(serde_json::Value),
    LeftRoom(serde_json::Value),
}

impl InboundEvent {
    /// Decode a wire frame. Unknown events and undecodable payloads yield `None`.
    pub fn from_wire(frame: WireFrame) -> Option<Self> {
        match frame.event.as_str() {
            DEVICE_DATA => match serde_json::from_value(frame.data) {
                Ok(payload) => Some(InboundEvent::DeviceData(payload)),
                Err(e) => {
                    log::warn!("transport: undecodable {DEVICE_DATA} payload: {e}");
                    None
                },
            },
            JOINED_DEVICE_ROOM => Some(InboundEvent::JoinedRoom(frame.data)),
            LEFT_DEVICE_ROOM => Some(InboundEvent::LeftRoom(frame.data)),
            other => {
                log::debug!("transport: ignoring event '{other}'");
                None
            },
        }
    }
}

/// A live connection able to send frames and fan out inbound events.
pub trait Transport: Send + Sync {
    /// Queue `frame` for sending. Never blocks.
    fn send(&self, frame: OutboundFrame) -> Result<(), TransportError>;

    fn subscribe(&self) -> broadcast::Receiver<InboundEvent>;
}

pub struct TransportClient {
    transport: Arc<dyn Transport>,
    rooms: Mutex<HashMap<DeviceId, usize>>,
}

impl TransportClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Add one member to `device`'s room. Only the first member joins on the wire.
    pub fn join(&self, device: DeviceId) -> Result<(), TransportError> {
        let mut rooms = self.rooms.lock();
        let members = rooms.get(&device).copied().unwrap_or(0);
        if members == 0 {
            self.transport.send(OutboundFrame::Join(device))?;
            log::debug!("transport: joined room {device}");
        }
        rooms.insert(device, members + 1);
        Ok(())
    }

    /// Drop one member from `device`'s room. Only the last member leaves on
    /// the wire; leaving a room with no members is a no-op.
    pub fn leave(&self, device: DeviceId) -> Result<(), TransportError> {
        let mut rooms = self.rooms.lock();
        let Some(members) = rooms.get_mut(&device) else {
            return Ok(());
        };
        *members = members.saturating_sub(1);
        if *members > 0 {
            return Ok(());
        }
        rooms.remove(&device);
        log::debug!("transport: left room {device}");
        self.transport.send(OutboundFrame::Leave(device))
    }

    pub fn room_members(&self, device: DeviceId) -> usize {
        self.rooms.lock().get(&device).copied().unwrap_or(0)
    }

    pub fn emit_update(&self, update: DeviceUpdate) -> Result<(), TransportError> {
        self.transport.send(OutboundFrame::Update(update))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.transport.subscribe()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryTransport;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::*;

    /// Records outbound frames and lets tests inject inbound events.
    pub struct MemoryTransport {
        sent: Mutex<Vec<OutboundFrame>>,
        inbound: broadcast::Sender<InboundEvent>,
    }

    impl MemoryTransport {
        pub fn new() -> Self {
            let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
            Self {
                sent: Mutex::new(Vec::new()),
                inbound,
            }
        }

        pub fn sent_frames(&self) -> Vec<OutboundFrame> {
            self.sent.lock().clone()
        }

        pub fn sent_updates(&self) -> Vec<DeviceUpdate> {
            self.sent
                .lock()
                .iter()
                .filter_map(|frame| match frame {
                    OutboundFrame::Update(update) => Some(update.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn inject(&self, event: InboundEvent) {
            let _ = self.inbound.send(event);
        }
    }

    impl Default for MemoryTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Transport for MemoryTransport {
        fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
            self.sent.lock().push(frame);
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
            self.inbound.subscribe()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> (Arc<MemoryTransport>, TransportClient) {
        let transport = Arc::new(MemoryTransport::new());
        let client = TransportClient::new(transport.clone());
        (transport, client)
    }

    #[test]
    fn rooms_are_reference_counted() {
        let (transport, client) = client();
        client.join(7).unwrap();
        client.join(7).unwrap();
        client.join(9).unwrap();
        assert_eq!(client.room_members(7), 2);

        client.leave(7).unwrap();
        assert_eq!(transport.sent_frames(), vec![OutboundFrame::Join(7), OutboundFrame::Join(9)]);

        client.leave(7).unwrap();
        client.leave(7).unwrap();
        assert_eq!(
            transport.sent_frames(),
            vec![OutboundFrame::Join(7), OutboundFrame::Join(9), OutboundFrame::Leave(7)]
        );
        assert_eq!(client.room_members(9), 1);
    }

    #[test]
    fn update_frame_is_keyed_by_channel_name() {
        let frame = OutboundFrame::Update(DeviceUpdate::single(3, "relay", ChannelValue::Bool(true)));
        let wire = frame.to_wire().unwrap();
        assert_eq!(
            serde_json::to_value(&wire).unwrap(),
            json!({
                "event": "update_device_pin",
                "data": { "id": 3, "channels": [{ "name": "relay", "value": true }] }
            })
        );
    }

    #[test]
    fn inbound_device_data_decodes_partial_payload() {
        let event = InboundEvent::from_wire(WireFrame {
            event: DEVICE_DATA.into(),
            data: json!({ "id": 3, "channels": [{ "name": "temp", "value": 21.5 }] }),
        });
        let Some(InboundEvent::DeviceData(payload)) = event else {
            panic!("expected device data");
        };
        assert_eq!(payload.id, 3);
        assert_eq!(payload.name, None);
        assert_eq!(payload.channels[0].value, ChannelValue::Number(21.5));
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert!(InboundEvent::from_wire(WireFrame {
            event: "ping".into(),
            data: serde_json::Value::Null,
        })
        .is_none());
    }
}
