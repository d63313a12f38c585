/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Live channel binding for one mounted dashboard view.
//!
//! Inbound: every `device_data` event for the shown device is merged into the
//! held device state, then one pass over all nodes replaces each node's value
//! from the channel of the same name. Outbound: node interactions go through a
//! [`ChannelCommandHandle`], which forwards only declared channels and never
//! touches local state; the echo from the server is what updates the view.
//!
//! Per-node runtime data ([`NodeBinding`]) lives beside the graph, keyed by
//! node id, and is rebuilt on every pass.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::model::graph::{ChannelValue, Graph, Node, NodeChange, NodeData, SliderData};
use crate::registries::atomic::channel::{ChannelDefinition, find_channel};
use crate::services::backend::{Device, DeviceId};
use crate::services::transport::{
    DevicePayload, DeviceUpdate, InboundEvent, TransportClient, TransportError,
};

/// Outbound command path shared by every node of one view.
#[derive(Clone)]
pub struct ChannelCommandHandle {
    client: Arc<TransportClient>,
    device: DeviceId,
    channels: Arc<[ChannelDefinition]>,
}

impl ChannelCommandHandle {
    pub fn new(client: Arc<TransportClient>, device: DeviceId, channels: Arc<[ChannelDefinition]>) -> Self {
        Self {
            client,
            device,
            channels,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Send `value` on `channel`. Returns whether a frame was queued.
    ///
    /// Undeclared channels and values that do not fit the declared type are
    /// dropped without an error.
    pub fn emit(&self, channel: &str, value: ChannelValue) -> bool {
        let Some(definition) = find_channel(&self.channels, channel) else {
            log::debug!("binding: dropped command for undeclared channel '{channel}'");
            return false;
        };
        let Some(value) = definition.channel_type.coerce(value.clone()) else {
            log::warn!(
                "binding: dropped command for '{channel}': {value} is not a {:?}",
                definition.channel_type
            );
            return false;
        };
        match self
            .client
            .emit_update(DeviceUpdate::single(self.device, channel, value))
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!("binding: command for '{channel}' not sent: {e}");
                false
            },
        }
    }
}

/// Runtime-only data joined to a node by id.
#[derive(Clone)]
pub struct NodeBinding {
    pub node_id: String,
    pub channel: Option<String>,
    pub command: ChannelCommandHandle,
}

impl NodeBinding {
    /// Forward an interaction on this node to its bound channel.
    pub fn interact(&self, value: ChannelValue) -> bool {
        match &self.channel {
            Some(channel) => self.command.emit(channel, value),
            None => {
                log::debug!("binding: node '{}' has no channel", self.node_id);
                false
            },
        }
    }
}

pub struct ChannelBindingRuntime {
    client: Arc<TransportClient>,
    device: Device,
    command: ChannelCommandHandle,
    bindings: Vec<NodeBinding>,
    events: broadcast::Receiver<InboundEvent>,
    mounted: bool,
}

impl ChannelBindingRuntime {
    /// Subscribe, join `device`'s room and run the first pass over `graph`.
    pub fn mount(
        client: Arc<TransportClient>,
        device: Device,
        channels: Vec<ChannelDefinition>,
        graph: &mut Graph,
    ) -> Result<Self, TransportError> {
        let events = client.subscribe();
        client.join(device.id)?;
        let command = ChannelCommandHandle::new(client.clone(), device.id, channels.into());
        let mut runtime = Self {
            client,
            device,
            command,
            bindings: Vec::new(),
            events,
            mounted: true,
        };
        runtime.reconcile(graph);
        Ok(runtime)
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn command_handle(&self) -> ChannelCommandHandle {
        self.command.clone()
    }

    pub fn bindings(&self) -> &[NodeBinding] {
        &self.bindings
    }

    pub fn binding(&self, node_id: &str) -> Option<&NodeBinding> {
        self.bindings.iter().find(|binding| binding.node_id == node_id)
    }

    /// Apply one inbound event. Returns `true` when node values were recomputed.
    pub fn handle_event(&mut self, event: InboundEvent, graph: &mut Graph) -> bool {
        match event {
            InboundEvent::DeviceData(payload) => self.handle_device_payload(payload, graph),
            InboundEvent::JoinedRoom(data) => {
                log::debug!("binding: joined room {data}");
                false
            },
            InboundEvent::LeftRoom(data) => {
                log::debug!("binding: left room {data}");
                false
            },
        }
    }

    fn handle_device_payload(&mut self, payload: DevicePayload, graph: &mut Graph) -> bool {
        if payload.id != self.device.id {
            return false;
        }
        if let Some(name) = payload.name {
            self.device.name = name;
        }
        if let Some(status) = payload.status {
            match serde_json::from_value(serde_json::Value::String(status.clone())) {
                Ok(status) => self.device.status = status,
                Err(_) => log::debug!("binding: unknown device status '{status}'"),
            }
        }
        self.device.merge_channels(payload.channels);
        self.reconcile(graph);
        true
    }

    /// Recompute every node's value from the held device state and rebuild
    /// the per-node bindings. Nodes without a matching channel keep their
    /// previous value.
    pub fn reconcile(&mut self, graph: &mut Graph) -> usize {
        let mut changes = Vec::with_capacity(graph.node_count());
        let mut bindings = Vec::with_capacity(graph.node_count());
        for node in graph.nodes() {
            let mut data = node.data.clone();
            if let Some(live) = data.channel().and_then(|name| self.device.channel(name))
                && !data.set_value(live.value.clone())
            {
                log::debug!(
                    "binding: channel '{}' value {} does not fit {} node '{}'",
                    live.name,
                    live.value,
                    node.kind(),
                    node.id
                );
            }
            bindings.push(NodeBinding {
                node_id: node.id.clone(),
                channel: data.channel().map(str::to_string),
                command: self.command.clone(),
            });
            changes.push(NodeChange::Replace {
                id: node.id.clone(),
                node: Node { data, ..node.clone() },
            });
        }
        self.bindings = bindings;
        graph.apply_node_changes(changes)
    }

    /// Drain every queued inbound event in receipt order.
    pub fn poll(&mut self, graph: &mut Graph) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if self.handle_event(event, graph) {
                        applied += 1;
                    }
                },
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("binding: fell behind, {skipped} device updates skipped");
                },
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Wait for the next inbound event. `None` once the transport is gone.
    pub async fn next_event(&mut self) -> Option<InboundEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("binding: fell behind, {skipped} device updates skipped");
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Leave the device room. Also runs on drop.
    pub fn unmount(mut self) -> Result<(), TransportError> {
        self.mounted = false;
        self.client.leave(self.device.id)
    }
}

impl Drop for ChannelBindingRuntime {
    fn drop(&mut self) {
        if self.mounted
            && let Err(e) = self.client.leave(self.device.id)
        {
            log::warn!("binding: failed to leave room {}: {e}", self.device.id);
        }
    }
}

/// Slider gesture: drag frames update a local display value, completion
/// sends the single command.
#[derive(Debug, Clone)]
pub struct SliderDrag {
    node_id: String,
    slider: SliderData,
    display: f64,
}

impl SliderDrag {
    pub fn begin(node: &Node) -> Option<Self> {
        let NodeData::Slider(slider) = &node.data else {
            return None;
        };
        Some(Self {
            node_id: node.id.clone(),
            display: slider.display_value(),
            slider: slider.clone(),
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn display_value(&self) -> f64 {
        self.display
    }

    /// Track one drag frame. Local only.
    pub fn update(&mut self, raw: f64) -> f64 {
        self.display = self.slider.normalize(raw);
        self.display
    }

    /// Finish the gesture and send the final value on the slider's channel.
    pub fn complete(self, command: &ChannelCommandHandle) -> bool {
        let Some(channel) = (!self.slider.channel.is_empty()).then_some(self.slider.channel.as_str()) else {
            return false;
        };
        command.emit(channel, ChannelValue::Number(self.display))
    }
}
