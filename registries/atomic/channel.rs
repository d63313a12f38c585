/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

use crate::model::graph::{ChannelValue, Graph, SelectOption};

use super::node_kind::NodeRegistry;

/// Declared value type of a template channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    String,
    Number,
    Boolean,
    Object,
    Select,
}

impl ChannelType {
    /// Convert `value` into this type's representation.
    ///
    /// Returns `None` when no lossless reading exists.
    pub fn coerce(self, value: ChannelValue) -> Option<ChannelValue> {
        match (self, value) {
            (ChannelType::Boolean, ChannelValue::Bool(value)) => Some(ChannelValue::Bool(value)),
            (ChannelType::Boolean, ChannelValue::Text(text)) => {
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "on" | "1" => Some(ChannelValue::Bool(true)),
                    "false" | "off" | "0" => Some(ChannelValue::Bool(false)),
                    _ => None,
                }
            },
            (ChannelType::Boolean, ChannelValue::Number(value)) => Some(ChannelValue::Bool(value != 0.0)),
            (ChannelType::Number, ChannelValue::Number(value)) => Some(ChannelValue::Number(value)),
            (ChannelType::Number, ChannelValue::Text(text)) => {
                text.trim().parse().ok().map(ChannelValue::Number)
            },
            (ChannelType::Number, ChannelValue::Bool(value)) => {
                Some(ChannelValue::Number(if value { 1.0 } else { 0.0 }))
            },
            (ChannelType::String | ChannelType::Select, ChannelValue::Text(text)) => {
                Some(ChannelValue::Text(text))
            },
            (ChannelType::String | ChannelType::Select, ChannelValue::Bool(value)) => {
                Some(ChannelValue::Text(value.to_string()))
            },
            (ChannelType::String | ChannelType::Select, ChannelValue::Number(value)) => {
                Some(ChannelValue::Text(value.to_string()))
            },
            (ChannelType::Object, value) => Some(value),
            (_, ChannelValue::Object(_)) => None,
        }
    }
}

/// Template-level declaration of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
}

impl ChannelDefinition {
    pub fn new(name: impl Into<String>, channel_type: ChannelType) -> Self {
        Self {
            name: name.into(),
            channel_type,
            options: None,
        }
    }
}

pub fn find_channel<'a>(channels: &'a [ChannelDefinition], name: &str) -> Option<&'a ChannelDefinition> {
    channels.iter().find(|channel| channel.name == name)
}

/// Union of `existing` and the channels bound by `graph`'s nodes.
///
/// Existing entries are kept in order even when no node references them.
/// A newly seen name is declared with its first node's implied type.
pub fn merge_channel_definitions(
    existing: &[ChannelDefinition],
    graph: &Graph,
    registry: &NodeRegistry,
) -> Vec<ChannelDefinition> {
    let mut merged = Vec::with_capacity(existing.len());
    for channel in existing {
        if find_channel(&merged, &channel.name).is_none() {
            merged.push(channel.clone());
        }
    }
    for (name, kind) in graph.bound_channels() {
        if find_channel(&merged, name).is_none() {
            merged.push(ChannelDefinition::new(name, registry.implied_channel_type(kind)));
        }
    }
    merged
}
