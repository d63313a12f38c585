/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Typed per-kind node payloads.
//!
//! Every node kind carries its own field struct. Runtime-only view data (the
//! outbound command handle, the channel picker's advisory list) never lives
//! here; see `runtime::binding::NodeBinding`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::GraphError;

/// Closed set of dashboard node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Button,
    Label,
    Slider,
    Select,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Button,
        NodeKind::Label,
        NodeKind::Slider,
        NodeKind::Select,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Button => "button",
            NodeKind::Label => "label",
            NodeKind::Slider => "slider",
            NodeKind::Select => "select",
        }
    }

    /// Human-readable prefix used for default labels ("Button 1").
    pub fn display_name(self) -> String {
        let words = self.as_str().split('-').collect::<Vec<_>>().join(" ");
        let mut chars = words.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GraphError::UnknownNodeKind(s.to_string()))
    }
}

/// Live value of a device channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Object(serde_json::Value),
}

impl ChannelValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ChannelValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Bool(value) => write!(f, "{value}"),
            ChannelValue::Number(value) => write!(f, "{value}"),
            ChannelValue::Text(value) => f.write_str(value),
            ChannelValue::Object(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for ChannelValue {
    fn from(value: bool) -> Self {
        ChannelValue::Bool(value)
    }
}

impl From<f64> for ChannelValue {
    fn from(value: f64) -> Self {
        ChannelValue::Number(value)
    }
}

impl From<&str> for ChannelValue {
    fn from(value: &str) -> Self {
        ChannelValue::Text(value.to_string())
    }
}

impl From<String> for ChannelValue {
    fn from(value: String) -> Self {
        ChannelValue::Text(value)
    }
}

/// One entry of a select node's option list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Boolean toggle bound to a channel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonData {
    pub label: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
}

/// Read-only display of a channel value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelData {
    pub label: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ChannelValue>,
}

/// Bounded numeric input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderData {
    pub label: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for SliderData {
    fn default() -> Self {
        Self {
            label: String::new(),
            channel: String::new(),
            value: None,
            min: 0.0,
            max: 100.0,
            step: 1.0,
        }
    }
}

impl SliderData {
    /// Clamp to `[min, max]` and snap to the nearest `step` above `min`.
    pub fn normalize(&self, raw: f64) -> f64 {
        let (low, high) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        let clamped = raw.clamp(low, high);
        if self.step > 0.0 {
            let steps = ((clamped - low) / self.step).round();
            (low + steps * self.step).min(high)
        } else {
            clamped
        }
    }

    /// Value to show before any device update has arrived.
    pub fn display_value(&self) -> f64 {
        self.value.unwrap_or(self.min)
    }
}

/// Enumerated string choice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectData {
    pub label: String,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub options: Vec<SelectOption>,
}

/// Persisted payload of a node, keyed by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Button(ButtonData),
    Label(LabelData),
    Slider(SliderData),
    Select(SelectData),
}

impl NodeData {
    pub fn default_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Button => NodeData::Button(ButtonData::default()),
            NodeKind::Label => NodeData::Label(LabelData::default()),
            NodeKind::Slider => NodeData::Slider(SliderData::default()),
            NodeKind::Select => NodeData::Select(SelectData::default()),
        }
    }

    pub fn with_label(kind: NodeKind, label: impl Into<String>) -> Self {
        let mut data = Self::default_for(kind);
        data.set_label(label.into());
        data
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Button(_) => NodeKind::Button,
            NodeData::Label(_) => NodeKind::Label,
            NodeData::Slider(_) => NodeKind::Slider,
            NodeData::Select(_) => NodeKind::Select,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            NodeData::Button(data) => &data.label,
            NodeData::Label(data) => &data.label,
            NodeData::Slider(data) => &data.label,
            NodeData::Select(data) => &data.label,
        }
    }

    pub fn set_label(&mut self, label: String) {
        match self {
            NodeData::Button(data) => data.label = label,
            NodeData::Label(data) => data.label = label,
            NodeData::Slider(data) => data.label = label,
            NodeData::Select(data) => data.label = label,
        }
    }

    /// Bound channel name, `None` while the node is unbound.
    pub fn channel(&self) -> Option<&str> {
        let channel = match self {
            NodeData::Button(data) => &data.channel,
            NodeData::Label(data) => &data.channel,
            NodeData::Slider(data) => &data.channel,
            NodeData::Select(data) => &data.channel,
        };
        (!channel.is_empty()).then_some(channel.as_str())
    }

    pub fn set_channel(&mut self, channel: String) {
        match self {
            NodeData::Button(data) => data.channel = channel,
            NodeData::Label(data) => data.channel = channel,
            NodeData::Slider(data) => data.channel = channel,
            NodeData::Select(data) => data.channel = channel,
        }
    }

    pub fn value(&self) -> Option<ChannelValue> {
        match self {
            NodeData::Button(data) => data.value.map(ChannelValue::Bool),
            NodeData::Label(data) => data.value.clone(),
            NodeData::Slider(data) => data.value.map(ChannelValue::Number),
            NodeData::Select(data) => data.value.clone().map(ChannelValue::Text),
        }
    }

    /// Store a live value. Returns `false` when the value does not fit the
    /// node kind; the previous value is kept in that case.
    pub fn set_value(&mut self, value: ChannelValue) -> bool {
        match (self, value) {
            (NodeData::Button(data), ChannelValue::Bool(value)) => data.value = Some(value),
            (NodeData::Button(data), ChannelValue::Number(value)) => data.value = Some(value != 0.0),
            (NodeData::Label(data), value) => data.value = Some(value),
            (NodeData::Slider(data), ChannelValue::Number(value)) => data.value = Some(value),
            (NodeData::Slider(data), ChannelValue::Text(text)) => match text.trim().parse() {
                Ok(value) => data.value = Some(value),
                Err(_) => return false,
            },
            (NodeData::Select(data), ChannelValue::Text(value)) => data.value = Some(value),
            (NodeData::Select(data), ChannelValue::Number(value)) => {
                data.value = Some(value.to_string())
            },
            _ => return false,
        }
        true
    }

    /// Serialize the kind-specific fields into the stored `data` object.
    pub fn to_json(&self) -> serde_json::Value {
        let encoded = match self {
            NodeData::Button(data) => serde_json::to_value(data),
            NodeData::Label(data) => serde_json::to_value(data),
            NodeData::Slider(data) => serde_json::to_value(data),
            NodeData::Select(data) => serde_json::to_value(data),
        };
        // Plain structs of strings and numbers always encode.
        encoded.unwrap_or(serde_json::Value::Null)
    }

    /// Parse a stored `data` object for `kind`. Unknown keys (including any
    /// leaked runtime fields) are ignored; missing keys take defaults.
    pub fn from_json(kind: NodeKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let value = if value.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            value
        };
        Ok(match kind {
            NodeKind::Button => NodeData::Button(serde_json::from_value(value)?),
            NodeKind::Label => NodeData::Label(serde_json::from_value(value)?),
            NodeKind::Slider => NodeData::Slider(serde_json::from_value(value)?),
            NodeKind::Select => NodeData::Select(serde_json::from_value(value)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(NodeKind::Button, "Button")]
    #[case(NodeKind::Label, "Label")]
    #[case(NodeKind::Slider, "Slider")]
    #[case(NodeKind::Select, "Select")]
    fn display_name_capitalizes_kind(#[case] kind: NodeKind, #[case] expected: &str) {
        assert_eq!(kind.display_name(), expected);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            "gauge".parse::<NodeKind>(),
            Err(GraphError::UnknownNodeKind(kind)) if kind == "gauge"
        ));
        assert_eq!("slider".parse::<NodeKind>().ok(), Some(NodeKind::Slider));
    }

    #[test]
    fn from_json_ignores_runtime_fields_and_fills_defaults() {
        let data = NodeData::from_json(
            NodeKind::Slider,
            json!({ "label": "Fan", "channel": "fan", "existingChannels": [], "onChange": null }),
        )
        .unwrap();

        let NodeData::Slider(slider) = data else {
            panic!("expected slider data");
        };
        assert_eq!(slider.label, "Fan");
        assert_eq!(slider.min, 0.0);
        assert_eq!(slider.max, 100.0);
        assert_eq!(slider.step, 1.0);
        assert_eq!(slider.value, None);
    }

    #[test]
    fn from_json_rejects_wrongly_typed_fields() {
        assert!(NodeData::from_json(NodeKind::Slider, json!({ "min": "low" })).is_err());
    }

    #[test]
    fn unbound_channel_reads_as_none() {
        let mut data = NodeData::default_for(NodeKind::Label);
        assert_eq!(data.channel(), None);
        data.set_channel("temp".to_string());
        assert_eq!(data.channel(), Some("temp"));
    }

    #[test]
    fn set_value_respects_node_kind() {
        let mut button = NodeData::default_for(NodeKind::Button);
        assert!(button.set_value(ChannelValue::Bool(true)));
        assert_eq!(button.value(), Some(ChannelValue::Bool(true)));
        assert!(!button.set_value(ChannelValue::Text("on".into())));
        assert_eq!(button.value(), Some(ChannelValue::Bool(true)));

        let mut slider = NodeData::default_for(NodeKind::Slider);
        assert!(slider.set_value(ChannelValue::Text(" 42 ".into())));
        assert_eq!(slider.value(), Some(ChannelValue::Number(42.0)));

        let mut label = NodeData::default_for(NodeKind::Label);
        assert!(label.set_value(ChannelValue::Object(json!({ "lat": 1 }))));
    }

    #[rstest]
    #[case(-5.0, 0.0)]
    #[case(150.0, 100.0)]
    #[case(42.4, 42.0)]
    #[case(42.6, 43.0)]
    fn slider_normalize_clamps_and_snaps(#[case] raw: f64, #[case] expected: f64) {
        let slider = SliderData::default();
        assert_eq!(slider.normalize(raw), expected);
    }

    #[test]
    fn slider_normalize_honours_fractional_step() {
        let slider = SliderData {
            min: 10.0,
            max: 11.0,
            step: 0.25,
            ..SliderData::default()
        };
        assert_eq!(slider.normalize(10.3), 10.25);
    }

    #[test]
    fn channel_value_untagged_decoding() {
        let values: Vec<ChannelValue> =
            serde_json::from_value(json!([true, 3.5, "auto", { "r": 1 }])).unwrap();
        assert_eq!(values[0], ChannelValue::Bool(true));
        assert_eq!(values[1], ChannelValue::Number(3.5));
        assert_eq!(values[2], ChannelValue::Text("auto".into()));
        assert!(matches!(values[3], ChannelValue::Object(_)));
    }
}
