/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashMap;

use thiserror::Error;

use crate::model::graph::{NodeData, NodeKind, SelectOption};

use super::channel::{ChannelDefinition, ChannelType, find_channel};

/// Property keys a node kind exposes in its editor panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Label,
    Channel,
    Min,
    Max,
    Step,
    Options,
}

impl PropertyKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKey::Label => "label",
            PropertyKey::Channel => "channel",
            PropertyKey::Min => "min",
            PropertyKey::Max => "max",
            PropertyKey::Step => "step",
            PropertyKey::Options => "options",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub kind: NodeKind,
    pub renderer_id: &'static str,
    pub channel_type: ChannelType,
    pub properties: &'static [PropertyKey],
}

/// One `{key, value}` entry of a property-editor batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEdit {
    Label(String),
    Channel(String),
    Min(f64),
    Max(f64),
    Step(f64),
    Options(Vec<SelectOption>),
}

impl PropertyEdit {
    pub fn key(&self) -> PropertyKey {
        match self {
            PropertyEdit::Label(_) => PropertyKey::Label,
            PropertyEdit::Channel(_) => PropertyKey::Channel,
            PropertyEdit::Min(_) => PropertyKey::Min,
            PropertyEdit::Max(_) => PropertyKey::Max,
            PropertyEdit::Step(_) => PropertyKey::Step,
            PropertyEdit::Options(_) => PropertyKey::Options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("property '{key}' does not apply to {kind} nodes")]
    NotApplicable { kind: NodeKind, key: &'static str },
    #[error("node kind '{0}' is not registered")]
    Unregistered(NodeKind),
    #[error("property '{key}' must be a finite number")]
    NonFinite { key: &'static str },
}

/// Entry picked in the channel picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelChoice {
    Existing(String),
    Custom,
}

/// Channel picker content for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPicker {
    pub existing: Vec<String>,
    /// The bound name is not one of `existing` (typed in by hand).
    pub custom: bool,
    pub current: String,
}

/// Row-level edit of a select node's option list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionEdit {
    Add,
    Remove(usize),
    SetLabel(usize, String),
    SetValue(usize, String),
}

#[derive(Debug, Clone)]
pub struct NodeRegistry {
    descriptors: HashMap<NodeKind, NodeDescriptor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: NodeDescriptor) {
        self.descriptors.insert(descriptor.kind, descriptor);
    }

    pub fn describe(&self, kind: NodeKind) -> Option<&NodeDescriptor> {
        self.descriptors.get(&kind)
    }

    /// Registered kinds in palette order.
    pub fn kinds(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<NodeKind> = self.descriptors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn renderer_id(&self, kind: NodeKind) -> &'static str {
        self.describe(kind)
            .map(|descriptor| descriptor.renderer_id)
            .unwrap_or("renderer:fallback")
    }

    /// Type declared for a channel first bound on a node of `kind`.
    pub fn implied_channel_type(&self, kind: NodeKind) -> ChannelType {
        self.describe(kind)
            .map(|descriptor| descriptor.channel_type)
            .unwrap_or(ChannelType::String)
    }

    pub fn property_fields(&self, kind: NodeKind) -> &'static [PropertyKey] {
        self.describe(kind)
            .map(|descriptor| descriptor.properties)
            .unwrap_or(&[])
    }

    /// Apply a whole batch to a copy of `data`. Nothing is applied when any
    /// edit in the batch does not fit the node kind.
    pub fn apply_property_edits(
        &self,
        data: &NodeData,
        edits: &[PropertyEdit],
    ) -> Result<NodeData, PropertyError> {
        let kind = data.kind();
        let fields = self.property_fields(kind);
        if fields.is_empty() {
            return Err(PropertyError::Unregistered(kind));
        }
        let mut next = data.clone();
        for edit in edits {
            let key = edit.key();
            if !fields.contains(&key) {
                return Err(PropertyError::NotApplicable {
                    kind,
                    key: key.as_str(),
                });
            }
            if let PropertyEdit::Min(number) | PropertyEdit::Max(number) | PropertyEdit::Step(number) = edit
                && !number.is_finite()
            {
                return Err(PropertyError::NonFinite { key: key.as_str() });
            }
            match (&mut next, edit) {
                (data, PropertyEdit::Label(label)) => data.set_label(label.clone()),
                (data, PropertyEdit::Channel(channel)) => data.set_channel(channel.clone()),
                (NodeData::Slider(slider), PropertyEdit::Min(min)) => slider.min = *min,
                (NodeData::Slider(slider), PropertyEdit::Max(max)) => slider.max = *max,
                (NodeData::Slider(slider), PropertyEdit::Step(step)) => slider.step = *step,
                (NodeData::Select(select), PropertyEdit::Options(options)) => {
                    select.options = options.clone()
                },
                _ => {
                    return Err(PropertyError::NotApplicable {
                        kind,
                        key: key.as_str(),
                    });
                },
            }
        }
        Ok(next)
    }

    pub fn channel_picker(&self, data: &NodeData, channels: &[ChannelDefinition]) -> ChannelPicker {
        let existing: Vec<String> = channels.iter().map(|channel| channel.name.clone()).collect();
        let current = data.channel().unwrap_or_default().to_string();
        ChannelPicker {
            custom: !existing.contains(&current),
            existing,
            current,
        }
    }

    /// Edit batch produced by picking `choice` in the channel picker.
    ///
    /// On a select node, the channel and the option list change together.
    pub fn channel_choice_edits(
        &self,
        data: &NodeData,
        choice: &ChannelChoice,
        channels: &[ChannelDefinition],
    ) -> Vec<PropertyEdit> {
        let name = match choice {
            ChannelChoice::Existing(name) => name.clone(),
            ChannelChoice::Custom => String::new(),
        };
        if data.kind() != NodeKind::Select {
            return vec![PropertyEdit::Channel(name)];
        }
        let options = find_channel(channels, &name)
            .and_then(|channel| channel.options.clone())
            .unwrap_or_default();
        vec![PropertyEdit::Channel(name), PropertyEdit::Options(options)]
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(NodeDescriptor {
            kind: NodeKind::Button,
            renderer_id: "renderer:button",
            channel_type: ChannelType::Boolean,
            properties: &[PropertyKey::Label, PropertyKey::Channel],
        });
        registry.register(NodeDescriptor {
            kind: NodeKind::Label,
            renderer_id: "renderer:label",
            channel_type: ChannelType::String,
            properties: &[PropertyKey::Label, PropertyKey::Channel],
        });
        registry.register(NodeDescriptor {
            kind: NodeKind::Slider,
            renderer_id: "renderer:slider",
            channel_type: ChannelType::Number,
            properties: &[
                PropertyKey::Label,
                PropertyKey::Channel,
                PropertyKey::Min,
                PropertyKey::Max,
                PropertyKey::Step,
            ],
        });
        registry.register(NodeDescriptor {
            kind: NodeKind::Select,
            renderer_id: "renderer:select",
            channel_type: ChannelType::Select,
            properties: &[PropertyKey::Label, PropertyKey::Channel, PropertyKey::Options],
        });
        registry
    }
}

/// Option-list edit expressed as a full replacement batch.
pub fn option_list_edit(current: &[SelectOption], edit: OptionEdit) -> PropertyEdit {
    let mut options = current.to_vec();
    match edit {
        OptionEdit::Add => options.push(SelectOption::default()),
        OptionEdit::Remove(index) => {
            if index < options.len() {
                options.remove(index);
            }
        },
        OptionEdit::SetLabel(index, label) => {
            if let Some(option) = options.get_mut(index) {
                option.label = label;
            }
        },
        OptionEdit::SetValue(index, value) => {
            if let Some(option) = options.get_mut(index) {
                option.value = value;
            }
        },
    }
    PropertyEdit::Options(options)
}
