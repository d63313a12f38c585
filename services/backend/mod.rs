/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! CRUD backend boundary: templates and devices.

mod http;

pub use self::http::HttpBackend;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::graph::ChannelValue;
use crate::persistence::types::DashboardSnapshot;
use crate::registries::{ChannelDefinition, ChannelType};

pub type DeviceId = u64;
pub type TemplateId = u64;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: u64 },
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

/// Stored dashboard template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desktop_prototype: DashboardSnapshot,
    #[serde(default)]
    pub channels: Vec<ChannelDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
}

/// Device-side channel state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceChannel {
    pub name: String,
    pub value: ChannelValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<ChannelType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: DeviceId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub channels: Vec<DeviceChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<TemplateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
}

impl Device {
    pub fn channel(&self, name: &str) -> Option<&DeviceChannel> {
        self.channels.iter().find(|channel| channel.name == name)
    }

    /// Merge `incoming` by name: known channels are overwritten, new ones appended.
    pub fn merge_channels(&mut self, incoming: Vec<DeviceChannel>) {
        for channel in incoming {
            match self.channels.iter_mut().find(|known| known.name == channel.name) {
                Some(known) => *known = channel,
                None => self.channels.push(channel),
            }
        }
    }
}

pub trait TemplateBackend: Send + Sync {
    fn fetch_template(&self, id: TemplateId) -> impl Future<Output = Result<Template, BackendError>> + Send;

    fn update_template(&self, template: &Template) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn fetch_device(&self, id: DeviceId) -> impl Future<Output = Result<Device, BackendError>> + Send;
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryBackend;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryBackend {
        templates: Mutex<HashMap<TemplateId, Template>>,
        devices: Mutex<HashMap<DeviceId, Device>>,
    }

    impl MemoryBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_template(self, template: Template) -> Self {
            self.templates.lock().insert(template.id, template);
            self
        }

        pub fn with_device(self, device: Device) -> Self {
            self.devices.lock().insert(device.id, device);
            self
        }

        pub fn template(&self, id: TemplateId) -> Option<Template> {
            self.templates.lock().get(&id).cloned()
        }
    }

    impl TemplateBackend for MemoryBackend {
        fn fetch_template(&self, id: TemplateId) -> impl Future<Output = Result<Template, BackendError>> + Send {
            let result = self.template(id).ok_or(BackendError::NotFound {
                resource: "template",
                id,
            });
            async move { result }
        }

        fn update_template(&self, template: &Template) -> impl Future<Output = Result<(), BackendError>> + Send {
            let mut templates = self.templates.lock();
            let result = match templates.get_mut(&template.id) {
                Some(stored) => {
                    *stored = template.clone();
                    Ok(())
                },
                None => Err(BackendError::NotFound {
                    resource: "template",
                    id: template.id,
                }),
            };
            async move { result }
        }

        fn fetch_device(&self, id: DeviceId) -> impl Future<Output = Result<Device, BackendError>> + Send {
            let result = self.devices.lock().get(&id).cloned().ok_or(BackendError::NotFound {
                resource: "device",
                id,
            });
            async move { result }
        }
    }
}
