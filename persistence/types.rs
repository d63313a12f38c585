/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable types for the dashboard artifact.
//!
//! Field names follow the stored template prototype (`type`, `sourceHandle`),
//! not the in-memory model.

use serde::{Deserialize, Serialize};

use crate::model::graph::Viewport;

/// Persisted graph position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedPosition {
    pub x: f32,
    pub y: f32,
}

/// Persisted node. `data` stays an open object until the kind is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: PersistedPosition,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

/// Persisted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
}

/// The export/import artifact and the template's `desktopPrototype`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSnapshot {
    pub nodes: Vec<PersistedNode>,
    pub edges: Vec<PersistedEdge>,
    pub viewport: Viewport,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_sections_take_neutral_defaults() {
        let snapshot: DashboardSnapshot = serde_json::from_value(json!({})).unwrap();
        assert!(snapshot.nodes.is_empty());
        assert!(snapshot.edges.is_empty());
        assert_eq!(snapshot.viewport, Viewport::default());
    }

    #[test]
    fn edge_handles_use_camel_case() {
        let edge = PersistedEdge {
            id: "e".into(),
            source: "a".into(),
            target: "b".into(),
            source_handle: Some("out".into()),
            target_handle: None,
            selected: false,
        };
        assert_eq!(
            serde_json::to_value(&edge).unwrap(),
            json!({ "id": "e", "source": "a", "target": "b", "sourceHandle": "out" })
        );
    }
}
