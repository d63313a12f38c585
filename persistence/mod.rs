/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dashboard export/import.
//!
//! The artifact is a JSON object `{ nodes, edges, viewport }`. Runtime view
//! data never reaches it: node payloads hold persisted fields only.

pub mod types;

use std::path::Path;

use log::warn;
use thiserror::Error;

use crate::model::graph::{Graph, GraphError, Viewport};
use types::DashboardSnapshot;

pub const DEFAULT_EXPORT_FILE_NAME: &str = "flow.json";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("malformed dashboard artifact: {0}")]
    Malformed(String),
    #[error("invalid dashboard graph: {0}")]
    Graph(#[from] GraphError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn export_snapshot(graph: &Graph, viewport: Viewport) -> DashboardSnapshot {
    graph.to_snapshot(viewport)
}

pub fn export_to_string(graph: &Graph, viewport: Viewport) -> Result<String, PersistenceError> {
    serde_json::to_string_pretty(&export_snapshot(graph, viewport))
        .map_err(|e| PersistenceError::Malformed(e.to_string()))
}

/// Parse an artifact into the stored shape without building a graph.
pub fn parse_snapshot(text: &str) -> Result<DashboardSnapshot, PersistenceError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| PersistenceError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(PersistenceError::Malformed(
            "top-level value is not an object".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| PersistenceError::Malformed(e.to_string()))
}

/// Parse an artifact and rebuild the graph. Nothing is returned on failure,
/// so callers can keep their live graph untouched.
pub fn import_from_str(text: &str) -> Result<(Graph, Viewport), PersistenceError> {
    let snapshot = parse_snapshot(text)?;
    Ok(Graph::from_snapshot(&snapshot)?)
}

pub fn save_to_path(path: &Path, graph: &Graph, viewport: Viewport) -> Result<(), PersistenceError> {
    let text = export_to_string(graph, viewport)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<(Graph, Viewport), PersistenceError> {
    let text = std::fs::read_to_string(path)?;
    import_from_str(&text).inspect_err(|e| warn!("Failed to load dashboard {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{Connection, Node, NodeChange, NodeData, NodeKind, SelectOption};
    use euclid::default::Point2D;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_graph() -> Graph {
        let mut graph = Graph::new();
        let mut select = NodeData::with_label(NodeKind::Select, "Mode");
        if let NodeData::Select(data) = &mut select {
            data.channel = "mode".into();
            data.options = vec![SelectOption::new("Auto", "auto")];
        }
        graph.apply_node_changes([
            NodeChange::Add {
                node: Node::new("button-1", Point2D::new(100.0, 100.0), NodeData::with_label(NodeKind::Button, "Button 1")),
            },
            NodeChange::Add {
                node: Node::new("select-1", Point2D::new(-40.5, 12.25), select),
            },
        ]);
        graph
            .connect(Connection::new("button-1", "select-1").with_handles(Some("a"), Some("b")))
            .unwrap();
        graph
    }

    #[test]
    fn test_export_import_round_trip() {
        let graph = sample_graph();
        let viewport = Viewport {
            x: 3.0,
            y: 4.0,
            zoom: 0.75,
        };

        let text = export_to_string(&graph, viewport).unwrap();
        let (restored, restored_viewport) = import_from_str(&text).unwrap();

        assert_eq!(restored_viewport, viewport);
        assert_eq!(export_snapshot(&restored, restored_viewport), export_snapshot(&graph, viewport));
    }

    #[test]
    fn test_import_rejects_non_object() {
        assert!(matches!(import_from_str("[1, 2]"), Err(PersistenceError::Malformed(_))));
        assert!(matches!(import_from_str("not json"), Err(PersistenceError::Malformed(_))));
    }

    #[test]
    fn test_import_fills_missing_sections() {
        let (graph, viewport) = import_from_str(r#"{ "nodes": [] }"#).unwrap();
        assert!(graph.is_empty());
        assert_eq!(viewport, Viewport::default());
    }

    #[test]
    fn test_import_strips_runtime_fields() {
        let text = json!({
            "nodes": [{
                "id": "label-1",
                "type": "label",
                "position": { "x": 1, "y": 2 },
                "data": { "label": "Temp", "channel": "temp", "existingChannels": [{ "name": "temp" }] }
            }]
        })
        .to_string();
        let (graph, _) = import_from_str(&text).unwrap();
        let exported = export_to_string(&graph, Viewport::default()).unwrap();
        assert!(!exported.contains("existingChannels"));
    }

    #[test]
    fn test_import_unknown_kind_fails() {
        let text = r#"{ "nodes": [{ "id": "x", "type": "gauge" }] }"#;
        assert!(matches!(
            import_from_str(text),
            Err(PersistenceError::Graph(GraphError::UnknownNodeKind(_)))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_EXPORT_FILE_NAME);
        let graph = sample_graph();

        save_to_path(&path, &graph, Viewport::default()).unwrap();
        let (restored, _) = load_from_path(&path).unwrap();

        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);
        assert_eq!(restored.get_node("select-1").unwrap().data, graph.get_node("select-1").unwrap().data);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_from_path(&dir.path().join("absent.json")),
            Err(PersistenceError::Io(_))
        ));
    }
}
