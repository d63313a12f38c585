/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Copy/paste of node subsets with id remapping.

use std::collections::{HashMap, HashSet};

use euclid::default::Vector2D;
use uuid::Uuid;

use super::graph::{Edge, Graph, Node};

pub const DEFAULT_PASTE_OFFSET: f32 = 50.0;

const COPY_SUFFIX: &str = " (copy)";

/// Nodes and edges ready to be inserted by a paste.
#[derive(Debug, Clone, PartialEq)]
pub struct PastePlan {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Copied node id -> pasted node id.
    pub id_map: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Clipboard {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Capture the current selection, else the active node.
    ///
    /// A selection keeps only edges internal to it. A lone active node keeps
    /// every edge incident to it. Returns `false` when there is nothing to
    /// copy; the previous clipboard is kept in that case.
    pub fn copy(&mut self, graph: &Graph, active: Option<&str>) -> bool {
        let selected: Vec<Node> = graph.selected_nodes().cloned().collect();
        if !selected.is_empty() {
            let ids: HashSet<&str> = selected.iter().map(|node| node.id.as_str()).collect();
            self.edges = graph
                .edges()
                .filter(|edge| ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str()))
                .cloned()
                .collect();
            self.nodes = selected;
            return true;
        }

        let Some(node) = active.and_then(|id| graph.get_node(id)) else {
            return false;
        };
        self.edges = graph.incident_edges(&node.id).into_iter().cloned().collect();
        self.nodes = vec![node.clone()];
        true
    }

    /// Build fresh copies of the clipboard content for insertion into `graph`.
    ///
    /// Every pasted node gets a new id. Edge endpoints are remapped through
    /// the copied set; an endpoint outside it must still exist in `graph`,
    /// otherwise the edge is left out.
    pub fn paste(&self, graph: &Graph, offset: f32) -> Option<PastePlan> {
        if self.is_empty() {
            return None;
        }
        let delta = Vector2D::new(offset, offset);

        let mut id_map = HashMap::with_capacity(self.nodes.len());
        let nodes = self
            .nodes
            .iter()
            .map(|source| {
                let id = Node::fresh_id(source.kind());
                id_map.insert(source.id.clone(), id.clone());
                let mut data = source.data.clone();
                if !data.label().is_empty() {
                    data.set_label(format!("{}{COPY_SUFFIX}", data.label()));
                }
                Node {
                    id,
                    position: source.position + delta,
                    data,
                    selected: true,
                }
            })
            .collect();

        let remap = |id: &str| -> Option<String> {
            id_map
                .get(id)
                .cloned()
                .or_else(|| graph.contains_node(id).then(|| id.to_string()))
        };
        let edges = self
            .edges
            .iter()
            .filter_map(|edge| {
                let (Some(source), Some(target)) = (remap(&edge.source), remap(&edge.target)) else {
                    log::debug!("clipboard: dropped edge {} with vanished endpoint", edge.id);
                    return None;
                };
                Some(Edge {
                    id: format!("{source}-{target}-{}", Uuid::new_v4()),
                    source,
                    target,
                    source_handle: edge.source_handle.clone(),
                    target_handle: edge.target_handle.clone(),
                    selected: false,
                })
            })
            .collect();

        Some(PastePlan { nodes, edges, id_map })
    }
}
