/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph data structures for one dashboard.
//!
//! Core structures:
//! - `Graph`: node/edge container backed by petgraph::StableGraph
//! - `Node`: positioned, typed dashboard control
//! - `Edge`: directed connection between two node handles
//!
//! Boundary: the change-batch entry points (`apply_node_changes`,
//! `apply_edge_changes`, `connect`) are the only public write path. Removing a
//! node always removes its incident edges in the same call.

use euclid::default::Point2D;
use petgraph::Directed;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::persistence::types::{
    DashboardSnapshot, PersistedEdge, PersistedNode, PersistedPosition,
};

pub mod node_data;

pub use node_data::{
    ButtonData, ChannelValue, LabelData, NodeData, NodeKind, SelectData, SelectOption, SliderData,
};

/// Stable node handle (petgraph NodeIndex, survives other deletions)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("node id '{0}' already exists")]
    DuplicateNodeId(String),
    #[error("edge id '{0}' already exists")]
    DuplicateEdgeId(String),
    #[error("edge '{edge}' references missing node '{node}'")]
    MissingEndpoint { edge: String, node: String },
    #[error("an identical connection already exists")]
    DuplicateConnection,
    #[error("node '{0}' not found")]
    NodeNotFound(String),
    #[error("unknown node type '{0}'")]
    UnknownNodeKind(String),
    #[error("node '{id}' has invalid data: {reason}")]
    InvalidNodeData { id: String, reason: String },
}

/// A dashboard control in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique within one graph.
    pub id: String,

    /// Position in graph space (unscaled).
    pub position: Point2D<f32>,

    /// Kind-specific payload; the node's kind is the variant.
    pub data: NodeData,

    /// Canvas selection flag.
    pub selected: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, position: Point2D<f32>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position,
            data,
            selected: false,
        }
    }

    /// Mint a fresh id for `kind`. Never derived from an existing id.
    pub fn fresh_id(kind: NodeKind) -> String {
        format!("{}-{}", kind.as_str(), Uuid::new_v4())
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }
}

/// Directed connection between two node handles.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
    pub selected: bool,
}

impl Edge {
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    fn same_connection(&self, connection: &Connection) -> bool {
        self.source == connection.source
            && self.target == connection.target
            && self.source_handle == connection.source_handle
            && self.target_handle == connection.target_handle
    }
}

/// Edge proposed by a connect gesture, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: String,
    pub target: String,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_handles(mut self, source_handle: Option<&str>, target_handle: Option<&str>) -> Self {
        self.source_handle = source_handle.map(str::to_string);
        self.target_handle = target_handle.map(str::to_string);
        self
    }
}

/// Canvas pan/zoom. Persisted alongside the graph but not part of history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Tagged node mutation, applied in batch order.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    /// Position update from a drag. `dragging == false` with a position marks
    /// the final frame of the gesture.
    Position {
        id: String,
        position: Option<Point2D<f32>>,
        dragging: bool,
    },
    Select {
        id: String,
        selected: bool,
    },
    Remove {
        id: String,
    },
    Add {
        node: Node,
    },
    Replace {
        id: String,
        node: Node,
    },
}

/// Tagged edge mutation, applied in batch order.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    Select { id: String, selected: bool },
    Remove { id: String },
    Add { edge: Edge },
}

/// Main graph container.
#[derive(Debug, Clone)]
pub struct Graph {
    inner: StableGraph<Node, Edge, Directed>,
    node_index: HashMap<String, NodeKey>,
    edge_index: HashMap<String, EdgeKey>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.node_index
            .get(id)
            .and_then(|key| self.inner.node_weight(*key))
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn get_edge(&self, id: &str) -> Option<&Edge> {
        self.edge_index
            .get(id)
            .and_then(|key| self.inner.edge_weight(*key))
    }

    /// Nodes in stable index order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .node_indices()
            .filter_map(|key| self.inner.node_weight(key))
    }

    /// Edges in stable index order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.inner
            .edge_indices()
            .filter_map(|key| self.inner.edge_weight(key))
    }

    pub fn selected_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|node| node.selected)
    }

    pub fn count_of_kind(&self, kind: NodeKind) -> usize {
        self.nodes().filter(|node| node.kind() == kind).count()
    }

    /// Edges with `node_id` as source or target.
    pub fn incident_edges(&self, node_id: &str) -> Vec<&Edge> {
        let Some(key) = self.node_index.get(node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeKey, &Edge)> = self
            .inner
            .edges_directed(*key, petgraph::Direction::Outgoing)
            .chain(self.inner.edges_directed(*key, petgraph::Direction::Incoming))
            .map(|edge| (edge.id(), edge.weight()))
            .collect();
        edges.sort_by_key(|(key, _)| *key);
        edges.dedup_by_key(|(key, _)| *key);
        edges.into_iter().map(|(_, edge)| edge).collect()
    }

    /// Handle ids of every edge end attached to `node_id`.
    pub fn connected_handles(&self, node_id: &str) -> Vec<String> {
        let mut handles = Vec::new();
        for edge in self.incident_edges(node_id) {
            let handle = if edge.source == node_id {
                &edge.source_handle
            } else {
                &edge.target_handle
            };
            let handle = handle.clone().unwrap_or_default();
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }
        handles
    }

    /// Distinct bound channel names in node order.
    pub fn bound_channels(&self) -> Vec<(&str, NodeKind)> {
        let mut seen: Vec<(&str, NodeKind)> = Vec::new();
        for node in self.nodes() {
            if let Some(channel) = node.data.channel()
                && !seen.iter().any(|(name, _)| *name == channel)
            {
                seen.push((channel, node.kind()));
            }
        }
        seen
    }

    /// Apply a batch of node changes in order. Returns how many applied.
    ///
    /// Changes naming unknown nodes are skipped. A removal also drops every
    /// edge referencing the node.
    pub fn apply_node_changes(&mut self, changes: impl IntoIterator<Item = NodeChange>) -> usize {
        let mut applied = 0;
        for change in changes {
            let ok = match change {
                NodeChange::Position {
                    id,
                    position,
                    dragging: _,
                } => match (self.node_mut(&id), position) {
                    (Some(node), Some(position)) => {
                        node.position = position;
                        true
                    },
                    (Some(_), None) => true,
                    (None, _) => false,
                },
                NodeChange::Select { id, selected } => match self.node_mut(&id) {
                    Some(node) => {
                        node.selected = selected;
                        true
                    },
                    None => false,
                },
                NodeChange::Remove { id } => self.remove_node(&id).is_some(),
                NodeChange::Add { node } => match self.add_node(node) {
                    Ok(_) => true,
                    Err(error) => {
                        log::warn!("graph: skipped node add: {error}");
                        false
                    },
                },
                NodeChange::Replace { id, node } => self.replace_node(&id, node),
            };
            if ok {
                applied += 1;
            }
        }
        applied
    }

    /// Apply a batch of edge changes in order. Returns how many applied.
    ///
    /// An added edge whose endpoints are not both present is rejected.
    pub fn apply_edge_changes(&mut self, changes: impl IntoIterator<Item = EdgeChange>) -> usize {
        let mut applied = 0;
        for change in changes {
            let ok = match change {
                EdgeChange::Select { id, selected } => match self.edge_index.get(&id) {
                    Some(key) => match self.inner.edge_weight_mut(*key) {
                        Some(edge) => {
                            edge.selected = selected;
                            true
                        },
                        None => false,
                    },
                    None => false,
                },
                EdgeChange::Remove { id } => self.remove_edge(&id).is_some(),
                EdgeChange::Add { edge } => match self.add_edge(edge) {
                    Ok(_) => true,
                    Err(error) => {
                        log::warn!("graph: skipped edge add: {error}");
                        false
                    },
                },
            };
            if ok {
                applied += 1;
            }
        }
        applied
    }

    /// Append an edge for `connection` under a fresh id.
    ///
    /// Self-loops are allowed. An identical connection (same endpoints and
    /// handles) is refused.
    pub fn connect(&mut self, connection: Connection) -> Result<String, GraphError> {
        self.check_connection(&connection)?;
        let id = format!("xy-edge__{}-{}", connection.source, Uuid::new_v4());
        self.add_edge(Edge {
            id: id.clone(),
            source: connection.source,
            target: connection.target,
            source_handle: connection.source_handle,
            target_handle: connection.target_handle,
            selected: false,
        })?;
        Ok(id)
    }

    /// Validate `connection` without mutating.
    pub fn check_connection(&self, connection: &Connection) -> Result<(), GraphError> {
        for endpoint in [&connection.source, &connection.target] {
            if !self.contains_node(endpoint) {
                return Err(GraphError::MissingEndpoint {
                    edge: "<pending>".to_string(),
                    node: endpoint.clone(),
                });
            }
        }
        if self.edges().any(|edge| edge.same_connection(connection)) {
            return Err(GraphError::DuplicateConnection);
        }
        Ok(())
    }

    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let key = *self.node_index.get(id)?;
        self.inner.node_weight_mut(key)
    }

    fn add_node(&mut self, node: Node) -> Result<NodeKey, GraphError> {
        if self.node_index.contains_key(&node.id) {
            return Err(GraphError::DuplicateNodeId(node.id));
        }
        let id = node.id.clone();
        let key = self.inner.add_node(node);
        self.node_index.insert(id, key);
        Ok(key)
    }

    fn replace_node(&mut self, id: &str, mut node: Node) -> bool {
        let Some(key) = self.node_index.get(id).copied() else {
            return false;
        };
        // A replace never re-keys; incident edges stay valid.
        node.id = id.to_string();
        match self.inner.node_weight_mut(key) {
            Some(slot) => {
                *slot = node;
                true
            },
            None => false,
        }
    }

    fn remove_node(&mut self, id: &str) -> Option<Node> {
        // Edge ids must leave `edge_index` while the node is still indexed;
        // petgraph reuses the freed edge slots.
        let incident: Vec<String> = self
            .incident_edges(id)
            .into_iter()
            .map(|edge| edge.id.clone())
            .collect();
        for edge_id in incident {
            self.remove_edge(&edge_id);
        }
        let key = self.node_index.remove(id)?;
        self.inner.remove_node(key)
    }

    fn add_edge(&mut self, edge: Edge) -> Result<EdgeKey, GraphError> {
        if self.edge_index.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdgeId(edge.id));
        }
        let source = self.endpoint(&edge, &edge.source)?;
        let target = self.endpoint(&edge, &edge.target)?;
        let id = edge.id.clone();
        let key = self.inner.add_edge(source, target, edge);
        self.edge_index.insert(id, key);
        Ok(key)
    }

    fn endpoint(&self, edge: &Edge, node_id: &str) -> Result<NodeKey, GraphError> {
        self.node_index
            .get(node_id)
            .copied()
            .ok_or_else(|| GraphError::MissingEndpoint {
                edge: edge.id.clone(),
                node: node_id.to_string(),
            })
    }

    fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let key = self.edge_index.remove(id)?;
        self.inner.remove_edge(key)
    }

    /// Serialize nodes, edges and `viewport` into the stored artifact shape.
    pub fn to_snapshot(&self, viewport: Viewport) -> DashboardSnapshot {
        let nodes = self
            .nodes()
            .map(|node| PersistedNode {
                id: node.id.clone(),
                kind: node.kind().as_str().to_string(),
                position: PersistedPosition {
                    x: node.position.x,
                    y: node.position.y,
                },
                data: node.data.to_json(),
                selected: node.selected,
            })
            .collect();
        let edges = self
            .edges()
            .map(|edge| PersistedEdge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                source_handle: edge.source_handle.clone(),
                target_handle: edge.target_handle.clone(),
                selected: edge.selected,
            })
            .collect();
        DashboardSnapshot {
            nodes,
            edges,
            viewport,
        }
    }

    /// Rebuild a graph from the stored artifact shape.
    ///
    /// Unknown node kinds, ill-typed node data and duplicate node ids fail the
    /// whole load. Edges with a missing endpoint are dropped.
    pub fn from_snapshot(snapshot: &DashboardSnapshot) -> Result<(Self, Viewport), GraphError> {
        let mut graph = Graph::new();
        for persisted in &snapshot.nodes {
            let kind: NodeKind = persisted.kind.parse()?;
            let data = NodeData::from_json(kind, persisted.data.clone()).map_err(|error| {
                GraphError::InvalidNodeData {
                    id: persisted.id.clone(),
                    reason: error.to_string(),
                }
            })?;
            let mut node = Node::new(
                persisted.id.clone(),
                Point2D::new(persisted.position.x, persisted.position.y),
                data,
            );
            node.selected = persisted.selected;
            graph.add_node(node)?;
        }
        for persisted in &snapshot.edges {
            let edge = Edge {
                id: persisted.id.clone(),
                source: persisted.source.clone(),
                target: persisted.target.clone(),
                source_handle: persisted.source_handle.clone(),
                target_handle: persisted.target_handle.clone(),
                selected: persisted.selected,
            };
            match graph.add_edge(edge) {
                Ok(_) => {},
                Err(error @ GraphError::DuplicateEdgeId(_)) => return Err(error),
                Err(error) => log::warn!("graph: dropped edge on load: {error}"),
            }
        }
        Ok((graph, snapshot.viewport))
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
