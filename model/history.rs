/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Undo/redo over whole-graph snapshots.
//!
//! `past` holds checkpoints older than the live graph (most recent last) and
//! `future` holds checkpoints newer than it (most recent first). Applying an
//! undo or redo moves the manager out of `Idle`; while it is out of `Idle`,
//! `record` is refused, so the restore itself never lands in `past`.

use std::collections::VecDeque;

use super::graph::{EdgeChange, Graph, NodeChange};

pub const DEFAULT_HISTORY_LIMIT: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPhase {
    #[default]
    Idle,
    ApplyingUndo,
    ApplyingRedo,
}

/// Whether a change deserves its own undo step.
pub trait ChangeSignificance {
    fn is_significant(&self) -> bool;
}

impl ChangeSignificance for NodeChange {
    fn is_significant(&self) -> bool {
        match self {
            NodeChange::Remove { .. } => true,
            NodeChange::Position {
                position: Some(_),
                dragging: false,
                ..
            } => true,
            // Adds and replaces come from create/paste/property paths, which
            // checkpoint explicitly before mutating.
            NodeChange::Position { .. }
            | NodeChange::Select { .. }
            | NodeChange::Add { .. }
            | NodeChange::Replace { .. } => false,
        }
    }
}

impl ChangeSignificance for EdgeChange {
    fn is_significant(&self) -> bool {
        matches!(self, EdgeChange::Remove { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HistoryManager {
    past: Vec<Graph>,
    future: VecDeque<Graph>,
    phase: HistoryPhase,
    limit: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryManager {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            past: Vec::new(),
            future: VecDeque::new(),
            phase: HistoryPhase::Idle,
            limit: limit.max(1),
        }
    }

    pub fn phase(&self) -> HistoryPhase {
        self.phase
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.past.len()
    }

    pub fn redo_len(&self) -> usize {
        self.future.len()
    }

    /// Checkpoint `live` before a significant edit and drop the redo branch.
    ///
    /// Returns `false` while an undo/redo is being applied.
    pub fn record(&mut self, live: &Graph) -> bool {
        if self.phase != HistoryPhase::Idle {
            log::debug!("history: record refused during {:?}", self.phase);
            return false;
        }
        self.past.push(live.clone());
        self.future.clear();
        if self.past.len() > self.limit {
            let excess = self.past.len() - self.limit;
            self.past.drain(0..excess);
        }
        true
    }

    /// Checkpoint `live` when any change in the batch is significant.
    pub fn record_if_significant<C: ChangeSignificance>(&mut self, live: &Graph, changes: &[C]) -> bool {
        changes.iter().any(ChangeSignificance::is_significant) && self.record(live)
    }

    /// Start an undo: returns the checkpoint to restore and parks `live` at
    /// the front of `future`. Call [`Self::finish_apply`] once restored.
    pub fn begin_undo(&mut self, live: &Graph) -> Option<Graph> {
        if self.phase != HistoryPhase::Idle {
            return None;
        }
        let previous = self.past.pop()?;
        self.future.push_front(live.clone());
        self.phase = HistoryPhase::ApplyingUndo;
        Some(previous)
    }

    /// Start a redo: returns the checkpoint to restore and parks `live` at
    /// the end of `past`. Call [`Self::finish_apply`] once restored.
    pub fn begin_redo(&mut self, live: &Graph) -> Option<Graph> {
        if self.phase != HistoryPhase::Idle {
            return None;
        }
        let next = self.future.pop_front()?;
        self.past.push(live.clone());
        self.phase = HistoryPhase::ApplyingRedo;
        Some(next)
    }

    pub fn finish_apply(&mut self) {
        self.phase = HistoryPhase::Idle;
    }

    /// Undo in place. Returns `false` at the start of history.
    pub fn undo(&mut self, live: &mut Graph) -> bool {
        let Some(previous) = self.begin_undo(live) else {
            return false;
        };
        *live = previous;
        self.finish_apply();
        true
    }

    /// Redo in place. Returns `false` at the end of history.
    pub fn redo(&mut self, live: &mut Graph) -> bool {
        let Some(next) = self.begin_redo(live) else {
            return false;
        };
        *live = next;
        self.finish_apply();
        true
    }

    /// Drop both stacks; the live graph becomes the new baseline.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.phase = HistoryPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::graph::{Connection, Node, NodeData, NodeKind};
    use euclid::default::Point2D;
    use proptest::prelude::*;

    fn add(graph: &mut Graph, id: &str) {
        graph.apply_node_changes([NodeChange::Add {
            node: Node::new(id, Point2D::new(0.0, 0.0), NodeData::with_label(NodeKind::Label, id)),
        }]);
    }

    fn observable(graph: &Graph) -> crate::persistence::types::DashboardSnapshot {
        graph.to_snapshot(Default::default())
    }

    #[test]
    fn test_record_clears_redo() {
        let mut graph = Graph::new();
        let mut history = HistoryManager::default();

        history.record(&graph);
        add(&mut graph, "a");
        assert!(history.undo(&mut graph));
        assert!(history.can_redo());

        history.record(&graph);
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_undo_redo_at_boundary_is_noop() {
        let mut graph = Graph::new();
        add(&mut graph, "a");
        let mut history = HistoryManager::default();

        assert!(!history.undo(&mut graph));
        assert!(!history.redo(&mut graph));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_record_refused_while_applying() {
        let mut graph = Graph::new();
        let mut history = HistoryManager::default();
        history.record(&graph);
        add(&mut graph, "a");

        let restored = history.begin_undo(&graph).unwrap();
        assert_eq!(history.phase(), HistoryPhase::ApplyingUndo);
        assert!(!history.record(&restored));
        graph = restored;
        history.finish_apply();

        assert_eq!(history.undo_len(), 0);
        assert_eq!(history.redo_len(), 1);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_history_trimmed_at_limit() {
        let graph = Graph::new();
        let mut history = HistoryManager::with_limit(4);
        for _ in 0..9 {
            history.record(&graph);
        }
        assert_eq!(history.undo_len(), 4);
    }

    #[test]
    fn test_drag_frames_produce_one_entry() {
        let mut graph = Graph::new();
        add(&mut graph, "a");
        let mut history = HistoryManager::default();

        for step in 0..20 {
            let frame = [NodeChange::Position {
                id: "a".into(),
                position: Some(Point2D::new(step as f32, 0.0)),
                dragging: true,
            }];
            history.record_if_significant(&graph, &frame);
            graph.apply_node_changes(frame);
        }
        let end = [NodeChange::Position {
            id: "a".into(),
            position: Some(Point2D::new(20.0, 0.0)),
            dragging: false,
        }];
        history.record_if_significant(&graph, &end);
        graph.apply_node_changes(end);

        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_selection_is_not_significant() {
        let graph = Graph::new();
        let mut history = HistoryManager::default();
        let changes = [NodeChange::Select {
            id: "a".into(),
            selected: true,
        }];
        assert!(!history.record_if_significant(&graph, &changes));
        let edge_changes = [EdgeChange::Select {
            id: "e".into(),
            selected: true,
        }];
        assert!(!history.record_if_significant(&graph, &edge_changes));
    }

    #[derive(Debug, Clone)]
    enum Edit {
        Add,
        Remove(usize),
        Move(usize, f32),
        Connect(usize, usize),
    }

    fn edit_strategy() -> impl Strategy<Value = Edit> {
        prop_oneof![
            Just(Edit::Add),
            (0_usize..8).prop_map(Edit::Remove),
            (0_usize..8, -500.0_f32..500.0).prop_map(|(i, x)| Edit::Move(i, x)),
            (0_usize..8, 0_usize..8).prop_map(|(a, b)| Edit::Connect(a, b)),
        ]
    }

    fn apply(graph: &mut Graph, history: &mut HistoryManager, edit: &Edit, serial: usize) {
        let ids: Vec<String> = graph.nodes().map(|node| node.id.clone()).collect();
        let pick = |i: usize| ids.get(i % ids.len().max(1)).cloned();
        match edit {
            Edit::Add => {
                history.record(graph);
                add(graph, &format!("n{serial}"));
            },
            Edit::Remove(i) => {
                if let Some(id) = pick(*i) {
                    let changes = [NodeChange::Remove { id }];
                    history.record_if_significant(graph, &changes);
                    graph.apply_node_changes(changes);
                } else {
                    history.record(graph);
                }
            },
            Edit::Move(i, x) => {
                if let Some(id) = pick(*i) {
                    let changes = [NodeChange::Position {
                        id,
                        position: Some(Point2D::new(*x, 1.0)),
                        dragging: false,
                    }];
                    history.record_if_significant(graph, &changes);
                    graph.apply_node_changes(changes);
                } else {
                    history.record(graph);
                }
            },
            Edit::Connect(a, b) => {
                history.record(graph);
                if let (Some(a), Some(b)) = (pick(*a), pick(*b)) {
                    let _ = graph.connect(Connection::new(a, b));
                }
            },
        }
    }

    proptest! {
        #[test]
        fn proptest_undo_redo_inverse(edits in prop::collection::vec(edit_strategy(), 1..24)) {
            let mut graph = Graph::new();
            add(&mut graph, "seed");
            let mut history = HistoryManager::default();
            let initial = observable(&graph);

            for (serial, edit) in edits.iter().enumerate() {
                apply(&mut graph, &mut history, edit, serial);
            }
            let edited = observable(&graph);
            prop_assert_eq!(history.undo_len(), edits.len());

            for _ in 0..edits.len() {
                prop_assert!(history.undo(&mut graph));
            }
            prop_assert_eq!(observable(&graph), initial);

            for _ in 0..edits.len() {
                prop_assert!(history.redo(&mut graph));
            }
            prop_assert_eq!(observable(&graph), edited);
        }
    }
}
