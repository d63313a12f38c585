/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dashboard editor controller.
//!
//! The host turns raw gestures into [`EditorIntent`]s; [`DashboardEditorApp`]
//! applies them to the graph, checkpointing history and using the clipboard
//! as needed. Anything the host must act on (save, export, channel commands,
//! notices) is queued as an [`EditorEvent`] and taken with
//! [`DashboardEditorApp::take_events`].

use euclid::default::{Point2D, Size2D};
use serde::{Deserialize, Serialize};

use crate::model::clipboard::{Clipboard, DEFAULT_PASTE_OFFSET};
use crate::model::graph::{
    ChannelValue, Connection, EdgeChange, Graph, GraphError, Node, NodeChange, NodeData, NodeKind,
    Viewport,
};
use crate::model::history::{HistoryManager, DEFAULT_HISTORY_LIMIT};
use crate::persistence::{self, types::DashboardSnapshot};
use crate::prefs::EditorPreferences;
use crate::registries::atomic::channel::{ChannelDefinition, find_channel, merge_channel_definitions};
use crate::registries::atomic::node_kind::{
    ChannelChoice, ChannelPicker, NodeRegistry, OptionEdit, PropertyEdit, PropertyKey, option_list_edit,
};

/// Distance from the canvas edge below which the context menu flips sides.
pub const CONTEXT_MENU_EDGE_MARGIN: f32 = 200.0;
/// Leftward offset of a left-anchored context menu.
pub const CONTEXT_MENU_LEFT_NUDGE: f32 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditorMode {
    /// Build the dashboard.
    #[default]
    Edit,
    /// Show live values read-only.
    View,
    /// Operate the device through the dashboard.
    Control,
}

impl EditorMode {
    pub fn allows_structure_edits(self) -> bool {
        self == EditorMode::Edit
    }
}

/// Screen-space rectangle of the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasBounds {
    pub origin: Point2D<f32>,
    pub size: Size2D<f32>,
}

impl Default for CanvasBounds {
    fn default() -> Self {
        Self {
            origin: Point2D::origin(),
            size: Size2D::new(1280.0, 800.0),
        }
    }
}

/// Context menu anchors, in canvas-local pixels. Each axis uses exactly one
/// of its two anchors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MenuPlacement {
    pub top: Option<f32>,
    pub left: Option<f32>,
    pub right: Option<f32>,
    pub bottom: Option<f32>,
}

impl MenuPlacement {
    /// Anchor a menu opened at `local` so it stays inside a canvas of `size`.
    pub fn clamp_to(local: Point2D<f32>, size: Size2D<f32>) -> Self {
        let fits_below = local.y < size.height - CONTEXT_MENU_EDGE_MARGIN;
        let fits_right = local.x < size.width - CONTEXT_MENU_EDGE_MARGIN;
        Self {
            top: fits_below.then_some(local.y),
            left: fits_right.then_some(local.x - CONTEXT_MENU_LEFT_NUDGE),
            right: (!fits_right).then_some(size.width - local.x),
            bottom: (!fits_below).then_some(size.height - local.y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextMenuState {
    pub placement: MenuPlacement,
    /// Where a node picked from the menu lands. Captured at open time.
    pub graph_position: Point2D<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSeverity {
    Info,
    Error,
}

/// Template update handed to the host on save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub prototype: DashboardSnapshot,
    pub channels: Vec<ChannelDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    Save(SaveRequest),
    Export(String),
    ChannelCommand { channel: String, value: ChannelValue },
    Notice { severity: NoticeSeverity, message: String },
}

/// Construction input from the host page.
#[derive(Debug, Clone)]
pub struct EditorProps {
    pub initial: DashboardSnapshot,
    pub channels: Vec<ChannelDefinition>,
    pub registry: NodeRegistry,
    pub mode: EditorMode,
    pub history_limit: usize,
    pub paste_offset: f32,
}

impl Default for EditorProps {
    fn default() -> Self {
        Self {
            initial: DashboardSnapshot::default(),
            channels: Vec::new(),
            registry: NodeRegistry::default(),
            mode: EditorMode::Edit,
            history_limit: DEFAULT_HISTORY_LIMIT,
            paste_offset: DEFAULT_PASTE_OFFSET,
        }
    }
}

impl EditorProps {
    pub fn from_preferences(prefs: &EditorPreferences) -> Self {
        Self {
            history_limit: prefs.history_limit,
            paste_offset: prefs.paste_offset,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorIntent {
    Undo,
    Redo,
    Copy,
    Paste,
    SetMode(EditorMode),
    BeginPaletteDrag { kind: NodeKind },
    CancelPaletteDrag,
    DropOnCanvas { screen: Point2D<f32> },
    CreateNode {
        kind: NodeKind,
        position: Point2D<f32>,
        seed: Option<NodeData>,
    },
    OpenContextMenu { screen: Point2D<f32> },
    CreateNodeFromMenu { kind: NodeKind },
    CloseContextMenu,
    NodeClicked { id: String },
    CanvasClicked,
    NodesChanged(Vec<NodeChange>),
    EdgesChanged(Vec<EdgeChange>),
    Connect(Connection),
    ViewportChanged(Viewport),
    CanvasResized(CanvasBounds),
    EditActiveNodeProperties(Vec<PropertyEdit>),
    ChooseChannel(ChannelChoice),
    EditSelectOption(OptionEdit),
    RemoveSelected,
    Save,
    Export,
    Import(String),
    /// User operated a node (toggle, slider release, option pick).
    NodeInteraction { id: String, value: ChannelValue },
}

impl EditorIntent {
    fn mutates_structure(&self) -> bool {
        matches!(
            self,
            EditorIntent::Undo
                | EditorIntent::Redo
                | EditorIntent::Paste
                | EditorIntent::BeginPaletteDrag { .. }
                | EditorIntent::DropOnCanvas { .. }
                | EditorIntent::CreateNode { .. }
                | EditorIntent::OpenContextMenu { .. }
                | EditorIntent::CreateNodeFromMenu { .. }
                | EditorIntent::Connect(_)
                | EditorIntent::EditActiveNodeProperties(_)
                | EditorIntent::ChooseChannel(_)
                | EditorIntent::EditSelectOption(_)
                | EditorIntent::RemoveSelected
                | EditorIntent::Import(_)
        )
    }
}

pub struct DashboardEditorApp {
    graph: Graph,
    viewport: Viewport,
    mode: EditorMode,
    registry: NodeRegistry,
    channels: Vec<ChannelDefinition>,
    history: HistoryManager,
    clipboard: Clipboard,
    /// Last clicked node; target of the property panel.
    active_node: Option<String>,
    context_menu: Option<ContextMenuState>,
    dragging_kind: Option<NodeKind>,
    /// Graph as it was when the in-flight node drag started.
    drag_checkpoint: Option<Graph>,
    canvas: CanvasBounds,
    paste_offset: f32,
    pending_events: Vec<EditorEvent>,
}

impl DashboardEditorApp {
    pub fn new(props: EditorProps) -> Result<Self, GraphError> {
        let (graph, viewport) = Graph::from_snapshot(&props.initial)?;
        Ok(Self {
            graph,
            viewport,
            mode: props.mode,
            registry: props.registry,
            channels: props.channels,
            history: HistoryManager::with_limit(props.history_limit),
            clipboard: Clipboard::default(),
            active_node: None,
            context_menu: None,
            dragging_kind: None,
            drag_checkpoint: None,
            canvas: CanvasBounds::default(),
            paste_offset: props.paste_offset,
            pending_events: Vec::new(),
        })
    }

    /// Empty editor in edit mode.
    pub fn new_for_testing() -> Self {
        Self {
            graph: Graph::new(),
            viewport: Viewport::default(),
            mode: EditorMode::Edit,
            registry: NodeRegistry::default(),
            channels: Vec::new(),
            history: HistoryManager::default(),
            clipboard: Clipboard::default(),
            active_node: None,
            context_menu: None,
            dragging_kind: None,
            drag_checkpoint: None,
            canvas: CanvasBounds::default(),
            paste_offset: DEFAULT_PASTE_OFFSET,
            pending_events: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Live graph for the channel-binding runtime's value passes.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Known channels plus every channel first bound by a node in the live
    /// graph, declared with its node kind's implied type. Declarations follow
    /// the graph through undo and redo.
    pub fn channels(&self) -> Vec<ChannelDefinition> {
        merge_channel_definitions(&self.channels, &self.graph, &self.registry)
    }

    pub fn active_node(&self) -> Option<&Node> {
        self.active_node.as_deref().and_then(|id| self.graph.get_node(id))
    }

    pub fn context_menu(&self) -> Option<&ContextMenuState> {
        self.context_menu.as_ref()
    }

    pub fn dragging_kind(&self) -> Option<NodeKind> {
        self.dragging_kind
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_stack_len(&self) -> usize {
        self.history.undo_len()
    }

    pub fn redo_stack_len(&self) -> usize {
        self.history.redo_len()
    }

    pub fn has_clipboard(&self) -> bool {
        !self.clipboard.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Convert a screen point to graph space under the current pan/zoom.
    pub fn screen_to_graph(&self, screen: Point2D<f32>) -> Point2D<f32> {
        let zoom = if self.viewport.zoom > 0.0 {
            self.viewport.zoom
        } else {
            1.0
        };
        Point2D::new(
            (screen.x - self.canvas.origin.x - self.viewport.x) / zoom,
            (screen.y - self.canvas.origin.y - self.viewport.y) / zoom,
        )
    }

    pub fn property_fields_for_active(&self) -> &'static [PropertyKey] {
        self.active_node()
            .map(|node| self.registry.property_fields(node.kind()))
            .unwrap_or(&[])
    }

    pub fn channel_picker_for_active(&self) -> Option<ChannelPicker> {
        self.active_node()
            .map(|node| self.registry.channel_picker(&node.data, &self.channels()))
    }

    pub fn apply_intents<I>(&mut self, intents: I)
    where
        I: IntoIterator<Item = EditorIntent>,
    {
        for intent in intents {
            self.apply_intent(intent);
        }
    }

    fn apply_intent(&mut self, intent: EditorIntent) {
        if intent.mutates_structure() && !self.mode.allows_structure_edits() {
            log::debug!("editor: {intent:?} ignored in {:?} mode", self.mode);
            return;
        }

        match intent {
            EditorIntent::Undo => {
                self.undo();
            },
            EditorIntent::Redo => {
                self.redo();
            },
            EditorIntent::Copy => self.copy(),
            EditorIntent::Paste => self.paste(),
            EditorIntent::SetMode(mode) => self.set_mode(mode),
            EditorIntent::BeginPaletteDrag { kind } => self.dragging_kind = Some(kind),
            EditorIntent::CancelPaletteDrag => self.dragging_kind = None,
            EditorIntent::DropOnCanvas { screen } => {
                if let Some(kind) = self.dragging_kind.take() {
                    let position = self.screen_to_graph(screen);
                    self.create_node(kind, position, None);
                }
            },
            EditorIntent::CreateNode {
                kind,
                position,
                seed,
            } => {
                self.create_node(kind, position, seed);
            },
            EditorIntent::OpenContextMenu { screen } => self.open_context_menu(screen),
            EditorIntent::CreateNodeFromMenu { kind } => {
                if let Some(menu) = self.context_menu.take() {
                    self.create_node(kind, menu.graph_position, None);
                }
            },
            EditorIntent::CloseContextMenu => self.context_menu = None,
            EditorIntent::NodeClicked { id } => {
                if self.graph.contains_node(&id) {
                    self.active_node = Some(id);
                }
            },
            EditorIntent::CanvasClicked => {
                self.active_node = None;
                self.context_menu = None;
            },
            EditorIntent::NodesChanged(changes) => self.on_nodes_change(changes),
            EditorIntent::EdgesChanged(changes) => self.on_edges_change(changes),
            EditorIntent::Connect(connection) => self.connect(connection),
            EditorIntent::ViewportChanged(viewport) => self.viewport = viewport,
            EditorIntent::CanvasResized(bounds) => self.canvas = bounds,
            EditorIntent::EditActiveNodeProperties(edits) => self.edit_active_node(edits),
            EditorIntent::ChooseChannel(choice) => {
                if let Some(node) = self.active_node() {
                    let edits = self.registry.channel_choice_edits(&node.data, &choice, &self.channels());
                    self.edit_active_node(edits);
                }
            },
            EditorIntent::EditSelectOption(edit) => {
                if let Some(NodeData::Select(select)) = self.active_node().map(|node| &node.data) {
                    let edits = vec![option_list_edit(&select.options, edit)];
                    self.edit_active_node(edits);
                }
            },
            EditorIntent::RemoveSelected => self.remove_selected(),
            EditorIntent::Save => self.save(),
            EditorIntent::Export => self.export(),
            EditorIntent::Import(text) => self.import(&text),
            EditorIntent::NodeInteraction { id, value } => self.node_interaction(&id, value),
        }
    }

    fn notify(&mut self, severity: NoticeSeverity, message: impl Into<String>) {
        self.pending_events.push(EditorEvent::Notice {
            severity,
            message: message.into(),
        });
    }

    fn set_mode(&mut self, mode: EditorMode) {
        if mode != EditorMode::Edit {
            self.context_menu = None;
            self.dragging_kind = None;
        }
        self.mode = mode;
    }

    /// Record the live graph before a structural edit. An unfinished node
    /// drag is abandoned so its start state cannot be recorded later.
    fn checkpoint(&mut self) {
        self.drag_checkpoint = None;
        self.history.record(&self.graph);
    }

    /// Restore the previous checkpoint. Returns `false` at the start of history.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.begin_undo(&self.graph) else {
            return false;
        };
        self.restore(previous);
        true
    }

    /// Re-apply the next checkpoint. Returns `false` at the end of history.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.begin_redo(&self.graph) else {
            return false;
        };
        self.restore(next);
        true
    }

    fn restore(&mut self, graph: Graph) {
        log::debug!("editor: restoring checkpoint ({:?})", self.history.phase());
        self.graph = graph;
        self.drag_checkpoint = None;
        if self
            .active_node
            .as_deref()
            .is_some_and(|id| !self.graph.contains_node(id))
        {
            self.active_node = None;
        }
        self.history.finish_apply();
    }

    /// Create a node of `kind` at `position`. Returns its id.
    ///
    /// `seed` fields win over defaults; an empty seed label is replaced with
    /// "<Kind> <n>" where n counts existing nodes of that kind.
    pub fn create_node(
        &mut self,
        kind: NodeKind,
        position: Point2D<f32>,
        seed: Option<NodeData>,
    ) -> Option<String> {
        if !self.mode.allows_structure_edits() {
            return None;
        }
        let mut data = seed
            .filter(|seed| seed.kind() == kind)
            .unwrap_or_else(|| NodeData::default_for(kind));
        if data.label().is_empty() {
            data.set_label(format!(
                "{} {}",
                kind.display_name(),
                self.graph.count_of_kind(kind) + 1
            ));
        }

        self.checkpoint();
        let id = Node::fresh_id(kind);
        self.graph.apply_node_changes([NodeChange::Add {
            node: Node::new(id.clone(), position, data),
        }]);
        log::debug!("editor: created {kind} node {id}");
        Some(id)
    }

    fn open_context_menu(&mut self, screen: Point2D<f32>) {
        let local = Point2D::new(screen.x - self.canvas.origin.x, screen.y - self.canvas.origin.y);
        self.context_menu = Some(ContextMenuState {
            placement: MenuPlacement::clamp_to(local, self.canvas.size),
            graph_position: self.screen_to_graph(screen),
        });
    }

    fn on_nodes_change(&mut self, changes: Vec<NodeChange>) {
        let changes: Vec<NodeChange> = if self.mode.allows_structure_edits() {
            changes
        } else {
            changes
                .into_iter()
                .filter(|change| matches!(change, NodeChange::Select { .. }))
                .collect()
        };
        if changes.is_empty() {
            return;
        }

        let in_flight = changes
            .iter()
            .any(|change| matches!(change, NodeChange::Position { dragging: true, .. }));
        let ends_drag = changes.iter().any(|change| {
            matches!(
                change,
                NodeChange::Position {
                    position: Some(_),
                    dragging: false,
                    ..
                }
            )
        });
        if in_flight && self.drag_checkpoint.is_none() {
            self.drag_checkpoint = Some(self.graph.clone());
        }
        // A finished drag undoes to where the gesture started.
        if ends_drag && let Some(before) = self.drag_checkpoint.take() {
            self.history.record(&before);
        } else if self.history.record_if_significant(&self.graph, &changes) && !in_flight {
            self.drag_checkpoint = None;
        }
        self.graph.apply_node_changes(changes);
        if self
            .active_node
            .as_deref()
            .is_some_and(|id| !self.graph.contains_node(id))
        {
            self.active_node = None;
        }
    }

    fn on_edges_change(&mut self, changes: Vec<EdgeChange>) {
        let changes: Vec<EdgeChange> = if self.mode.allows_structure_edits() {
            changes
        } else {
            changes
                .into_iter()
                .filter(|change| matches!(change, EdgeChange::Select { .. }))
                .collect()
        };
        if changes.is_empty() {
            return;
        }
        if self.history.record_if_significant(&self.graph, &changes) {
            self.drag_checkpoint = None;
        }
        self.graph.apply_edge_changes(changes);
    }

    fn connect(&mut self, connection: Connection) {
        if let Err(e) = self.graph.check_connection(&connection) {
            log::warn!("editor: connection refused: {e}");
            return;
        }
        self.checkpoint();
        if let Err(e) = self.graph.connect(connection) {
            log::warn!("editor: connection refused: {e}");
        }
    }

    fn copy(&mut self) {
        if self.clipboard.copy(&self.graph, self.active_node.as_deref()) {
            let count = self.clipboard.nodes().len();
            self.notify(NoticeSeverity::Info, format!("Copied {count} node(s)"));
        } else {
            self.notify(NoticeSeverity::Info, "Select a node to copy");
        }
    }

    fn paste(&mut self) {
        let Some(plan) = self.clipboard.paste(&self.graph, self.paste_offset) else {
            self.notify(NoticeSeverity::Info, "Nothing to paste");
            return;
        };
        self.checkpoint();

        let deselect: Vec<NodeChange> = self
            .graph
            .selected_nodes()
            .map(|node| NodeChange::Select {
                id: node.id.clone(),
                selected: false,
            })
            .collect();
        let count = plan.nodes.len();
        self.graph.apply_node_changes(
            deselect
                .into_iter()
                .chain(plan.nodes.into_iter().map(|node| NodeChange::Add { node })),
        );
        self.graph
            .apply_edge_changes(plan.edges.into_iter().map(|edge| EdgeChange::Add { edge }));
        self.notify(NoticeSeverity::Info, format!("Pasted {count} node(s)"));
    }

    /// Apply a property batch to the active node as one replace and one
    /// history entry.
    fn edit_active_node(&mut self, edits: Vec<PropertyEdit>) {
        let Some(node) = self.active_node() else {
            return;
        };
        let next = match self.registry.apply_property_edits(&node.data, &edits) {
            Ok(next) => next,
            Err(e) => {
                log::warn!("editor: property edit refused: {e}");
                return;
            },
        };
        if next == node.data {
            return;
        }
        let replacement = Node {
            data: next,
            ..node.clone()
        };

        if let Some(channel) = replacement.data.channel()
            && find_channel(&self.channels(), channel).is_none()
        {
            log::debug!(
                "editor: channel '{channel}' declared as {:?}",
                self.registry.implied_channel_type(replacement.kind())
            );
        }

        self.checkpoint();
        self.graph.apply_node_changes([NodeChange::Replace {
            id: replacement.id.clone(),
            node: replacement,
        }]);
    }

    fn remove_selected(&mut self) {
        let nodes: Vec<NodeChange> = self
            .graph
            .selected_nodes()
            .map(|node| NodeChange::Remove { id: node.id.clone() })
            .collect();
        let edges: Vec<EdgeChange> = self
            .graph
            .edges()
            .filter(|edge| edge.selected)
            .map(|edge| EdgeChange::Remove { id: edge.id.clone() })
            .collect();
        if nodes.is_empty() && edges.is_empty() {
            return;
        }
        // One checkpoint for the whole deletion.
        self.checkpoint();
        self.graph.apply_edge_changes(edges);
        self.graph.apply_node_changes(nodes);
        if self
            .active_node
            .as_deref()
            .is_some_and(|id| !self.graph.contains_node(id))
        {
            self.active_node = None;
        }
    }

    /// Template update for the current graph: prototype plus the union of
    /// known channels and channels bound by nodes.
    pub fn save_request(&self) -> SaveRequest {
        SaveRequest {
            prototype: persistence::export_snapshot(&self.graph, self.viewport),
            channels: self.channels(),
        }
    }

    fn save(&mut self) {
        let request = self.save_request();
        self.channels = request.channels.clone();
        self.pending_events.push(EditorEvent::Save(request));
    }

    fn export(&mut self) {
        match persistence::export_to_string(&self.graph, self.viewport) {
            Ok(text) => self.pending_events.push(EditorEvent::Export(text)),
            Err(e) => self.notify(NoticeSeverity::Error, format!("Export failed: {e}")),
        }
    }

    fn import(&mut self, text: &str) {
        match persistence::import_from_str(text) {
            Ok((graph, viewport)) => {
                self.graph = graph;
                self.viewport = viewport;
                self.history.clear();
                self.drag_checkpoint = None;
                self.active_node = None;
                self.context_menu = None;
                let count = self.graph.node_count();
                self.notify(NoticeSeverity::Info, format!("Restored {count} node(s)"));
            },
            Err(e) => {
                log::warn!("editor: import failed: {e}");
                self.notify(NoticeSeverity::Error, format!("Import failed: {e}"));
            },
        }
    }

    fn node_interaction(&mut self, id: &str, value: ChannelValue) {
        if self.mode != EditorMode::Control {
            log::debug!("editor: interaction on '{id}' ignored in {:?} mode", self.mode);
            return;
        }
        let Some(channel) = self
            .graph
            .get_node(id)
            .and_then(|node| node.data.channel())
            .map(str::to_string)
        else {
            log::debug!("editor: node '{id}' has no channel");
            return;
        };
        // Only channels the template declares are commandable; bindings made
        // since the last save are not.
        let Some(definition) = find_channel(&self.channels, &channel) else {
            log::debug!("editor: channel '{channel}' is not declared, command dropped");
            return;
        };
        let Some(value) = definition.channel_type.coerce(value) else {
            log::warn!(
                "editor: value does not fit {:?} channel '{channel}', command dropped",
                definition.channel_type
            );
            return;
        };
        self.pending_events
            .push(EditorEvent::ChannelCommand { channel, value });
    }
}
