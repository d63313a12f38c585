/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::collections::HashSet;
use std::sync::Arc;

use euclid::default::Point2D;

use channelboard::VERSION;
use channelboard::app::{DashboardEditorApp, EditorEvent, EditorIntent, EditorProps};
use channelboard::model::graph::{
    ChannelValue, Connection, Graph, NodeChange, NodeData, NodeKind, Viewport,
};
use channelboard::persistence;
use channelboard::registries::{ChannelDefinition, ChannelType};
use channelboard::runtime::{ChannelBindingRuntime, ChannelCommandHandle};
use channelboard::services::backend::{
    Device, DeviceChannel, DeviceStatus, Template, TemplateBackend,
};
use channelboard::services::transport::{
    DevicePayload, InboundEvent, OutboundFrame, TransportClient,
};
use channelboard::test_utils::{MemoryBackend, MemoryTransport};

fn select(id: &str) -> NodeChange {
    NodeChange::Select {
        id: id.to_string(),
        selected: true,
    }
}

fn bound(kind: NodeKind, channel: &str) -> NodeData {
    let mut data = NodeData::default_for(kind);
    data.set_channel(channel.to_string());
    data
}

fn device(channels: Vec<DeviceChannel>) -> Device {
    Device {
        id: 7,
        name: "Greenhouse".into(),
        status: DeviceStatus::Online,
        channels,
        template_id: Some(1),
        user_id: None,
    }
}

fn reading(name: &str, value: ChannelValue) -> DeviceChannel {
    DeviceChannel {
        name: name.into(),
        value,
        unit: None,
        channel_type: None,
    }
}

#[test]
fn scenarios_binary_smoke_runs() {
    assert!(!VERSION.is_empty());
}

#[test]
fn drag_create_undo_redo_scenario() {
    let mut app = DashboardEditorApp::new_for_testing();
    app.apply_intents([
        EditorIntent::BeginPaletteDrag {
            kind: NodeKind::Button,
        },
        EditorIntent::DropOnCanvas {
            screen: Point2D::new(100.0, 100.0),
        },
    ]);

    let created = app.graph().nodes().next().cloned().unwrap();
    assert_eq!(created.kind(), NodeKind::Button);
    assert_eq!(created.position, Point2D::new(100.0, 100.0));
    assert!(created.data.label().contains("Button 1"));

    app.apply_intents([EditorIntent::Undo]);
    assert!(app.graph().is_empty());

    app.apply_intents([EditorIntent::Redo]);
    assert_eq!(app.graph().node_count(), 1);
    assert_eq!(app.graph().get_node(&created.id), Some(&created));
}

#[test]
fn deleting_a_node_leaves_no_dangling_edges() {
    let mut app = DashboardEditorApp::new_for_testing();
    let hub = app
        .create_node(NodeKind::Slider, Point2D::new(0.0, 0.0), None)
        .unwrap();
    let mut others = Vec::new();
    for step in 0..3 {
        let id = app
            .create_node(NodeKind::Label, Point2D::new(100.0, step as f32 * 80.0), None)
            .unwrap();
        app.apply_intents([EditorIntent::Connect(Connection::new(hub.clone(), id.clone()))]);
        others.push(id);
    }
    assert_eq!(app.graph().edge_count(), 3);

    app.apply_intents([
        EditorIntent::NodesChanged(vec![select(&hub)]),
        EditorIntent::RemoveSelected,
    ]);

    assert!(app.graph().edges().all(|edge| !edge.touches(&hub)));
    assert_eq!(app.graph().edge_count(), 0);
    assert_eq!(app.graph().node_count(), others.len());
}

#[test]
fn undo_and_redo_walk_the_whole_edit_sequence() {
    let mut app = DashboardEditorApp::new_for_testing();
    let a = app
        .create_node(NodeKind::Button, Point2D::new(0.0, 0.0), None)
        .unwrap();
    let b = app
        .create_node(NodeKind::Label, Point2D::new(200.0, 0.0), None)
        .unwrap();
    app.apply_intents([
        EditorIntent::Connect(Connection::new(a.clone(), b.clone())),
        EditorIntent::NodesChanged(vec![NodeChange::Position {
            id: b.clone(),
            position: Some(Point2D::new(250.0, 40.0)),
            dragging: false,
        }]),
        EditorIntent::NodesChanged(vec![NodeChange::Remove { id: a }]),
    ]);
    let edits = app.undo_stack_len();
    let final_snapshot = app.graph().to_snapshot(Viewport::default());

    for _ in 0..edits {
        assert!(app.undo());
    }
    assert!(app.graph().is_empty());
    assert!(!app.undo());

    for _ in 0..edits {
        assert!(app.redo());
    }
    assert_eq!(app.graph().to_snapshot(Viewport::default()), final_snapshot);
    assert!(!app.redo());
}

#[test]
fn drag_frames_produce_one_history_entry() {
    let mut app = DashboardEditorApp::new_for_testing();
    let id = app
        .create_node(NodeKind::Label, Point2D::new(0.0, 0.0), None)
        .unwrap();
    let before = app.undo_stack_len();

    let frames = (1..=25).map(|step| {
        EditorIntent::NodesChanged(vec![NodeChange::Position {
            id: id.clone(),
            position: Some(Point2D::new(step as f32 * 4.0, 0.0)),
            dragging: true,
        }])
    });
    app.apply_intents(frames);
    app.apply_intents([EditorIntent::NodesChanged(vec![NodeChange::Position {
        id: id.clone(),
        position: Some(Point2D::new(120.0, 0.0)),
        dragging: false,
    }])]);

    assert_eq!(app.undo_stack_len(), before + 1);
    app.undo();
    assert_eq!(app.graph().get_node(&id).unwrap().position, Point2D::new(0.0, 0.0));
}

#[test]
fn pasting_twice_never_collides() {
    let mut app = DashboardEditorApp::new_for_testing();
    let a = app
        .create_node(NodeKind::Button, Point2D::new(0.0, 0.0), None)
        .unwrap();
    let b = app
        .create_node(NodeKind::Label, Point2D::new(150.0, 0.0), None)
        .unwrap();
    app.apply_intents([
        EditorIntent::Connect(Connection::new(a.clone(), b.clone())),
        EditorIntent::NodesChanged(vec![select(&a), select(&b)]),
        EditorIntent::Copy,
        EditorIntent::Paste,
        EditorIntent::Paste,
    ]);

    let ids: HashSet<&str> = app.graph().nodes().map(|node| node.id.as_str()).collect();
    assert_eq!(ids.len(), 6);
    assert_eq!(app.graph().node_count(), 6);
    assert_eq!(app.graph().edge_count(), 3);

    let edge_ids: HashSet<&str> = app.graph().edges().map(|edge| edge.id.as_str()).collect();
    assert_eq!(edge_ids.len(), 3);

    // Each pasted edge joins two nodes of the same paste.
    for edge in app.graph().edges() {
        if edge.source == a {
            assert_eq!(edge.target, b);
            continue;
        }
        assert_ne!(edge.target, b);
        let source = app.graph().get_node(&edge.source).unwrap();
        let target = app.graph().get_node(&edge.target).unwrap();
        assert_eq!(source.selected, target.selected);
        assert_eq!(target.position.x - source.position.x, 150.0);
    }
}

#[test]
fn copying_a_partly_connected_selection_keeps_internal_edges_only() {
    let mut app = DashboardEditorApp::new_for_testing();
    let a = app
        .create_node(NodeKind::Button, Point2D::new(0.0, 0.0), None)
        .unwrap();
    let b = app
        .create_node(NodeKind::Label, Point2D::new(100.0, 0.0), None)
        .unwrap();
    let c = app
        .create_node(NodeKind::Slider, Point2D::new(200.0, 0.0), None)
        .unwrap();
    let outside = app
        .create_node(NodeKind::Select, Point2D::new(300.0, 0.0), None)
        .unwrap();
    app.apply_intents([
        EditorIntent::Connect(Connection::new(a.clone(), b.clone())),
        EditorIntent::Connect(Connection::new(c.clone(), outside)),
        EditorIntent::NodesChanged(vec![select(&a), select(&b), select(&c)]),
        EditorIntent::Copy,
        EditorIntent::Paste,
    ]);

    // Two originals plus one pasted copy of a -> b.
    assert_eq!(app.graph().edge_count(), 3);
    let pasted: Vec<_> = app.graph().selected_nodes().collect();
    assert_eq!(pasted.len(), 3);
    let pasted_c = pasted
        .iter()
        .find(|node| node.kind() == NodeKind::Slider)
        .unwrap();
    assert!(app.graph().incident_edges(&pasted_c.id).is_empty());
}

#[test]
fn export_then_import_is_lossless() {
    let mut app = DashboardEditorApp::new_for_testing();
    let a = app
        .create_node(NodeKind::Slider, Point2D::new(12.5, -40.0), Some(bound(NodeKind::Slider, "fan")))
        .unwrap();
    let b = app
        .create_node(NodeKind::Label, Point2D::new(300.0, 20.0), Some(bound(NodeKind::Label, "temp")))
        .unwrap();
    app.apply_intents([
        EditorIntent::Connect(Connection::new(a, b).with_handles(Some("out"), Some("in"))),
        EditorIntent::ViewportChanged(Viewport {
            x: -30.0,
            y: 15.0,
            zoom: 0.75,
        }),
        EditorIntent::Export,
    ]);

    let events = app.take_events();
    let Some(EditorEvent::Export(text)) = events.last() else {
        panic!("expected an export event");
    };
    let (graph, viewport) = persistence::import_from_str(text).unwrap();

    assert_eq!(viewport, app.viewport());
    assert_eq!(
        graph.to_snapshot(viewport),
        app.graph().to_snapshot(app.viewport())
    );
}

#[tokio::test]
async fn save_merges_template_channels_with_bound_ones() {
    let backend = MemoryBackend::new().with_template(Template {
        id: 1,
        name: "Greenhouse".into(),
        desktop_prototype: Default::default(),
        channels: vec![
            ChannelDefinition::new("a", ChannelType::String),
            ChannelDefinition::new("b", ChannelType::Number),
        ],
    });
    let template = backend.fetch_template(1).await.unwrap();

    let mut app = DashboardEditorApp::new(EditorProps {
        initial: template.desktop_prototype.clone(),
        channels: template.channels.clone(),
        ..EditorProps::default()
    })
    .unwrap();
    app.create_node(NodeKind::Slider, Point2D::new(0.0, 0.0), Some(bound(NodeKind::Slider, "b")));
    app.create_node(NodeKind::Button, Point2D::new(0.0, 90.0), Some(bound(NodeKind::Button, "c")));
    app.apply_intents([EditorIntent::Save]);

    let events = app.take_events();
    let Some(EditorEvent::Save(request)) = events.first() else {
        panic!("expected a save event");
    };
    backend
        .update_template(&Template {
            desktop_prototype: request.prototype.clone(),
            channels: request.channels.clone(),
            ..template
        })
        .await
        .unwrap();

    let saved = backend.template(1).unwrap();
    let names: HashSet<&str> = saved.channels.iter().map(|channel| channel.name.as_str()).collect();
    assert_eq!(names, HashSet::from(["a", "b", "c"]));
    assert_eq!(saved.channels.len(), 3);
    assert_eq!(saved.desktop_prototype.nodes.len(), 2);
}

#[test]
fn commands_for_undeclared_channels_are_not_sent() {
    let transport = Arc::new(MemoryTransport::new());
    let client = Arc::new(TransportClient::new(transport.clone()));
    let mut graph = Graph::new();
    let runtime = ChannelBindingRuntime::mount(
        client,
        device(Vec::new()),
        vec![ChannelDefinition::new("relay", ChannelType::Boolean)],
        &mut graph,
    )
    .unwrap();

    assert!(!runtime.command_handle().emit("heater", ChannelValue::Bool(true)));
    assert!(transport.sent_updates().is_empty());

    assert!(runtime.command_handle().emit("relay", ChannelValue::Bool(true)));
    assert_eq!(transport.sent_updates().len(), 1);
}

#[tokio::test]
async fn device_commands_are_checked_against_its_template() {
    let backend = MemoryBackend::new()
        .with_template(Template {
            id: 1,
            name: "Greenhouse".into(),
            desktop_prototype: Default::default(),
            channels: vec![ChannelDefinition::new("fan", ChannelType::Number)],
        })
        .with_device(device(Vec::new()));
    let device = backend.fetch_device(7).await.unwrap();
    let template = backend.fetch_template(device.template_id.unwrap()).await.unwrap();

    let transport = Arc::new(MemoryTransport::new());
    let client = Arc::new(TransportClient::new(transport.clone()));
    let command = ChannelCommandHandle::new(client, device.id, template.channels.into());

    assert!(!command.emit("heater", ChannelValue::Text("on".into())));
    assert!(transport.sent_frames().is_empty());

    assert!(command.emit("fan", ChannelValue::Text("40".into())));
    let updates = transport.sent_updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].channels[0].value, ChannelValue::Number(40.0));
}

#[test]
fn live_values_flow_into_the_editor_graph() {
    let transport = Arc::new(MemoryTransport::new());
    let client = Arc::new(TransportClient::new(transport.clone()));
    let mut app = DashboardEditorApp::new_for_testing();
    let label = app
        .create_node(NodeKind::Label, Point2D::new(0.0, 0.0), Some(bound(NodeKind::Label, "temp")))
        .unwrap();

    let mut runtime = ChannelBindingRuntime::mount(
        client.clone(),
        device(vec![reading("temp", ChannelValue::Text("21.5".into()))]),
        vec![ChannelDefinition::new("temp", ChannelType::String)],
        app.graph_mut(),
    )
    .unwrap();
    assert_eq!(
        app.graph().get_node(&label).unwrap().data.value(),
        Some(ChannelValue::Text("21.5".into()))
    );
    assert_eq!(client.room_members(7), 1);
    assert!(matches!(transport.sent_frames().as_slice(), [OutboundFrame::Join(7)]));

    transport.inject(InboundEvent::DeviceData(DevicePayload {
        id: 7,
        name: None,
        status: None,
        channels: vec![reading("temp", ChannelValue::Text("22.0".into()))],
    }));
    runtime.poll(app.graph_mut());
    assert_eq!(
        app.graph().get_node(&label).unwrap().data.value(),
        Some(ChannelValue::Text("22.0".into()))
    );

    runtime.unmount().unwrap();
    assert_eq!(client.room_members(7), 0);
}
