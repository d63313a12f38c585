/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Command-line access to dashboards and live device channels.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use bpaf::Bpaf;
use thiserror::Error;

use channelboard::model::graph::{ChannelValue, Graph, GraphError, Viewport};
use channelboard::persistence::{self, PersistenceError};
use channelboard::prefs::{EditorPreferences, PrefsError};
use channelboard::registries::NodeRegistry;
use channelboard::registries::atomic::channel::merge_channel_definitions;
use channelboard::runtime::{ChannelBindingRuntime, ChannelCommandHandle};
use channelboard::services::backend::{
    BackendError, DeviceId, HttpBackend, Template, TemplateBackend, TemplateId,
};
use channelboard::services::transport::{TransportClient, TransportError, WebSocketTransport};

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
/// Dashboard graph editor tooling
struct Cli {
    /// Preferences file (defaults to the platform config dir)
    #[bpaf(long, argument("PATH"))]
    prefs: Option<PathBuf>,
    /// Log filter, e.g. "debug" or "channelboard=trace"
    #[bpaf(long("log"), argument("FILTER"))]
    log_filter: Option<String>,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Debug, Clone, Bpaf)]
enum Source {
    File {
        /// Exported dashboard file
        #[bpaf(long("file"), argument("PATH"))]
        file: PathBuf,
    },
    Template {
        /// Template id on the backend
        #[bpaf(long("template"), argument("ID"))]
        template: TemplateId,
    },
}

#[derive(Debug, Clone, Bpaf)]
enum Command {
    /// Summarize a dashboard's nodes, edges and bound channels
    #[bpaf(command)]
    Inspect {
        #[bpaf(external(source))]
        source: Source,
    },
    /// Show the merged channel list of a template, optionally writing it back
    #[bpaf(command)]
    Channels {
        /// Template id on the backend
        #[bpaf(long("template"), argument("ID"))]
        template: TemplateId,
        /// Save the merged list to the template
        #[bpaf(long)]
        write: bool,
    },
    /// Follow live node values of a template bound to a device
    #[bpaf(command)]
    Watch {
        /// Template id on the backend
        #[bpaf(long("template"), argument("ID"))]
        template: TemplateId,
        /// Device id on the backend
        #[bpaf(long("device"), argument("ID"))]
        device: DeviceId,
    },
    /// Send one channel value to a device, if its template declares the channel
    #[bpaf(command)]
    Set {
        /// Device id on the backend
        #[bpaf(long("device"), argument("ID"))]
        device: DeviceId,
        /// Channel name
        #[bpaf(long("channel"), argument("NAME"))]
        channel: String,
        /// Value as JSON (true, 42, "on"); bare words are sent as text
        #[bpaf(long("value"), argument("VALUE"))]
        value: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Prefs(#[from] PrefsError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("device {0} has no template")]
    NoTemplate(DeviceId),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli().run();

    let prefs = match EditorPreferences::load(cli.prefs.as_deref()) {
        Ok(prefs) => prefs,
        Err(e) => {
            eprintln!("channelboard: {e}");
            return ExitCode::FAILURE;
        },
    };
    channelboard::init_tracing(Some(cli.log_filter.as_deref().unwrap_or(&prefs.log_filter)));
    log::debug!("channelboard {}", channelboard::VERSION);

    match run(cli.command, &prefs).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        },
    }
}

async fn run(command: Command, prefs: &EditorPreferences) -> Result<(), CliError> {
    match command {
        Command::Inspect { source } => {
            let (graph, viewport) = match source {
                Source::File { file } => persistence::load_from_path(&file)?,
                Source::Template { template } => {
                    let template = backend(prefs)?.fetch_template(template).await?;
                    Graph::from_snapshot(&template.desktop_prototype)?
                },
            };
            print_summary(&graph, viewport);
        },
        Command::Channels { template, write } => {
            let backend = backend(prefs)?;
            let template = backend.fetch_template(template).await?;
            let (graph, _) = Graph::from_snapshot(&template.desktop_prototype)?;
            let channels = merge_channel_definitions(&template.channels, &graph, &NodeRegistry::default());
            for channel in &channels {
                println!("{}\t{:?}", channel.name, channel.channel_type);
            }
            if write {
                let updated = Template {
                    channels,
                    ..template
                };
                backend.update_template(&updated).await?;
                log::info!("saved {} channel(s) to template {}", updated.channels.len(), updated.id);
            }
        },
        Command::Watch { template, device } => watch(prefs, template, device).await?,
        Command::Set {
            device,
            channel,
            value,
        } => {
            let value = serde_json::from_str::<ChannelValue>(&value).unwrap_or(ChannelValue::Text(value));
            let backend = backend(prefs)?;
            let device = backend.fetch_device(device).await?;
            let template = device.template_id.ok_or(CliError::NoTemplate(device.id))?;
            let channels = backend.fetch_template(template).await?.channels;

            let transport = Arc::new(WebSocketTransport::connect(&prefs.live_url()?, prefs.token.as_deref()).await?);
            let client = Arc::new(TransportClient::new(transport.clone()));
            let command = ChannelCommandHandle::new(client, device.id, channels.into());
            let sent = command.emit(&channel, value);
            transport.close().await;
            if !sent {
                log::warn!("channel '{channel}' is not declared by template {template}; nothing sent");
            }
        },
    }
    Ok(())
}

fn backend(prefs: &EditorPreferences) -> Result<HttpBackend, CliError> {
    Ok(HttpBackend::new(prefs.api_url()?, prefs.token.clone()))
}

async fn watch(prefs: &EditorPreferences, template: TemplateId, device: DeviceId) -> Result<(), CliError> {
    let backend = backend(prefs)?;
    let template = backend.fetch_template(template).await?;
    let device = backend.fetch_device(device).await?;
    let (mut graph, _) = Graph::from_snapshot(&template.desktop_prototype)?;

    let transport = Arc::new(WebSocketTransport::connect(&prefs.live_url()?, prefs.token.as_deref()).await?);
    let client = Arc::new(TransportClient::new(transport.clone()));
    let mut runtime = ChannelBindingRuntime::mount(client, device, template.channels, &mut graph)?;
    log::info!("watching device {} ({})", runtime.device().id, runtime.device().name);
    print_values(&graph);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = runtime.next_event() => match event {
                Some(event) => {
                    if runtime.handle_event(event, &mut graph) {
                        print_values(&graph);
                    }
                },
                None => {
                    log::warn!("live connection closed");
                    break;
                },
            },
        }
    }

    runtime.unmount()?;
    transport.close().await;
    Ok(())
}

fn print_summary(graph: &Graph, viewport: Viewport) {
    println!(
        "{} node(s), {} edge(s), viewport ({}, {}) x{}",
        graph.node_count(),
        graph.edge_count(),
        viewport.x,
        viewport.y,
        viewport.zoom
    );
    for node in graph.nodes() {
        println!(
            "  {}\t{}\t\"{}\"\t{}",
            node.id,
            node.kind(),
            node.data.label(),
            node.data.channel().unwrap_or("-")
        );
    }
    for edge in graph.edges() {
        println!("  {} -> {}", edge.source, edge.target);
    }
}

fn print_values(graph: &Graph) {
    for node in graph.nodes() {
        if let Some(channel) = node.data.channel() {
            let value = node
                .data
                .value()
                .map(|value| value.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}\t{channel}\t{value}", node.data.label());
        }
    }
}
