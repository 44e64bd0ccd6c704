//! Scenelink Client
//!
//! Connects to a scene authority and keeps the local scene model in sync.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scenelink::scene::SceneParser;
use scenelink::scenelink_ecs::{ComponentRemoved, MeshReady};
use scenelink::transport::{ConnectionEvent, ConnectionState, WsManager, events};
use scenelink::{AppContext, ClientConfig};

/// Scene synchronization client
#[derive(Parser, Debug)]
#[command(name = "scenelink")]
#[command(about = "Scene synchronization client", long_about = None)]
struct Args {
    /// Path to the configuration file (defaults to ./scenelink.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene authority host
    #[arg(long)]
    host: Option<String>,

    /// Scene authority port
    #[arg(long)]
    port: Option<u16>,

    /// Base URL of the mesh storage
    #[arg(long)]
    storage: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(storage) = &self.storage {
            config.assets.remote_storage = storage.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scenelink=info,scenelink_ecs=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config =
        ClientConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Starting scenelink v{}", env!("CARGO_PKG_VERSION"));

    let ctx = AppContext::new(config).context("Failed to create asset manager")?;
    let ws = WsManager::new(&ctx);
    let parser = SceneParser::new(&ctx);

    info!("Scene authority: {}", ws.endpoint());
    info!("Mesh storage: {}", ctx.assets().remote_storage());

    ws.bind_event(events::SCENE, move |document| {
        if let Err(e) = parser.parse(document) {
            error!("Failed to parse scene: {}", e);
        }
    });
    ws.bind_event(events::COLLADA_LIST, |list| {
        debug!(%list, "Mesh list received, ignoring");
    });

    ws.lifecycle().connect(|event: &ConnectionEvent| {
        debug!(event = event.name(), data = %event.data(), "Lifecycle event");
    });
    ws.on_error(|event| {
        if let ConnectionEvent::Error { message, .. } = event {
            warn!("Transport error: {}", message);
        }
    });

    let disconnected = Arc::new(Notify::new());
    {
        let disconnected = disconnected.clone();
        ws.on_disconnected(move |_| disconnected.notify_waiters());
    }

    ctx.model().mesh_ready().connect(|ready: &MeshReady| {
        if let Some(mesh) = ready.component.mesh() {
            info!(
                entity_id = %ready.entity_id,
                asset = %mesh.asset.name,
                position = ?mesh.pose.position,
                "Mesh placed"
            );
        }
    });
    ctx.model().component_removed().connect(|removed: &ComponentRemoved| {
        debug!(
            entity_id = %removed.entity_id,
            component = %removed.component.type_name(),
            "Component removed"
        );
    });

    ws.connect()?;

    shutdown_signal().await;

    // Wait briefly for the close handshake
    let closed = disconnected.notified();
    tokio::pin!(closed);
    closed.as_mut().enable();
    let was_connected = ws.state() == ConnectionState::Connected;
    ws.close();
    if was_connected && tokio::time::timeout(Duration::from_secs(2), closed).await.is_err() {
        warn!("Close handshake timed out");
    }

    info!(
        entities = ctx.model().len(),
        cached_assets = ctx.assets().cached(),
        "Shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
