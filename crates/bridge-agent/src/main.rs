use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bridge_agent::Bridge;
use domain::MappingStore;
use infrastructure::{
    BridgeConfig, FileMappingStore, HttpBackendClient, InMemoryRuntime, MqttClient,
    RuntimeSnapshot, StateStream,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Override site ID
    #[arg(long)]
    site_id: Option<String>,

    /// Override backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Override runtime snapshot file
    #[arg(long)]
    snapshot: Option<String>,
}

async fn run() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,bridge_agent=debug,application=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!(pid = std::process::id(), "Grid bridge agent starting");

    // 1. Configuration
    let mut config = BridgeConfig::load(&args.config_dir)
        .with_context(|| format!("Failed to load configuration from {}", args.config_dir))?;
    if let Some(site_id) = args.site_id {
        config.site_id = site_id;
    }
    if let Some(url) = args.api_url {
        config.api.base_url = url;
    }
    if let Some(path) = args.snapshot {
        config.runtime.snapshot_path = Some(path);
    }
    info!(
        site_id = %config.site_id,
        selected = config.selected_devices.len(),
        sync_secs = config.sync_interval_secs,
        push_secs = config.push_interval_secs,
        heartbeat_secs = config.heartbeat_interval_secs,
        "Configuration loaded"
    );

    // 2. Runtime: seed from snapshot, keep live through the state stream
    let runtime = match &config.runtime.snapshot_path {
        Some(path) => {
            let snapshot = RuntimeSnapshot::load(path).await?;
            info!(%path, entities = snapshot.entities.len(), "Runtime snapshot loaded");
            Arc::new(InMemoryRuntime::from_snapshot(snapshot))
        }
        None => Arc::new(InMemoryRuntime::new()),
    };

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();
    if let Some(mqtt) = &config.runtime.mqtt {
        info!(host = %mqtt.host, port = mqtt.port, "Connecting to state stream broker");
        let client_id = format!("grid-bridge-{}", config.site_id);
        let (client, event_loop) =
            MqttClient::connect(&mqtt.host, mqtt.port, &client_id, shutdown.clone());
        background.push(event_loop);

        let stream = StateStream::new(client, &mqtt.base_topic, runtime.clone());
        background.push(stream.start(shutdown.clone()).await?);
    } else if runtime.is_empty() {
        warn!("No runtime snapshot and no state stream configured, nothing to discover");
    }

    // 3. Backend and persisted mapping
    let backend = Arc::new(HttpBackendClient::new(&config.api)?);
    let store: Arc<dyn MappingStore> = Arc::new(FileMappingStore::new(config.mappings_path()));

    // 4. Pipeline
    let bridge = Bridge::new(&config, runtime, backend, Some(store));
    bridge.start().await;
    info!("Bridge running");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
    }

    bridge.stop().await;
    shutdown.cancel();
    for task in background {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("Bridge stopped");
    Ok(())
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("\nCRITICAL ERROR: {:?}", e);
        std::process::exit(1);
    }
}
