//! Banner Rotator: picks a banner for each (slot, social group) request with
//! UCB1 and learns from clicks.
//!
//! Main entry point that wires storage, events and the HTTP server.

use clap::Parser;
use rotator_api::ApiServer;
use rotator_app::Rotator;
use rotator_bandit::LocalStorage;
use rotator_core::config::{AppConfig, StoreBackend};
use rotator_core::event_bus::{noop_sink, EventSink};
use rotator_core::storage::BannerStorage;
use rotator_events::{EventPublisher, NatsQueue};
use rotator_store::{MemoryStore, RedisStore, StoreSelector};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Used when `RUST_LOG` is unset. `rotator` matches every `rotator_*` crate.
const DEFAULT_LOG_FILTER: &str = "banner_rotator=info,rotator=info,tower_http=info";

#[derive(Parser, Debug)]
#[command(name = "banner-rotator")]
#[command(about = "Multi-armed bandit banner rotation service")]
#[command(version)]
struct Cli {
    /// Config file (TOML, YAML or JSON)
    #[arg(long, short, env = "ROTATOR_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "ROTATOR__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ROTATOR__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// State backend: redis, memory or local (overrides config)
    #[arg(long, env = "ROTATOR__ENGINE__BACKEND")]
    backend: Option<StoreBackend>,
}

async fn build_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn BannerStorage>> {
    let storage: Arc<dyn BannerStorage> = match config.engine.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.redis).await?;
            Arc::new(StoreSelector::new(Arc::new(store)))
        }
        StoreBackend::Memory => Arc::new(StoreSelector::new(Arc::new(MemoryStore::new()))),
        StoreBackend::Local => Arc::new(LocalStorage::new()),
    };
    Ok(storage)
}

async fn build_events(config: &AppConfig) -> (Arc<dyn EventSink>, Option<JoinHandle<()>>) {
    if !config.events.enabled {
        info!("Events disabled");
        return (noop_sink(), None);
    }
    match NatsQueue::connect(&config.events).await {
        Ok(queue) => {
            let (publisher, handle) =
                EventPublisher::spawn(Arc::new(queue), config.events.queue_capacity);
            (Arc::new(publisher), Some(handle))
        }
        Err(e) => {
            error!(error = %e, "Failed to connect event queue, events disabled");
            (noop_sink(), None)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Banner Rotator starting up");

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(backend) = cli.backend {
        config.engine.backend = backend;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        backend = ?config.engine.backend,
        events = config.events.enabled,
        "Configuration loaded"
    );

    let storage = build_storage(&config).await?;
    let (events, drain) = build_events(&config).await;
    let rotator = Rotator::new(storage, events);

    let api_server = ApiServer::new(config.clone(), rotator);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics() {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("Banner Rotator is ready to serve traffic");

    // Blocks until Ctrl-C
    api_server.start_http(shutdown_signal()).await?;

    // Dropping the server releases the last publisher handle, so the drain
    // task can flush what is queued and exit.
    drop(api_server);
    if let Some(drain) = drain {
        if let Err(e) = drain.await {
            warn!(error = %e, "Event drain task ended abnormally");
        }
    }

    info!("Banner Rotator stopped");
    Ok(())
}
