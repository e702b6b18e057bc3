//! Service Gateway (v1)
//!
//! A topology-aware HTTP reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────────┐
//!                   │                     SERVICE GATEWAY                       │
//!                   │                                                           │
//!  Client Request   │  ┌─────────┐   ┌────────────┐   ┌───────────────────┐    │
//!  ─────────────────┼─▶│  http   │──▶│  gateway   │──▶│    resilience     │    │
//!                   │  │ server  │   │ dispatcher │   │   orchestrator    │    │
//!                   │  └─────────┘   └────────────┘   └─────────┬─────────┘    │
//!                   │                                  resolve  │  attempt     │
//!                   │                     ┌────────────┐        │              │
//!                   │                     │  resolver  │◀───────┤              │
//!                   │                     └────────────┘        ▼              │
//!  Client Response  │  ┌─────────┐                      ┌───────────────┐      │
//!  ◀────────────────┼──│  proxy  │◀─────────────────────│ client cache  │◀─────┼── Backend
//!                   │  │  relay  │                      │ (per address) │      │   Replica
//!                   │  └─────────┘                      └───────────────┘      │
//!                   │                                                           │
//!                   │  Cross-cutting: config (+ hot reload), observability,     │
//!                   │  lifecycle (startup/shutdown)                             │
//!                   └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use service_gateway::config::{load_config, watcher::ConfigWatcher};
use service_gateway::observability::{logging, metrics};
use service_gateway::{HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "service-gateway", version, about = "Topology-aware HTTP service gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Reload the configuration when the file changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "service-gateway starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        services = config.services.len(),
        max_body_size = config.listener.max_body_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher must stay alive for updates to flow.
    let (config_updates, _watcher) = if args.watch {
        let (watcher, updates) = ConfigWatcher::new(&args.config);
        (updates, Some(watcher.run()?))
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (updates, None)
    };

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
