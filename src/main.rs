//! gannet, an HTTP load balancer data plane.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌────────────────────────────────────────────────┐
//!                   │                    GANNET                      │
//!                   │                                                │
//!  Client Request   │  ┌──────────┐   ┌─────────┐   ┌────────────┐  │
//!  ─────────────────┼─▶│ listener │──▶│ proxy   │──▶│   farm     │  │
//!                   │  └──────────┘   │ handler │   │ (registry) │  │
//!                   │                 └────┬────┘   └─────┬──────┘  │
//!                   │                      │              │         │
//!                   │                      ▼              ▼         │
//!                   │               ┌────────────┐  ┌───────────┐   │
//!  Client Response  │               │  backend   │  │ criteria  │   │
//!  ◀────────────────┼───────────────│  session   │  │ (LB algo) │   │
//!                   │               └────────────┘  └───────────┘   │
//!                   │                                                │
//!                   │  control plane:  bus (update queue) + admin    │
//!                   │  cross-cutting:  config, observability,        │
//!                   │                  lifecycle                     │
//!                   └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gannet::bus::{LogQueueService, UpdateQueue};
use gannet::config::{load_config, ProxyConfig};
use gannet::farm::Farm;
use gannet::lifecycle::Shutdown;
use gannet::proxy::ProxyServer;

#[derive(Parser, Debug)]
#[command(name = "gannet", about = "HTTP load balancer data plane", version)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration first so its log level can seed the subscriber.
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("gannet={},tower_http=warn", config.observability.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        virtualhosts = config.virtualhosts.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => gannet::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let farm = Arc::new(Farm::from_config(&config));
    let queue_service = Arc::new(LogQueueService);
    let shutdown = Shutdown::new();

    // Serialized control-plane consumer.
    let (_updates, _bus_task) = UpdateQueue::start(farm.clone(), shutdown.subscribe());

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin_farm = farm.clone();
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = gannet::admin::serve(admin_farm, admin_listener, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = ProxyServer::new(farm, queue_service, config.listener.max_connections);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();

    server_task.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
