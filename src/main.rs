//! nanogate - HTTP gateway for the node IPC protocol
//!
//! Accepts JSON over HTTP POST and forwards it to the node over a pool of
//! persistent length-prefixed IPC sessions.

use nanogate_ipc::SessionPool;
use nanogate_server::metrics::run_metrics_server;
use nanogate_server::{Config, Gateway, GatewayServer, Metrics};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if NANOGATE_CONFIG is set, then env overrides)
    let config_path = std::env::var("NANOGATE_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(ref path) = config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::warn!("Invalid environment configuration ({}), using defaults", e);
            Config::default()
        }
    };

    tracing::info!("Starting nanogate");
    tracing::info!("  Bind address: {}", config.http.bind_addr);
    tracing::info!("  Node: {}", config.node.connection);
    tracing::info!("  Pool size: {}", config.node.pool_size);

    let pool = Arc::new(SessionPool::new(config.node.pool_config()));

    // The node may come up after the gateway; an incomplete pool is refilled
    // on the next request.
    if let Err(e) = pool.fill().await {
        tracing::warn!("Initial connection to node failed: {}", e);
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let mut gateway = Gateway::new(pool.clone()).with_max_body_size(config.http.max_body_size);

    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new()?);
        gateway = gateway.with_metrics(metrics.clone());
        let addr = config.metrics.bind_addr;
        let shutdown_rx = shutdown_tx.subscribe();
        tracing::info!("  Metrics: enabled on {}", addr);
        Some(tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics, shutdown_rx).await {
                tracing::error!("Metrics server error: {}", e);
            }
        }))
    } else {
        tracing::info!("  Metrics: disabled");
        None
    };

    let server = Arc::new(GatewayServer::new(gateway));

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping gateway...");
        shutdown_server.shutdown();
        let _ = shutdown_tx.send(());
    });

    // Run server (blocks until shutdown)
    server.run(config.http.bind_addr).await?;

    if let Some(handle) = metrics_handle {
        let _ = handle.await;
    }

    pool.close_all().await;
    tracing::info!("Gateway stopped");
    Ok(())
}
