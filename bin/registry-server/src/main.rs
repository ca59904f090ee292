use anyhow::Result;
use registry_core::{MemoryRegistry, RegistryConfig};
use registry_remote::{RegistryMetrics, RegistryServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8500";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting registry-server...");

    let config = RegistryConfig::from_env()?;
    let registry = Arc::new(MemoryRegistry::from_config(&config));
    info!(
        "Registry initialized with liveness window {:?}",
        registry.liveness_window()
    );

    let metrics = RegistryMetrics::new()?;
    info!("Metrics collector initialized");

    let listen_addr: SocketAddr = std::env::var("REGISTRY_LISTEN_ADDR")
        .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
        .parse()?;
    let listener = TcpListener::bind(listen_addr).await?;

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        signal_shutdown.cancel();
    });

    RegistryServer::new(registry.clone(), metrics)
        .serve(listener, shutdown)
        .await?;

    info!(
        services = registry.service_count().await,
        instances = registry.instance_count().await,
        "Registry server stopped"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("REGISTRY_LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
