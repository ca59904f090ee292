use anyhow::{anyhow, Result};
use registry_client::{
    build_registry, HeartbeatConfig, Registration, Resolver, RetryPolicy, ServiceConnector,
    TcpConnectionFactory,
};
use registry_core::RegistryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const PEER_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let service_name = std::env::var("SERVICE_NAME").unwrap_or_else(|_| "orders".to_string());
    let listen_addr =
        std::env::var("WORKER_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:2000".to_string());
    let peers: Vec<String> = std::env::var("PEER_SERVICES")
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    info!("Starting service-worker for {}...", service_name);

    let config = RegistryConfig::from_env()?;
    let registry = build_registry(&config)?;

    let listener = TcpListener::bind(&listen_addr).await?;
    let advertise_addr = match std::env::var("WORKER_ADVERTISE_ADDR") {
        Ok(addr) => addr,
        Err(_) => listener.local_addr()?.to_string(),
    };

    let shutdown = CancellationToken::new();
    let registration = Registration::register(
        registry.clone(),
        &service_name,
        &advertise_addr,
        HeartbeatConfig::from_config(&config),
        &shutdown,
    )
    .await?;
    let instance_id = registration.instance_id().to_string();

    tokio::spawn(serve(listener, instance_id, shutdown.clone()));

    let connector = Arc::new(ServiceConnector::new(
        Resolver::from_config(registry, &config),
        TcpConnectionFactory::default(),
        RetryPolicy::with_max_retries(config.connect_retries),
    ));
    if !peers.is_empty() {
        tokio::spawn(check_peers(connector, peers, shutdown.clone()));
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    match registration.deregister().await {
        Ok(None) => {}
        Ok(Some(heartbeat_error)) => {
            return Err(anyhow!(
                "heartbeat for {} gave up, exiting: {}",
                service_name,
                heartbeat_error
            ));
        }
        Err(e) => {
            error!("Deregistration failed: {}", e);
            return Err(e.into());
        }
    }
    info!("service-worker stopped");
    Ok(())
}

/// Accept connections and greet each one with this instance's ID
async fn serve(listener: TcpListener, instance_id: String, shutdown: CancellationToken) {
    loop {
        let (mut stream, peer_addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error accepting connection: {}", e);
                    continue;
                }
            },
        };

        let greeting = format!("{}\n", instance_id);
        tokio::spawn(async move {
            if let Err(e) = stream.write_all(greeting.as_bytes()).await {
                debug!("Error writing to {}: {}", peer_addr, e);
            }
        });
    }
}

/// Periodically resolve and connect to each peer service
async fn check_peers(
    connector: Arc<ServiceConnector<TcpConnectionFactory>>,
    peers: Vec<String>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(PEER_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for peer in &peers {
            match connector.connect(peer).await {
                Ok(stream) => match stream.peer_addr() {
                    Ok(addr) => info!(peer = %peer, "Reached {} at {}", peer, addr),
                    Err(_) => info!(peer = %peer, "Reached {}", peer),
                },
                Err(e) => warn!(peer = %peer, "Peer unavailable: {}", e),
            }
        }
    }
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
