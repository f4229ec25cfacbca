use ramal_transfer::application::{ChannelMonitor, ChannelResolver, TransferExecutor};
use ramal_transfer::config::Config;
use ramal_transfer::infrastructure::ami::{AmiManager, ManagerClient};
use ramal_transfer::interface::api::{build_router, init_metrics, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting transfer service");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(
        "Configuration loaded: AMI {} as {} ({:?} auth), HTTP {}:{}",
        config.ami.address(),
        config.ami.username,
        config.ami.auth,
        config.server.host,
        config.server.port
    );
    if config.api.api_key.is_empty() {
        warn!("No API key configured (api.api_key / TRANSFER_API_KEY), protected routes will reject every request");
    }

    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = init_metrics()?;

    // Manager connection, kept alive by the supervisor task
    let manager = Arc::new(AmiManager::new(config.ami.clone()));
    let client: Arc<dyn ManagerClient> = manager.clone();

    // Subscribe before the supervisor logs in so the first session is seen
    let monitor = Arc::new(ChannelMonitor::new());
    let monitor_handle = monitor.clone().spawn(
        client.clone(),
        config.transfer.collection_window(),
        manager.sessions(),
        manager.subscribe(),
    );
    let supervisor_handle = tokio::spawn(manager.clone().run());

    let resolver = ChannelResolver::new(client.clone(), &config.transfer);
    let executor = Arc::new(TransferExecutor::new(client, resolver));

    let state = AppState {
        config: config.clone(),
        executor,
        monitor,
        manager: Some(manager.clone()),
    };
    let app = build_router(state, prometheus_handle);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Transfer API listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    supervisor_handle.abort();
    manager.disconnect().await;
    monitor_handle.abort();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
