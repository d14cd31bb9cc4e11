use anyhow::{Context, Result};
use members_service::api::{start_api_server, AppState};
use members_service::{CloudinaryUploader, Config, KeepAlive, MongoMemberStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Local development keeps credentials in .env
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Members Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let member_store = Arc::new(
        MongoMemberStore::new(&config.database)
            .await
            .context("Failed to initialize member store")?,
    );

    let uploader = Arc::new(
        CloudinaryUploader::new(&config.media, config.media_timeout())
            .context("Failed to initialize media uploader")?,
    );

    let keep_alive = KeepAlive::from_config(&config.keep_alive)
        .context("Failed to initialize keep-alive pinger")?;

    // Create API state
    let api_state = AppState {
        members: member_store,
        media: uploader,
    };

    // Spawn keep-alive task
    let keep_alive_handle = keep_alive.map(|pinger| tokio::spawn(pinger.run()));
    if keep_alive_handle.is_none() {
        info!("Keep-alive URL not configured, pinger disabled");
    }

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Members service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down members service");

    // Abort tasks
    api_handle.abort();
    if let Some(handle) = keep_alive_handle {
        handle.abort();
    }

    info!("Members service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
