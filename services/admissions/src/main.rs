use admissions_service::api::{start_api_server, AppState};
use admissions_service::{
    AdmissionsService, ApplicationIdGenerator, Config, FileAccess, MirrorSync, PgRecordStore,
    SheetAccess,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting admissions service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let record_store = PgRecordStore::new(&config.database)
        .await
        .context("Failed to initialize record store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        record_store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    // Mirror capabilities are resolved once; missing ones stay disabled
    let mirror = MirrorSync::new(
        SheetAccess::from_config(config.sheets.as_ref()),
        FileAccess::from_config(config.storage.as_ref()).await,
    );

    let service = Arc::new(AdmissionsService::new(
        Arc::new(record_store),
        mirror,
        ApplicationIdGenerator::new(config.api.application_id_prefix.clone()),
    ));

    // Spawn API server task
    let api_state = AppState { service };
    let api_config = config.api.clone();
    let mut api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Admissions service started successfully");

    // Wait for shutdown signal, or the server giving up on its own
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutting down admissions service");
            api_handle.abort();
        }
        _ = &mut api_handle => {
            error!("API server exited unexpectedly");
        }
    }

    info!("Admissions service stopped");

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
