// src/main.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use service_defaults::{
    config,
    server::{Router, ServerBuilder},
    telemetry::LogBridge,
    Bootstrapper,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; events also reach the log exporters once telemetry starts
    let log_bridge = LogBridge::new();
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("service_defaults=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(log_bridge.clone())
        .init();

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    match &config_path {
        Some(path) => info!("Loading configuration from: {}", path.display()),
        None => info!("No configuration file given, using defaults and environment"),
    }
    let settings = config::load_config(config_path.as_deref())
        .context("failed to load configuration")?;
    let bind_address = settings.server.bind_address;

    // Health registry, telemetry pipeline, exporters
    let mut bootstrapper = Bootstrapper::new(settings).with_log_bridge(log_bridge);
    bootstrapper
        .initialize()
        .await
        .context("service bootstrap failed")?;

    let mut router = Router::new();
    bootstrapper.map_endpoints(&mut router)?;
    if bootstrapper.map_metrics_endpoint(&mut router)? {
        info!("Metrics exposed at {}", bootstrapper.settings().metrics.path);
    }
    let handler = bootstrapper.request_handler(router)?;

    info!("Starting {} on {}", bootstrapper.settings().service.name, bind_address);

    let served = ServerBuilder::new(bind_address)
        .with_handler(handler)
        .serve_with_shutdown(shutdown_signal())
        .await;

    if let Err(e) = &served {
        error!("Server error: {:#}", e);
    }

    let outcome = bootstrapper.shutdown().await?;
    info!(?outcome, "Telemetry flushed");

    served
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
