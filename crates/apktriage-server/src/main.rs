//! apktriage Server
//!
//! Serves the real-time analysis, direct prediction, OCR and training
//! endpoints over a four-model ensemble.

use anyhow::Result;
use apktriage_server::{create_router, AppState, ConfigOverrides, ServerConfig};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "apktriage-server")]
#[command(about = "Android package triage with a four-model ensemble", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "APKTRIAGE_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address
    #[arg(short = 'l', long, env = "APKTRIAGE_LISTEN")]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "APKTRIAGE_PORT")]
    port: Option<u16>,

    /// Model registry file
    #[arg(short, long, env = "APKTRIAGE_MODELS")]
    models: Option<PathBuf>,

    /// Load models on first use instead of at startup
    #[arg(long)]
    no_preload: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            port: self.port,
            models: self.models.clone(),
            no_preload: self.no_preload,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    info!("Starting apktriage server");

    // Load configuration
    let config = ServerConfig::load(&cli.config, &cli.overrides())?;
    info!("Configuration loaded successfully");
    info!("Model registry: {}", config.models.registry_path.display());
    info!("Scanner: {}", config.scanner.url);
    info!("Upload staging: {}", config.upload_dir.display());

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = config.bind_addr().parse()?;
    let preload = config.models.preload;
    let state = AppState::new(config, metrics_handle)?;

    if preload {
        let loaded = state.registry.preload().await;
        if loaded == 0 {
            warn!("No model could be loaded; analysis requests will answer 503");
        }
    }

    let registry = state.registry.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("apktriage listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    registry.unload_all();
    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("apktriage=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("apktriage=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install the Prometheus recorder and describe the service's metrics
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "apktriage_requests_total",
        "Total number of requests by endpoint"
    );
    metrics::describe_counter!(
        "apktriage_slot_outcomes_total",
        "Per-slot ensemble outcomes by slot and status"
    );
    metrics::describe_histogram!(
        "apktriage_inference_latency_us",
        metrics::Unit::Microseconds,
        "Ensemble fan-out latency in microseconds"
    );
    metrics::describe_counter!("apktriage_errors_total", "Total number of errors by kind");

    info!("Metrics exporter initialized");
    Ok(handle)
}
