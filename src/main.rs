//! Stroke Risk Service - Main Entry Point
//!
//! Loads the model and scaler artifacts, then serves `/predict` and
//! `/health` until interrupted.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use stroke_risk_service::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    metrics::{MetricsReporter, ServiceMetrics},
    models::loader::Artifacts,
    server::{build_router, AppState},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Config path: first argument, then STROKE_CONFIG, then the default file
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STROKE_CONFIG").ok())
        .map(PathBuf::from)
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        });

    let config = match &config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::from_env()?,
    };

    init_logging(&config.logging)?;

    info!("Starting Stroke Risk Service");
    match &config_path {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No configuration file found, using defaults"),
    }

    // Load artifacts; a missing model leaves /predict answering 503
    let artifacts = Artifacts::load(&config.artifacts);
    if !artifacts.model.is_loaded() {
        warn!("Model not loaded, /predict will answer 503 until restarted with a valid model");
    }
    if !artifacts.manifest.is_loaded() {
        warn!("Scaler manifest not loaded, using the fixed fallback encoding");
    }

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = Arc::new(AppState {
        artifacts,
        metrics: metrics.clone(),
        max_body_bytes: config.server.max_body_bytes,
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen_addr))?;
    info!(addr = %config.server.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("stroke_risk_service={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
