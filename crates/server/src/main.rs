use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgbatch_core::{
    load_config, load_config_or_default, validate_config, ConversionSession, ImageEngine,
    NativeEngine,
};
use imgbatch_server::api::{create_router, WsBroadcaster};
use imgbatch_server::metrics::REGISTRY;
use imgbatch_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_CONFIG_PATH: &str = "imgbatch.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("imgbatch {} starting", VERSION);

    // An explicitly named config file must exist; the default one is optional.
    let config = match std::env::var("IMGBATCH_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
        Err(_) => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            info!("Loading configuration from {:?} (optional)", path);
            load_config_or_default(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?
        }
    };

    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    let engine = Arc::new(NativeEngine::new(config.engine.clone()));
    match engine.validate().await {
        Ok(()) => info!("Image engine '{}' ready", engine.name()),
        // jpeg/png still work without the HEIF decoder.
        Err(e) => warn!("Image engine validation failed, HEIC/HEIF input will fail: {}", e),
    }

    let session = Arc::new(ConversionSession::new(engine, &config));
    info!(
        preview_slots = config.preview.max_in_flight,
        output_dir = ?session.output_dir(),
        "Conversion session initialized"
    );

    // Force registration so /metrics is complete from the first scrape.
    Lazy::force(&REGISTRY);

    let ws_broadcaster = WsBroadcaster::default();
    let forwarder = ws_broadcaster.spawn_forwarder(
        session.registry().subscribe(),
        session.preview().subscribe(),
    );

    let state = Arc::new(AppState::new(config.clone(), session, ws_broadcaster));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    forwarder.abort();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
}
