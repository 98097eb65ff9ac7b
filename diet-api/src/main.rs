//! diet-api - read-only recipe query service
//!
//! Loads settings (TOML file, then environment, then command-line flags), opens
//! the configured store and serves the query API until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use diet_common::config::Settings;
use diet_common::{open_store, QueryEngine};
use diet_api::{build_router, AppState};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for diet-api
#[derive(Parser, Debug)]
#[command(name = "diet-api")]
#[command(about = "Read-only query service for the normalized recipe dataset")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "DIET_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides DIET_API_PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: std::net::IpAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(port) = args.port {
        settings.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "diet_api={level},diet_common={level},tower_http={level}",
                    level = settings.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting diet-api v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        backend = settings.backend.kind().as_str(),
        page_size = settings.query.default_page_size,
        search_all_fields = settings.query.search_all_fields,
        "Settings loaded"
    );

    let store = match open_store(&settings).await {
        Ok(store) => {
            info!("✓ Store opened ({})", store.backend().as_str());
            store
        }
        Err(e) => {
            error!("Failed to open store: {}", e);
            return Err(e.into());
        }
    };

    let engine = QueryEngine::new(store.clone(), settings.query.clone());
    let app = build_router(AppState::new(engine));

    let addr = SocketAddr::new(args.bind, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("diet-api listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    store.close().await;
    info!("Server shutdown complete");
    served
}

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
