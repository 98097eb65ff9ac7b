//! diet-ingest - ingestion trigger for the recipe mirror
//!
//! Normalizes a raw delimited upload and replaces the configured store's snapshot.
//! Exits non-zero when the upload is malformed or the store rejects the write;
//! the previous snapshot is kept in both cases.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use diet_common::config::Settings;
use diet_common::open_store;
use diet_ingest::{dry_run, export, run_once, watch, InputSource};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for diet-ingest
#[derive(Parser, Debug)]
#[command(name = "diet-ingest")]
#[command(about = "Normalize a raw recipe upload and replace the stored snapshot")]
#[command(version)]
struct Args {
    /// Raw delimited upload, or `-` for stdin
    input: String,

    /// TOML config file
    #[arg(short, long, env = "DIET_CONFIG")]
    config: Option<PathBuf>,

    /// Keep running and re-ingest whenever the input file changes (poll interval in seconds)
    #[arg(short, long, value_name = "SECONDS")]
    watch: Option<u64>,

    /// Normalize and report without touching the store
    #[arg(long, conflicts_with = "watch")]
    dry_run: bool,

    /// Write the normalized table as canonical CSV to this path instead of the store
    #[arg(long, value_name = "PATH", conflicts_with_all = ["watch", "dry_run"])]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "diet_ingest={level},diet_common={level}",
                    level = settings.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting diet-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let source = InputSource::parse(&args.input);

    if args.dry_run {
        let payload = source.read().await?;
        let report = dry_run(&payload)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(out) = &args.export {
        let payload = source.read().await?;
        let report = export(&payload, out).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let store = open_store(&settings)
        .await
        .context("Failed to open store")?;
    info!("✓ Store opened ({})", store.backend().as_str());

    let outcome = match (args.watch, &source) {
        (Some(_), InputSource::Stdin) => Err(anyhow!("--watch needs a file path, not stdin")),
        (Some(0), _) => Err(anyhow!("--watch interval must be at least 1 second")),
        (Some(secs), InputSource::File(path)) => {
            let runs = watch(store.as_ref(), path, Duration::from_secs(secs), shutdown_signal()).await;
            info!(ingestions = runs, "Watch finished");
            Ok(())
        }
        (None, _) => match run_once(store.as_ref(), &source).await {
            Ok(report) => serde_json::to_string_pretty(&report)
                .map(|json| println!("{}", json))
                .context("Failed to encode report"),
            Err(e) => {
                error!("Ingestion failed: {}", e);
                Err(e.into())
            }
        },
    };

    store.close().await;
    outcome
}

/// Resolves on Ctrl+C or SIGTERM
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
        _ = ctrl_c => info!("Received Ctrl+C, stopping"),
        _ = terminate => info!("Received terminate signal, stopping"),
    }
}
