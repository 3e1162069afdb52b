//! vMix Mirror - command line front end.
//!
//! Ingests snapshot documents from files or stdin and logs the resulting
//! change sets. The production transport feeds the same engine through the
//! library API.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vmix_mirror::{ConsoleListener, MirrorConfig, StateMirror};

/// Mirror vMix-class device state and report changes between snapshots
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Snapshot files to ingest in order; reads one document from stdin
    /// when empty
    snapshots: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting vMix Mirror...");

    let config = if std::path::Path::new(&args.config).exists() {
        let config = vmix_mirror::config::load(&args.config).await?;
        info!("Configuration loaded from {}", args.config);
        config
    } else {
        info!("No configuration file at {}, using defaults", args.config);
        MirrorConfig::default()
    };

    let mirror = Arc::new(StateMirror::new(&config));
    mirror.subscribe(Arc::new(ConsoleListener::new()));

    if args.snapshots.is_empty() {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read snapshot from stdin")?;
        ingest(&mirror, "<stdin>", &raw).await;
    } else {
        for path in &args.snapshots {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read snapshot file: {path}"))?;
            ingest(&mirror, path, &raw).await;
        }
    }

    info!(
        "✅ Done: {} snapshot(s) committed",
        mirror.processed_count()
    );
    Ok(())
}

async fn ingest(mirror: &StateMirror, source: &str, raw: &str) {
    match mirror.update(raw).await {
        Ok(outcome) => info!("{}: {:?}", source, outcome),
        Err(e) => warn!("⚠️  {}: {}", source, e),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
