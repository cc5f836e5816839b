//! docvault - document store with cache-aware HTTP delivery

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docvault::{config::StorageKind, server, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("docvault={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  docvault");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Data dir: {}", args.data_dir.display());
    match args.storage {
        StorageKind::Fs => info!("Blobs: filesystem at {}", args.blob_dir().display()),
        StorageKind::Memory => info!("Blobs: in-memory"),
    }
    info!("Cache TTLs: doc {}s, list {}s", args.doc_ttl_secs, args.list_ttl_secs);
    info!(
        "Registration: {}",
        if args.admin_token.as_deref().is_some_and(|t| !t.is_empty()) { "admin token" } else { "closed" }
    );
    info!("======================================");

    let state = match server::AppState::new(args).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    };

    server::run(state).await?;

    Ok(())
}
