#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod cli;
mod config;
mod discord;
mod media;
mod relay;
mod utils;

use config::Config;
use discord::DiscordClient;
use media::MediaHandler;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    let config = Config::load_from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    utils::logging::init_tracing(&config.logging);
    let config = Arc::new(config);

    info!(
        "discord relay bot starting up with {} mirror mapping(s)",
        config.mirror.mappings.len()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let media = Arc::new(MediaHandler::new());
    let client = DiscordClient::new(config.clone(), media, shutdown_rx);

    tokio::select! {
        result = client.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received before login completed");
            let _ = shutdown_tx.send(true);
            return Ok(());
        }
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = client.wait() => warn!("discord gateway ended unexpectedly"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(err) = client.stop().await {
        error!("failed to stop discord client: {err}");
    }

    info!("discord relay bot shutting down");
    Ok(())
}
