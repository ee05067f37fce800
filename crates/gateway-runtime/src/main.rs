//! # Ticket Gateway Runtime
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then environment overrides)
//! 2. Load decryption and verification keys, then watch both directories
//! 3. Connect to the broker and declare every destination
//! 4. Serve HTTP until Ctrl-C
//!
//! Any failure before the listener is up is fatal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ticket_gateway::{
    watch, AccessPolicy, AmqpConnector, GatewayConfig, GatewayService, KeyRegistry,
    RequestHandler, RetryPolicy, SystemTimeSource, TaskRouter, TicketCrypto,
};

/// Ticket gateway: decrypts, verifies and dispatches task tickets
#[derive(Parser, Debug)]
#[command(name = "ticket-gateway")]
#[command(about = "Secure ingestion gateway for task tickets")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config/gateway.conf")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = GatewayConfig::from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let addr = config.http_addr()?;

    let keys = Arc::new(KeyRegistry::new());
    keys.load(&config.sources_keys_path, &config.ticket_keys_path)
        .context("loading key directories")?;
    info!(
        decryption_keys = keys.decryption_key_count(),
        verification_keys = keys.verification_key_count(),
        "Keys loaded"
    );

    let decryption_watch = watch(Arc::clone(keys.decryption_keys()), &config.sources_keys_path)
        .context("watching decryption keys")?;
    let verification_watch = watch(Arc::clone(keys.verification_keys()), &config.ticket_keys_path)
        .context("watching verification keys")?;

    let connector = AmqpConnector::new(config.broker_uri());
    info!(broker = %connector.redacted_uri(), "Connecting to broker");
    let router = TaskRouter::connect(
        config.routing_table(),
        Arc::new(connector),
        RetryPolicy::from(&config),
    )
    .await
    .context("connecting to broker")?;

    let handler = RequestHandler::new(
        TicketCrypto::new(Arc::clone(&keys), Arc::new(SystemTimeSource)),
        AccessPolicy::from_allowed_tasks(&config.allowed_tasks),
        Arc::new(router),
        config.sample_storage_uri.clone(),
    );

    GatewayService::new(addr, Arc::new(handler), keys)
        .run(shutdown_signal())
        .await
        .context("serving HTTP")?;

    decryption_watch.stop().await;
    verification_watch.stop().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, shutting down");
        return;
    }
    info!("Ctrl-C received, draining requests");
}
