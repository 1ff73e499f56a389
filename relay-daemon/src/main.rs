//! Relay Daemon - event source to WebSocket fan-out
//!
//! Reads events on a dedicated producer thread, hands them across the bounded
//! bridge, and broadcasts each one to every connected WebSocket subscriber.

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_bridge::MessageBridge;
use relay_broadcaster::Broadcaster;
use relay_daemon::cli::Args;
use relay_daemon::config::DaemonConfig;
use relay_daemon::diagnostics::spawn_event_logger;
use relay_daemon::producer::spawn_producer;
use relay_daemon::source::LineSource;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = DaemonConfig::load_from(args.config_path())
        .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    info!("Starting relay daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config.config_path.display());

    let shutdown = CancellationToken::new();

    let bridge = MessageBridge::new(config.queue_capacity)
        .context("Failed to create message bridge")?;
    info!("Bridge ready (capacity {})", bridge.capacity());

    // Bind failure is the one unrecoverable error
    let broadcaster = Broadcaster::with_shutdown(config.broadcaster_config(), &shutdown);
    let addr = broadcaster
        .start()
        .await
        .with_context(|| format!("Failed to start broadcaster on {}", config.bind_addr()))?;
    info!("Relay ready on ws://{}", addr);

    let event_logger = spawn_event_logger(broadcaster.events(), shutdown.clone());

    let producer = spawn_producer(LineSource::stdin(), bridge.publisher(), shutdown.clone())
        .context("Failed to start event source")?;

    let subscription = bridge
        .subscribe(shutdown.clone())
        .context("Failed to subscribe to bridge")?;

    tokio::select! {
        _ = broadcaster.run(subscription) => {
            warn!("Broadcast loop ended unexpectedly");
        }
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    shutdown.cancel();

    if let Err(e) = broadcaster.stop().await {
        warn!("Broadcaster stop: {}", e);
    }

    match tokio::task::spawn_blocking(move || producer.join()).await {
        Ok(Ok(Ok(_))) => {}
        Ok(Ok(Err(e))) => warn!("Event source ended with error: {:#}", e),
        Ok(Err(_)) => error!("Producer thread panicked"),
        Err(e) => error!("Failed to join producer thread: {}", e),
    }

    if let Ok(events_seen) = event_logger.await {
        info!("{} subscriber events observed", events_seen);
    }

    let stats = broadcaster.stats();
    info!(
        "Relayed {} messages ({} skipped, {} deliveries, {} failures)",
        stats.messages_broadcast,
        stats.messages_skipped,
        stats.deliveries,
        stats.delivery_failures
    );
    info!("Relay daemon stopped");

    Ok(())
}
