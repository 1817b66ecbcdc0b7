//! Fleet scheduler service.
//!
//! Reads snapshots from a directory, runs one tick per interval and writes
//! committed assignments to an output directory.

use std::sync::Arc;

use anyhow::Result;
use fleet_scheduler::{
    config::Config,
    dispatch::LogDispatcher,
    provider::FileSnapshotProvider,
    sink::JsonFileSink,
    worker::SchedulerWorker,
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Prefer RUST_LOG, fall back to FLEET_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleet scheduler");
    info!(
        snapshot_dir = %config.snapshot_dir.display(),
        output_dir = %config.output_dir.display(),
        tick_interval_ms = config.tick_interval.as_millis() as u64,
        sla_ms = config.sla.as_millis() as u64,
        sla_window = config.sla_window,
        "Configuration loaded"
    );

    let provider = Arc::new(FileSnapshotProvider::new(&config.snapshot_dir));
    let sink = Arc::new(JsonFileSink::new(&config.output_dir));
    let mut worker = SchedulerWorker::new(
        provider,
        sink,
        Arc::new(LogDispatcher),
        config.engine.clone(),
    )
    .configure(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut worker_handle => {
            if let Err(e) = result {
                error!(error = %e, "Tick loop panicked");
            }
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for tick loop to shut down...");
    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Tick loop did not shut down in time");
    }

    info!("Scheduler shutdown complete");
    Ok(())
}
