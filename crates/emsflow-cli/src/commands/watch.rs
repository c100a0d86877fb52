//! Watch command: run the ingestion service until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use tracing::{info, warn};

use emsflow_core::{EstimateStore, FileWatcher};

/// Arguments for the watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Override the export directory from the config file
    #[arg(short, long)]
    export_dir: Option<PathBuf>,

    /// Disable OCR even when the config enables it
    #[arg(long)]
    no_ocr: bool,
}

pub async fn run(args: WatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(dir) = args.export_dir {
        config.watch.export_dir = dir;
    }
    if args.no_ocr {
        config.ocr.enabled = false;
    }

    let (coordinator, store) = super::build_coordinator(&config).await?;
    println!(
        "{} Watching {} (processed -> {})",
        style("ℹ").blue(),
        config.watch.export_dir.display(),
        config.watch.processed_dir.display()
    );

    // Periodic statistics report while the watcher runs.
    let stats_store = store.clone();
    let stats_coordinator = coordinator.clone();
    let interval = Duration::from_secs(config.processing.stats_interval_secs);
    let stats_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match stats_store.recent_stats(100).await {
                Ok(stats) => info!(
                    in_flight = stats_coordinator.in_flight_count(),
                    processed = stats.successful,
                    failed = stats.failed,
                    records = stats.total_records,
                    "recent processing stats"
                ),
                Err(err) => warn!(error = %err, "could not fetch stats"),
            }
        }
    });

    let watcher = FileWatcher::new(coordinator, config.watch.clone());
    tokio::select! {
        result = watcher.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{} Shutting down", style("ℹ").blue());
        }
    }
    stats_task.abort();
    Ok(())
}
