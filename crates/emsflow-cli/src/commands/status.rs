//! Status command: report recent processing statistics and exit.

use clap::Args;
use console::style;

use emsflow_core::EstimateStore;
use emsflow_store::RestStore;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Number of recent log entries to aggregate
    #[arg(short, long, default_value = "100")]
    limit: usize,
}

pub async fn run(args: StatusArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let store = RestStore::new(&config.store)?;
    store
        .check_connection()
        .await
        .map_err(|e| anyhow::anyhow!("backend connection test failed: {e}"))?;

    let stats = store.recent_stats(args.limit).await?;
    println!(
        "{} Statistics over the last {} log entries:",
        style("ℹ").blue(),
        stats.total_entries
    );
    println!("  {} successful", style(stats.successful).green());
    println!("  {} failed", style(stats.failed).red());
    println!("  {} records persisted", stats.total_records);
    println!("  {} errors recorded", stats.total_errors);
    Ok(())
}
