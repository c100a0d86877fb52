//! Backfill command: one-time processing of files already on disk.

use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use emsflow_core::watch::scan_estimate_files;
use emsflow_core::ProcessOutcome;

/// Arguments for the backfill command.
#[derive(Args)]
pub struct BackfillArgs {
    /// Directory to scan (defaults to the configured export directory)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Stop at the first failed file
    #[arg(long)]
    fail_fast: bool,
}

pub async fn run(args: BackfillArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::load_config(config_path)?;
    let root = args.dir.unwrap_or_else(|| config.watch.export_dir.clone());

    let files = scan_estimate_files(&root);
    if files.is_empty() {
        println!(
            "{} No estimate files found under {}",
            style("ℹ").blue(),
            root.display()
        );
        return Ok(());
    }
    println!(
        "{} Found {} estimate files to process",
        style("ℹ").blue(),
        files.len()
    );

    let (coordinator, _store) = super::build_coordinator(&config).await?;

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut records = 0usize;

    for chunk in files.chunks(config.processing.batch_size) {
        let results = join_all(chunk.iter().map(|path| {
            let coordinator = coordinator.clone();
            async move { (path.clone(), coordinator.process_estimate_file(path).await) }
        }))
        .await;

        for (path, result) in results {
            progress.inc(1);
            match result {
                Ok(ProcessOutcome::Completed {
                    records: count, ..
                }) => {
                    successful += 1;
                    records += count;
                }
                Ok(outcome) => {
                    debug!(path = %path.display(), ?outcome, "file not processed");
                }
                Err(err) => {
                    failed += 1;
                    progress.println(format!(
                        "{} {}: {err}",
                        style("✗").red(),
                        path.display()
                    ));
                    if args.fail_fast {
                        progress.finish_and_clear();
                        anyhow::bail!("aborting after failure in {}", path.display());
                    }
                }
            }
        }
    }
    progress.finish_and_clear();

    let elapsed = start.elapsed();
    println!(
        "{} Processed {successful} files ({records} records), {failed} failed in {:.1}s",
        if failed == 0 {
            style("✓").green()
        } else {
            style("!").yellow()
        },
        elapsed.as_secs_f64()
    );
    Ok(())
}
