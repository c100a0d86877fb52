//! Filesystem watch loop: notify events bridged onto a tokio channel,
//! debounced by a file-size quiet window, dispatched to the coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, WatchError};
use crate::models::WatchConfig;
use crate::ocr::is_supported_format;
use crate::watch::coordinator::Coordinator;

/// Extension of estimate export files, matched case-insensitively.
pub const ESTIMATE_EXTENSION: &str = "ems";

/// True when the path looks like an estimate export file.
pub fn is_estimate_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ESTIMATE_EXTENSION))
}

/// Estimate files already sitting under `root`, recursively. Used for the
/// one-time back-fill scan before live events start flowing.
pub fn scan_estimate_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| is_estimate_file(path))
        .collect();
    files.sort();
    files
}

/// Wait until the file's size holds steady for the quiet window. Returns
/// false if the file disappears while waiting.
pub async fn await_quiet_window(path: &Path, quiet_window: Duration, poll: Duration) -> bool {
    let mut last_size = match tokio::fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(_) => return false,
    };
    let mut stable_since = tokio::time::Instant::now();

    loop {
        tokio::time::sleep(poll).await;
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                if meta.len() != last_size {
                    last_size = meta.len();
                    stable_since = tokio::time::Instant::now();
                } else if stable_since.elapsed() >= quiet_window {
                    return true;
                }
            }
            Err(_) => return false,
        }
    }
}

/// Watches the export directory and feeds estimate and image files to the
/// coordinator until the event stream closes.
pub struct FileWatcher {
    coordinator: Arc<Coordinator>,
    config: WatchConfig,
}

impl FileWatcher {
    pub fn new(coordinator: Arc<Coordinator>, config: WatchConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    /// Subscribe, back-fill pre-existing files, then run the event loop.
    pub async fn run(&self) -> Result<()> {
        let export_dir = self.config.export_dir.clone();
        if !export_dir.is_dir() {
            return Err(WatchError::NotADirectory(export_dir).into());
        }

        let (tx, mut rx) = mpsc::channel::<Event>(256);
        // notify runs its callback on its own thread, hence blocking_send.
        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(err) => warn!(error = %err, "watch backend error"),
            })
            .map_err(|e| WatchError::Subscription(e.to_string()))?;
        watcher
            .watch(&export_dir, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Subscription(e.to_string()))?;
        info!(dir = %export_dir.display(), "watching for estimate exports");

        // Files exported while the service was down.
        for path in scan_estimate_files(&export_dir) {
            debug!(path = %path.display(), "back-filling pre-existing file");
            self.spawn_processing(path);
        }

        while let Some(event) = rx.recv().await {
            match event.kind {
                EventKind::Create(_) | EventKind::Modify(_) => {
                    for path in event.paths {
                        self.dispatch(path);
                    }
                }
                EventKind::Remove(_) => {
                    for path in event.paths {
                        self.coordinator.forget(&path);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn dispatch(&self, path: PathBuf) {
        if self.is_managed_output(&path) {
            return;
        }
        if is_estimate_file(&path) || is_supported_format(&path) {
            self.spawn_processing(path);
        }
    }

    /// Relocation targets may sit under the watched root; their events
    /// must not be re-ingested.
    fn is_managed_output(&self, path: &Path) -> bool {
        path.starts_with(&self.config.processed_dir) || path.starts_with(&self.config.errors_dir)
    }

    fn spawn_processing(&self, path: PathBuf) {
        let coordinator = Arc::clone(&self.coordinator);
        let quiet = Duration::from_millis(self.config.quiet_window_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        tokio::spawn(async move {
            if !await_quiet_window(&path, quiet, poll).await {
                debug!(path = %path.display(), "file vanished before settling");
                return;
            }
            let result = if is_estimate_file(&path) {
                coordinator.process_estimate_file(&path).await
            } else {
                coordinator.process_image_file(&path).await
            };
            if let Err(err) = result {
                warn!(path = %path.display(), error = %err, "processing failed");
            }
        });
    }
}
