//! Filesystem watching and processing coordination.

pub mod coordinator;
pub mod watcher;

pub use coordinator::{Coordinator, ProcessOutcome};
pub use watcher::{
    is_estimate_file, scan_estimate_files, FileWatcher, ESTIMATE_EXTENSION,
};
