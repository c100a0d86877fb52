//! Processing log records and aggregated counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::LocationInfo;

/// State of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Attempt started.
    Processing,
    /// Attempt finished successfully.
    Completed,
    /// Attempt failed.
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Error => "error",
        }
    }
}

/// One append-only processing log record. Two independent entries are
/// written per attempt (start and terminal); entries are never updated in
/// place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    /// Record identity.
    pub id: Uuid,

    /// Source file name.
    pub file_name: String,

    /// Full source path.
    pub file_path: String,

    /// Attempt status.
    pub status: ProcessingStatus,

    /// Records persisted by the attempt.
    pub records_processed: usize,

    /// Errors encountered by the attempt.
    pub errors_count: usize,

    /// Error detail for terminal error entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// Elapsed wall time in milliseconds.
    pub processing_time_ms: u64,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,

    /// Shop location tags.
    pub location: LocationInfo,
}

impl ProcessingLogEntry {
    /// Build the start-of-attempt entry.
    pub fn started(file_name: &str, file_path: &str, location: &LocationInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            status: ProcessingStatus::Processing,
            records_processed: 0,
            errors_count: 0,
            error_detail: None,
            processing_time_ms: 0,
            created_at: Utc::now(),
            location: location.clone(),
        }
    }

    /// Build the terminal success entry.
    pub fn completed(
        file_name: &str,
        file_path: &str,
        records: usize,
        elapsed_ms: u64,
        location: &LocationInfo,
    ) -> Self {
        Self {
            status: ProcessingStatus::Completed,
            records_processed: records,
            processing_time_ms: elapsed_ms,
            ..Self::started(file_name, file_path, location)
        }
    }

    /// Build the terminal error entry.
    pub fn failed(
        file_name: &str,
        file_path: &str,
        detail: String,
        elapsed_ms: u64,
        location: &LocationInfo,
    ) -> Self {
        Self {
            status: ProcessingStatus::Error,
            errors_count: 1,
            error_detail: Some(detail),
            processing_time_ms: elapsed_ms,
            ..Self::started(file_name, file_path, location)
        }
    }
}

/// Counters aggregated over recent processing log entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    /// Log entries inspected.
    pub total_entries: usize,

    /// Completed attempts.
    pub successful: usize,

    /// Failed attempts.
    pub failed: usize,

    /// Sum of records persisted.
    pub total_records: usize,

    /// Sum of errors encountered.
    pub total_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_terminal_entries_are_independent() {
        let location = LocationInfo::default();
        let start = ProcessingLogEntry::started("a.ems", "/in/a.ems", &location);
        let done = ProcessingLogEntry::completed("a.ems", "/in/a.ems", 5, 120, &location);

        assert_ne!(start.id, done.id);
        assert_eq!(start.status, ProcessingStatus::Processing);
        assert_eq!(done.status, ProcessingStatus::Completed);
        assert_eq!(done.records_processed, 5);
        assert_eq!(done.processing_time_ms, 120);
    }

    #[test]
    fn test_failed_entry_carries_detail() {
        let entry = ProcessingLogEntry::failed(
            "a.ems",
            "/in/a.ems",
            "backend unreachable".to_string(),
            50,
            &LocationInfo::default(),
        );
        assert_eq!(entry.status, ProcessingStatus::Error);
        assert_eq!(entry.errors_count, 1);
        assert_eq!(entry.error_detail.as_deref(), Some("backend unreachable"));
    }
}
