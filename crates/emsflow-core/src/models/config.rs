//! Configuration structures for the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the emsflow pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsflowConfig {
    /// Filesystem watch configuration.
    pub watch: WatchConfig,

    /// Processing pipeline configuration.
    pub processing: ProcessingConfig,

    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Persistence backend configuration.
    pub store: StoreConfig,

    /// Shop location stamped onto estimates and processing logs.
    pub location: LocationInfo,
}

/// Filesystem watch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory the estimating system exports into.
    pub export_dir: PathBuf,

    /// Directory processed source files are relocated into.
    pub processed_dir: PathBuf,

    /// Directory failed source files are relocated into, alongside their
    /// sidecar diagnostics.
    pub errors_dir: PathBuf,

    /// How long a file's size must stay unchanged before a modification
    /// event re-runs the pipeline, in milliseconds.
    pub quiet_window_ms: u64,

    /// Poll interval while waiting for the quiet window, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("exports"),
            processed_dir: PathBuf::from("processed"),
            errors_dir: PathBuf::from("processed/errors"),
            quiet_window_ms: 2000,
            poll_interval_ms: 100,
        }
    }
}

/// Processing pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Maximum accepted image size in megabytes.
    pub max_file_size_mb: u64,

    /// Files processed concurrently during backfill.
    pub batch_size: usize,

    /// Deadline for individual upload and OCR calls, in seconds.
    pub operation_timeout_secs: u64,

    /// Interval between periodic status reports while watching, in seconds.
    pub stats_interval_secs: u64,

    /// Bound on numeric suffixes tried during image association
    /// (`name_1` .. `name_N`).
    pub max_image_suffix: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 50,
            batch_size: 10,
            operation_timeout_secs: 60,
            stats_interval_secs: 300,
            max_image_suffix: 10,
        }
    }
}

/// OCR configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Master switch; when off the OCR step is a no-op.
    pub enabled: bool,

    /// Upscale factor applied during preprocessing.
    pub upscale: u32,

    /// Binarization threshold (0-255).
    pub threshold: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upscale: 2,
            threshold: 128,
        }
    }
}

/// Persistence backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend base URL.
    pub url: String,

    /// Service key used for authentication.
    pub service_key: String,

    /// Storage bucket for image uploads.
    pub bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_key: String::new(),
            bucket: "estimate-images".to_string(),
        }
    }
}

/// Shop location tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationInfo {
    pub shop_name: String,
    pub shop_id: String,
    pub address: String,
    pub region: String,
    pub computer_name: String,
    pub timezone: String,
    pub contact: String,
}

impl EmsflowConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = EmsflowConfig::default();
        assert_eq!(config.watch.quiet_window_ms, 2000);
        assert_eq!(config.processing.batch_size, 10);
        assert_eq!(config.processing.max_image_suffix, 10);
        assert!(config.ocr.enabled);
        assert_eq!(config.store.bucket, "estimate-images");
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: EmsflowConfig =
            serde_json::from_str(r#"{"ocr": {"enabled": false}}"#).unwrap();
        assert!(!config.ocr.enabled);
        assert_eq!(config.ocr.upscale, 2);
        assert_eq!(config.watch.poll_interval_ms, 100);
    }
}
