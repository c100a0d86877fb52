//! Persistence gateway for parsed estimates, images and processing logs.
//!
//! [`EstimateStore`] is the seam between the pipeline and the backend;
//! [`MemoryStore`] implements it fully in memory for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assoc::ImageKind;
use crate::error::StoreError;
use crate::models::{Estimate, Part, ProcessingLogEntry, ProcessingStats, ProcessingStatus};
use crate::ocr::OcrText;

/// Outcome of an estimate upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub id: Uuid,
    /// True when an existing row was updated rather than inserted.
    pub updated: bool,
}

/// Lightweight reference to a stored estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateRef {
    pub id: Uuid,
    pub estimate_number: String,
    pub source_file: String,
}

/// Reference to a stored image row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: Uuid,
}

/// Backend operations the pipeline needs. Implementations must make
/// `upsert_estimate` idempotent: matching by estimate number or file
/// fingerprint updates in place, and line items are replaced wholesale
/// rather than appended.
#[async_trait]
pub trait EstimateStore: Send + Sync {
    async fn upsert_estimate(&self, estimate: &Estimate) -> Result<UpsertOutcome, StoreError>;

    /// Look up an existing estimate by number or file fingerprint.
    async fn find_by_number_or_fingerprint(
        &self,
        estimate_number: &str,
        fingerprint: &str,
    ) -> Result<Option<EstimateRef>, StoreError>;

    /// Most recently stored estimate whose source file name contains the
    /// given fragment. Used to attach late-arriving images.
    async fn find_recent_by_file_name(
        &self,
        fragment: &str,
    ) -> Result<Option<EstimateRef>, StoreError>;

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        estimate_id: Uuid,
        kind: ImageKind,
    ) -> Result<ImageRef, StoreError>;

    /// Record extracted text and entities for an uploaded image.
    async fn attach_ocr(&self, image_id: Uuid, ocr: &OcrText) -> Result<(), StoreError>;

    /// Append-only processing audit trail.
    async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError>;

    /// Aggregate statistics over the most recent `limit` log entries.
    async fn recent_stats(&self, limit: usize) -> Result<ProcessingStats, StoreError>;

    /// Cheap connectivity probe, run once at startup.
    async fn check_connection(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct StoredEstimate {
    id: Uuid,
    estimate: Estimate,
}

#[derive(Debug, Clone)]
struct StoredImage {
    file_name: String,
    kind: ImageKind,
    bytes: usize,
    ocr: Option<OcrText>,
}

#[derive(Debug, Default)]
struct Inner {
    estimates: Vec<StoredEstimate>,
    images: HashMap<Uuid, StoredImage>,
    logs: Vec<ProcessingLogEntry>,
    parts: HashMap<String, Part>,
}

/// In-memory store used by tests and the dry-run mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored estimates.
    pub fn estimate_count(&self) -> usize {
        self.inner.lock().unwrap().estimates.len()
    }

    /// Line items of a stored estimate, for assertions.
    pub fn line_item_count(&self, id: Uuid) -> Option<usize> {
        self.inner
            .lock()
            .unwrap()
            .estimates
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.estimate.line_items.len())
    }

    pub fn part_count(&self) -> usize {
        self.inner.lock().unwrap().parts.len()
    }

    pub fn log_count(&self) -> usize {
        self.inner.lock().unwrap().logs.len()
    }

    pub fn image_count(&self) -> usize {
        self.inner.lock().unwrap().images.len()
    }

    /// Stored images as (file name, kind, size, has OCR text), for
    /// assertions.
    pub fn stored_images(&self) -> Vec<(String, ImageKind, usize, bool)> {
        self.inner
            .lock()
            .unwrap()
            .images
            .values()
            .map(|image| {
                (
                    image.file_name.clone(),
                    image.kind,
                    image.bytes,
                    image.ocr.is_some(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl EstimateStore for MemoryStore {
    async fn upsert_estimate(&self, estimate: &Estimate) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        // Parts are shared reference data: first write wins.
        for part in &estimate.parts {
            if !part.part_number.is_empty() {
                inner
                    .parts
                    .entry(part.part_number.clone())
                    .or_insert_with(|| part.clone());
            }
        }

        let existing = inner.estimates.iter_mut().find(|s| {
            (!estimate.estimate_number.is_empty()
                && s.estimate.estimate_number == estimate.estimate_number)
                || s.estimate.fingerprint == estimate.fingerprint
        });

        match existing {
            Some(stored) => {
                // Full replacement, line items included.
                stored.estimate = estimate.clone();
                Ok(UpsertOutcome {
                    id: stored.id,
                    updated: true,
                })
            }
            None => {
                let id = Uuid::new_v4();
                inner.estimates.push(StoredEstimate {
                    id,
                    estimate: estimate.clone(),
                });
                Ok(UpsertOutcome { id, updated: false })
            }
        }
    }

    async fn find_by_number_or_fingerprint(
        &self,
        estimate_number: &str,
        fingerprint: &str,
    ) -> Result<Option<EstimateRef>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .estimates
            .iter()
            .find(|s| {
                (!estimate_number.is_empty() && s.estimate.estimate_number == estimate_number)
                    || s.estimate.fingerprint == fingerprint
            })
            .map(|s| EstimateRef {
                id: s.id,
                estimate_number: s.estimate.estimate_number.clone(),
                source_file: s.estimate.source_file.clone(),
            }))
    }

    async fn find_recent_by_file_name(
        &self,
        fragment: &str,
    ) -> Result<Option<EstimateRef>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .estimates
            .iter()
            .rev()
            .find(|s| s.estimate.source_file.contains(fragment))
            .map(|s| EstimateRef {
                id: s.id,
                estimate_number: s.estimate.estimate_number.clone(),
                source_file: s.estimate.source_file.clone(),
            }))
    }

    async fn upload_image(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        _estimate_id: Uuid,
        kind: ImageKind,
    ) -> Result<ImageRef, StoreError> {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().images.insert(
            id,
            StoredImage {
                file_name: file_name.to_string(),
                kind,
                bytes: bytes.len(),
                ocr: None,
            },
        );
        Ok(ImageRef { id })
    }

    async fn attach_ocr(&self, image_id: Uuid, ocr: &OcrText) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.images.get_mut(&image_id) {
            Some(image) => {
                image.ocr = Some(ocr.clone());
                Ok(())
            }
            None => Err(StoreError::Request(format!(
                "unknown image id {image_id}"
            ))),
        }
    }

    async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError> {
        self.inner.lock().unwrap().logs.push(entry.clone());
        Ok(())
    }

    async fn recent_stats(&self, limit: usize) -> Result<ProcessingStats, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut stats = ProcessingStats::default();
        for entry in inner.logs.iter().rev().take(limit) {
            stats.total_entries += 1;
            stats.total_records += entry.records_processed;
            stats.total_errors += entry.errors_count;
            match entry.status {
                ProcessingStatus::Completed => stats.successful += 1,
                ProcessingStatus::Error => stats.failed += 1,
                ProcessingStatus::Processing => {}
            }
        }
        Ok(stats)
    }

    async fn check_connection(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
