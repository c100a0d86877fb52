//! Orchestrates one file's trip through the pipeline: claim, parse,
//! persist, images, relocate, log.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::assoc::{ImageAssociator, ImageKind};
use crate::ems::EmsParser;
use crate::error::{EmsflowError, Result, StoreError};
use crate::models::{EmsflowConfig, Estimate, ProcessingLogEntry};
use crate::ocr::OcrPipeline;
use crate::store::EstimateStore;

/// What happened to a submitted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The file was parsed, persisted and relocated.
    Completed {
        estimate_number: String,
        records: usize,
        images: usize,
    },
    /// Another task already holds the file; nothing was done.
    Skipped,
    /// An image arrived with no matching estimate on record; it was left
    /// in place.
    Unassociated,
}

/// Removes the claimed path from the in-flight set when dropped, so a
/// panicking or failing task never wedges its file.
struct ClaimGuard {
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.path);
        }
    }
}

/// Drives estimate files and stray images through parse, persistence,
/// image association and relocation. Cheap to clone via `Arc` fields.
pub struct Coordinator {
    parser: EmsParser,
    store: Arc<dyn EstimateStore>,
    ocr: Arc<OcrPipeline>,
    associator: Arc<dyn ImageAssociator>,
    config: EmsflowConfig,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn EstimateStore>,
        ocr: Arc<OcrPipeline>,
        associator: Arc<dyn ImageAssociator>,
        config: EmsflowConfig,
    ) -> Self {
        Self {
            parser: EmsParser::new(),
            store,
            ocr,
            associator,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Files currently being processed.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Drop any claim on a path that disappeared underneath us.
    pub fn forget(&self, path: &Path) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(path);
        }
    }

    fn try_claim(&self, path: &Path) -> Option<ClaimGuard> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(path.to_path_buf()) {
            return None;
        }
        Some(ClaimGuard {
            in_flight: Arc::clone(&self.in_flight),
            path: path.to_path_buf(),
        })
    }

    /// Run one estimate file through the full pipeline. Concurrent
    /// submissions of the same path are collapsed to a single run.
    pub async fn process_estimate_file(&self, path: &Path) -> Result<ProcessOutcome> {
        let Some(_guard) = self.try_claim(path) else {
            debug!(path = %path.display(), "already in flight, skipping");
            return Ok(ProcessOutcome::Skipped);
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_path = path.to_string_lossy().to_string();
        let started = Instant::now();

        info!(file = %file_name, "processing estimate file");
        self.store
            .append_log(&ProcessingLogEntry::started(
                &file_name,
                &file_path,
                &self.config.location,
            ))
            .await?;

        match self.ingest(path).await {
            Ok((estimate, images)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let records = estimate.record_count();
                self.relocate(path, &self.config.watch.processed_dir)?;
                self.store
                    .append_log(&ProcessingLogEntry::completed(
                        &file_name,
                        &file_path,
                        records,
                        elapsed_ms,
                        &self.config.location,
                    ))
                    .await?;
                info!(
                    file = %file_name,
                    estimate = %estimate.estimate_number,
                    records,
                    images,
                    elapsed_ms,
                    "estimate processed"
                );
                Ok(ProcessOutcome::Completed {
                    estimate_number: estimate.estimate_number,
                    records,
                    images,
                })
            }
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(file = %file_name, error = %err, "processing failed");
                let detail = error_chain(&err);
                if let Err(move_err) = self.quarantine(path, &detail) {
                    warn!(file = %file_name, error = %move_err, "failed to quarantine file");
                }
                self.store
                    .append_log(&ProcessingLogEntry::failed(
                        &file_name,
                        &file_path,
                        detail,
                        elapsed_ms,
                        &self.config.location,
                    ))
                    .await?;
                Err(err)
            }
        }
    }

    /// Parse and persist the estimate, then upload its associated images.
    async fn ingest(&self, path: &Path) -> Result<(Estimate, usize)> {
        let estimate = self.parser.parse_file(path)?;
        let timeout = Duration::from_secs(self.config.processing.operation_timeout_secs);

        let outcome = tokio::time::timeout(timeout, self.store.upsert_estimate(&estimate))
            .await
            .map_err(|_| StoreError::Timeout(self.config.processing.operation_timeout_secs))??;
        debug!(
            estimate = %estimate.estimate_number,
            updated = outcome.updated,
            "estimate persisted"
        );

        let candidates = self.associator.candidates_for(path);
        let uploads = join_all(
            candidates
                .iter()
                .map(|image| self.push_image(image, outcome.id, timeout)),
        )
        .await;

        // All uploads are attempted; the first failure then aborts the file.
        let mut images = 0;
        let mut first_error = None;
        for result in uploads {
            match result {
                Ok(()) => images += 1,
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(_) => {}
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        Ok((estimate, images))
    }

    /// Upload one image and, when OCR is enabled, attach extracted text.
    /// OCR failures are absorbed; upload failures are not.
    async fn push_image(
        &self,
        path: &Path,
        estimate_id: uuid::Uuid,
        timeout: Duration,
    ) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let metadata = tokio::fs::metadata(path).await?;
        let max_bytes = self.config.processing.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            warn!(
                file = %file_name,
                size = metadata.len(),
                "image exceeds size limit, skipping"
            );
            return Ok(());
        }

        let bytes = tokio::fs::read(path).await?;
        let kind = ImageKind::classify(path);
        let image = tokio::time::timeout(
            timeout,
            self.store.upload_image(bytes, &file_name, estimate_id, kind),
        )
        .await
        .map_err(|_| StoreError::Timeout(timeout.as_secs()))??;
        debug!(file = %file_name, kind = kind.as_str(), "image uploaded");

        let ocr = match tokio::time::timeout(timeout, self.ocr.extract_text(path)).await {
            Ok(ocr) => ocr,
            Err(_) => {
                warn!(file = %file_name, "text recognition timed out, continuing without text");
                None
            }
        };
        if let Some(ocr) = ocr {
            if let Err(err) = self.store.attach_ocr(image.id, &ocr).await {
                warn!(file = %file_name, error = %err, "failed to attach OCR text");
            }
        }

        self.relocate(path, &self.config.watch.processed_dir)?;
        Ok(())
    }

    /// Handle an image that arrived on its own, after its estimate.
    pub async fn process_image_file(&self, path: &Path) -> Result<ProcessOutcome> {
        let Some(_guard) = self.try_claim(path) else {
            return Ok(ProcessOutcome::Skipped);
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        // Trim a trailing `_N` suffix so `EST-100_2.jpg` finds `EST-100.ems`.
        let base = match stem.rsplit_once('_') {
            Some((head, tail)) if tail.chars().all(|c| c.is_ascii_digit()) => head,
            _ => stem.as_str(),
        };

        let Some(estimate) = self.store.find_recent_by_file_name(base).await? else {
            warn!(path = %path.display(), "no estimate on record for image, leaving in place");
            return Ok(ProcessOutcome::Unassociated);
        };

        let timeout = Duration::from_secs(self.config.processing.operation_timeout_secs);
        self.push_image(path, estimate.id, timeout).await?;
        Ok(ProcessOutcome::Completed {
            estimate_number: estimate.estimate_number,
            records: 0,
            images: 1,
        })
    }

    /// Move a processed file out of the export directory; a sortable
    /// timestamp prefix keeps repeats of the same name distinct.
    fn relocate(&self, path: &Path, dest_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dest_dir)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let mut target = dest_dir.join(format!("{stamp}_{file_name}"));
        let mut attempt = 1;
        while target.exists() {
            target = dest_dir.join(format!("{stamp}_{attempt}_{file_name}"));
            attempt += 1;
        }
        move_file(path, &target)?;
        debug!(from = %path.display(), to = %target.display(), "relocated");
        Ok(target)
    }

    /// Move a failed file into the errors directory and drop a sidecar
    /// `.error.log` next to it with the failure detail.
    fn quarantine(&self, path: &Path, detail: &str) -> Result<()> {
        let errors_dir = self.config.watch.errors_dir.clone();
        let target = self.relocate(path, &errors_dir)?;
        let sidecar = target.with_extension("error.log");
        let body = format!("{}\n{detail}\n", Utc::now().to_rfc3339());
        std::fs::write(&sidecar, body)?;
        Ok(())
    }
}

/// Render an error and its source chain, one cause per line.
fn error_chain(err: &EmsflowError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Rename with a copy-and-remove fallback for cross-device moves.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::FileNameAssociator;
    use crate::error::OcrError;
    use crate::models::OcrConfig;
    use crate::ocr::{OcrText, RecognizedText, TextRecognizer};
    use crate::store::{EstimateRef, ImageRef, MemoryStore, UpsertOutcome};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    // The trait impl below needs the two-parameter form, not the crate alias.
    use std::result::Result;

    const SAMPLE: &str = "\
H|EST-2024-001|CLM-555|03/15/2024|Draft|State Farm DRP
V|1HGBH41JXMN109186|2022|CHEV|Silverado|Red|45000|TX-ABC123
L|1|REP|Front bumper repair|PN-100|1|2.5|60.00|150.00|30.00|180.00
";

    /// Store that rejects every estimate upsert.
    struct RejectingStore {
        logs: Mutex<Vec<ProcessingLogEntry>>,
    }

    #[async_trait]
    impl EstimateStore for RejectingStore {
        async fn upsert_estimate(&self, _: &Estimate) -> Result<UpsertOutcome, StoreError> {
            Err(StoreError::Unreachable("backend down".to_string()))
        }
        async fn find_by_number_or_fingerprint(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<EstimateRef>, StoreError> {
            Ok(None)
        }
        async fn find_recent_by_file_name(
            &self,
            _: &str,
        ) -> Result<Option<EstimateRef>, StoreError> {
            Ok(None)
        }
        async fn upload_image(
            &self,
            _: Vec<u8>,
            _: &str,
            _: uuid::Uuid,
            _: ImageKind,
        ) -> Result<ImageRef, StoreError> {
            Err(StoreError::Unreachable("backend down".to_string()))
        }
        async fn attach_ocr(&self, _: uuid::Uuid, _: &OcrText) -> Result<(), StoreError> {
            Ok(())
        }
        async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError> {
            self.logs.lock().unwrap().push(entry.clone());
            Ok(())
        }
        async fn recent_stats(
            &self,
            _: usize,
        ) -> Result<crate::models::ProcessingStats, StoreError> {
            Ok(Default::default())
        }
        async fn check_connection(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Recognizer that never returns within any reasonable deadline.
    struct StallingRecognizer;

    #[async_trait]
    impl TextRecognizer for StallingRecognizer {
        async fn recognize(
            &self,
            _: &Path,
        ) -> Result<Option<RecognizedText>, OcrError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    fn coordinator_for(dir: &Path, store: Arc<dyn EstimateStore>) -> Coordinator {
        let mut config = EmsflowConfig::default();
        config.watch.export_dir = dir.to_path_buf();
        config.watch.processed_dir = dir.join("processed");
        config.watch.errors_dir = dir.join("processed/errors");
        Coordinator::new(
            store,
            Arc::new(OcrPipeline::disabled()),
            Arc::new(FileNameAssociator::default()),
            config,
        )
    }

    #[tokio::test]
    async fn test_successful_file_is_persisted_and_relocated() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("EST-2024-001.ems");
        std::fs::write(&source, SAMPLE).unwrap();
        std::fs::write(dir.path().join("EST-2024-001_1.jpg"), b"img").unwrap();

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(dir.path(), store.clone());

        let outcome = coordinator.process_estimate_file(&source).await.unwrap();
        match outcome {
            ProcessOutcome::Completed {
                estimate_number,
                images,
                ..
            } => {
                assert_eq!(estimate_number, "EST-2024-001");
                assert_eq!(images, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(!source.exists());
        let moved: Vec<String> = std::fs::read_dir(dir.path().join("processed"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(moved.len(), 2);
        assert!(moved.iter().any(|n| n.ends_with("_EST-2024-001.ems")));
        assert!(moved.iter().any(|n| n.ends_with("_EST-2024-001_1.jpg")));

        assert_eq!(store.estimate_count(), 1);
        assert_eq!(store.image_count(), 1);
        // One start entry and one terminal entry.
        assert_eq!(store.log_count(), 2);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_quarantines_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("EST-9.ems");
        std::fs::write(&source, SAMPLE).unwrap();

        let store = Arc::new(RejectingStore {
            logs: Mutex::new(Vec::new()),
        });
        let coordinator = coordinator_for(dir.path(), store.clone());

        let result = coordinator.process_estimate_file(&source).await;
        assert!(result.is_err());
        assert!(!source.exists());

        let errors_dir = dir.path().join("processed/errors");
        let names: Vec<String> = std::fs::read_dir(&errors_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("_EST-9.ems")));
        let sidecar = names
            .iter()
            .find(|n| n.ends_with(".error.log"))
            .expect("sidecar written");
        let body = std::fs::read_to_string(errors_dir.join(sidecar)).unwrap();
        assert!(body.contains("backend unreachable"));

        let logs = store.logs.lock().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(
            logs[1].status,
            crate::models::ProcessingStatus::Error
        );
        drop(logs);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_claimed_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("EST-1.ems");
        std::fs::write(&source, SAMPLE).unwrap();

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(dir.path(), store.clone());
        let _guard = coordinator.try_claim(&source).unwrap();

        let outcome = coordinator.process_estimate_file(&source).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Skipped);
        assert_eq!(store.log_count(), 0);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_forget_releases_claim() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("EST-1.ems");
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(dir.path(), store);

        let guard = coordinator.try_claim(&source).unwrap();
        assert_eq!(coordinator.in_flight_count(), 1);
        std::mem::forget(guard);
        coordinator.forget(&source);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_late_image_attaches_to_recent_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("EST-2024-001.ems");
        std::fs::write(&source, SAMPLE).unwrap();

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(dir.path(), store.clone());
        coordinator.process_estimate_file(&source).await.unwrap();

        let image = dir.path().join("EST-2024-001_2.jpg");
        std::fs::write(&image, b"img").unwrap();
        let outcome = coordinator.process_image_file(&image).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Completed { images: 1, .. }));
        assert_eq!(store.image_count(), 1);
        assert!(!image.exists());
    }

    #[tokio::test]
    async fn test_orphan_image_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("EST-404_1.jpg");
        std::fs::write(&image, b"img").unwrap();

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator_for(dir.path(), store.clone());
        let outcome = coordinator.process_image_file(&image).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Unassociated);
        assert!(image.exists());
        assert_eq!(store.image_count(), 0);
    }

    #[tokio::test]
    async fn test_stalled_recognition_does_not_wedge_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("EST-2024-001.ems");
        std::fs::write(&source, SAMPLE).unwrap();
        let image = dir.path().join("EST-2024-001_1.pdf");
        std::fs::write(&image, b"doc").unwrap();

        let store = Arc::new(MemoryStore::new());
        let mut config = EmsflowConfig::default();
        config.watch.export_dir = dir.path().to_path_buf();
        config.watch.processed_dir = dir.path().join("processed");
        config.watch.errors_dir = dir.path().join("processed/errors");
        config.processing.operation_timeout_secs = 1;
        let coordinator = Coordinator::new(
            store.clone() as Arc<dyn EstimateStore>,
            Arc::new(OcrPipeline::new(
                Arc::new(StallingRecognizer),
                &OcrConfig::default(),
            )),
            Arc::new(FileNameAssociator::default()),
            config,
        );

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            coordinator.process_estimate_file(&source),
        )
        .await
        .expect("deadline must cut recognition short")
        .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Completed { images: 1, .. }));

        // The upload went through; text extraction was abandoned.
        let images = store.stored_images();
        assert_eq!(images.len(), 1);
        assert!(!images[0].3);
        assert!(!image.exists());
        assert_eq!(coordinator.in_flight_count(), 0);
    }
}
