//! OCR pipeline: format validation, preprocessing, recognition, and
//! entity extraction.

mod entities;
mod preprocess;

pub use entities::{extract_entities, DocumentEntities};
pub use preprocess::{is_document_format, ImagePreprocessor, PreparedImage};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// File extensions accepted for text extraction.
pub const SUPPORTED_FORMATS: &[&str] = &["jpg", "jpeg", "png", "gif", "pdf"];

/// Raw recognizer output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedText {
    /// Recognized text.
    pub text: String,

    /// Recognition confidence (0.0 - 100.0).
    pub confidence: f32,
}

/// Text plus extracted entities, ready to persist onto an image record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrText {
    /// Raw recognized text.
    pub text: String,

    /// Recognition confidence (0.0 - 100.0).
    pub confidence: f32,

    /// Structured entities found in the text.
    pub entities: DocumentEntities,
}

/// External text recognition engine.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in a (possibly preprocessed) image file. `None`
    /// means no text was detected.
    async fn recognize(&self, path: &Path) -> Result<Option<RecognizedText>, OcrError>;
}

/// Recognizer used when no engine is wired in; never detects text.
#[derive(Debug, Clone, Default)]
pub struct NullRecognizer;

#[async_trait]
impl TextRecognizer for NullRecognizer {
    async fn recognize(&self, _path: &Path) -> Result<Option<RecognizedText>, OcrError> {
        Ok(None)
    }
}

/// End-to-end OCR pipeline. Failures are absorbed and reported as "no
/// text" so an OCR problem never fails the owning estimate.
pub struct OcrPipeline {
    recognizer: Arc<dyn TextRecognizer>,
    preprocessor: ImagePreprocessor,
    enabled: bool,
}

impl OcrPipeline {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, config: &OcrConfig) -> Self {
        Self {
            recognizer,
            preprocessor: ImagePreprocessor::new(config.upscale, config.threshold),
            enabled: config.enabled,
        }
    }

    /// Pipeline with recognition disabled; every extraction is a no-op.
    pub fn disabled() -> Self {
        Self {
            recognizer: Arc::new(NullRecognizer),
            preprocessor: ImagePreprocessor::default(),
            enabled: false,
        }
    }

    /// Whether the OCR step runs at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Extract text and entities from an image file.
    pub async fn extract_text(&self, path: &Path) -> Option<OcrText> {
        if !self.enabled {
            debug!("OCR is disabled, skipping text extraction");
            return None;
        }

        if !is_supported_format(path) {
            warn!(path = %path.display(), "unsupported image format for OCR");
            return None;
        }

        let prepared = self.preprocessor.prepare(path);
        match self.recognizer.recognize(prepared.path()).await {
            Ok(Some(recognized)) if !recognized.text.trim().is_empty() => {
                info!(
                    path = %path.display(),
                    chars = recognized.text.len(),
                    "extracted text from image"
                );
                let entities = extract_entities(&recognized.text);
                Some(OcrText {
                    text: recognized.text,
                    confidence: recognized.confidence,
                    entities,
                })
            }
            Ok(_) => {
                debug!(path = %path.display(), "no text detected in image");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "text recognition failed");
                None
            }
        }
    }
}

/// Check the extension against the supported set, case-insensitively.
pub fn is_supported_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SUPPORTED_FORMATS
                .iter()
                .any(|s| ext.eq_ignore_ascii_case(s))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedRecognizer(String);

    #[async_trait]
    impl TextRecognizer for FixedRecognizer {
        async fn recognize(&self, _path: &Path) -> Result<Option<RecognizedText>, OcrError> {
            Ok(Some(RecognizedText {
                text: self.0.clone(),
                confidence: 88.5,
            }))
        }
    }

    struct FailingRecognizer;

    #[async_trait]
    impl TextRecognizer for FailingRecognizer {
        async fn recognize(&self, _path: &Path) -> Result<Option<RecognizedText>, OcrError> {
            Err(OcrError::Recognition("engine crashed".to_string()))
        }
    }

    fn pipeline_with(recognizer: Arc<dyn TextRecognizer>) -> OcrPipeline {
        OcrPipeline::new(recognizer, &OcrConfig::default())
    }

    #[test]
    fn test_supported_formats_are_case_insensitive() {
        assert!(is_supported_format(Path::new("a.jpg")));
        assert!(is_supported_format(Path::new("a.JPEG")));
        assert!(is_supported_format(Path::new("a.Png")));
        assert!(is_supported_format(Path::new("a.pdf")));
        assert!(!is_supported_format(Path::new("a.tiff")));
        assert!(!is_supported_format(Path::new("noext")));
    }

    #[tokio::test]
    async fn test_disabled_pipeline_is_a_noop() {
        let pipeline = OcrPipeline::disabled();
        assert!(pipeline.extract_text(Path::new("a.pdf")).await.is_none());
    }

    #[tokio::test]
    async fn test_extraction_includes_entities() {
        let pipeline = pipeline_with(Arc::new(FixedRecognizer(
            "Claim #CLM-99887766 for VIN 1G1ZD5ST8JF134768".to_string(),
        )));

        // pdf skips raster preprocessing, so no real file is needed.
        let result = pipeline.extract_text(Path::new("doc.pdf")).await.unwrap();
        assert_eq!(result.confidence, 88.5);
        assert_eq!(result.entities.claim_numbers, vec!["CLM-99887766"]);
        assert_eq!(result.entities.vins, vec!["1G1ZD5ST8JF134768"]);
    }

    #[tokio::test]
    async fn test_recognizer_failure_is_absorbed() {
        let pipeline = pipeline_with(Arc::new(FailingRecognizer));
        assert!(pipeline.extract_text(Path::new("doc.pdf")).await.is_none());
    }

    #[tokio::test]
    async fn test_blank_text_is_no_text() {
        let pipeline = pipeline_with(Arc::new(FixedRecognizer("   \n".to_string())));
        assert!(pipeline.extract_text(Path::new("doc.pdf")).await.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_format_is_skipped() {
        let pipeline = pipeline_with(Arc::new(FixedRecognizer("text".to_string())));
        assert!(pipeline.extract_text(Path::new("a.bmp")).await.is_none());
    }
}
