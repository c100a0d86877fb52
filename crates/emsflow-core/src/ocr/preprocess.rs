//! Image preprocessing ahead of text recognition.

use std::path::{Path, PathBuf};

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use tracing::{debug, warn};

use crate::error::OcrError;

/// A preprocessed input for the recognizer. Holds the scratch file alive
/// until recognition has run.
pub struct PreparedImage {
    path: PathBuf,
    _scratch: Option<tempfile::TempPath>,
}

impl PreparedImage {
    /// Path to feed the recognizer.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn original(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            _scratch: None,
        }
    }
}

/// Preprocessor that upscales, greyscales, normalizes contrast, and
/// binarizes raster images for better recognition.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    upscale: u32,
    threshold: u8,
}

impl ImagePreprocessor {
    pub fn new(upscale: u32, threshold: u8) -> Self {
        Self {
            upscale: upscale.max(1),
            threshold,
        }
    }

    /// Prepare an image file for recognition.
    ///
    /// Document formats (pdf) pass through untouched. A preprocessing
    /// failure falls back to the original file rather than failing the
    /// extraction.
    pub fn prepare(&self, path: &Path) -> PreparedImage {
        if is_document_format(path) {
            return PreparedImage::original(path);
        }

        match self.transform(path) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "preprocessing failed, using original");
                PreparedImage::original(path)
            }
        }
    }

    fn transform(&self, path: &Path) -> Result<PreparedImage, OcrError> {
        let image = image::open(path).map_err(|e| OcrError::Preprocessing(e.to_string()))?;

        let upscaled = image.resize_exact(
            image.width() * self.upscale,
            image.height() * self.upscale,
            FilterType::CatmullRom,
        );
        let gray = upscaled.to_luma8();
        let normalized = normalize_contrast(&gray);
        let binarized = binarize(&normalized, self.threshold);

        let scratch = tempfile::Builder::new()
            .prefix("emsflow-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Preprocessing(e.to_string()))?
            .into_temp_path();

        DynamicImage::ImageLuma8(binarized)
            .save_with_format(&scratch, image::ImageFormat::Png)
            .map_err(|e| OcrError::Preprocessing(e.to_string()))?;

        debug!(path = %path.display(), "preprocessed image for recognition");
        Ok(PreparedImage {
            path: scratch.to_path_buf(),
            _scratch: Some(scratch),
        })
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(2, 128)
    }
}

/// Stretch grey levels to the full range.
fn normalize_contrast(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(min, max), pixel| {
            (min.min(pixel[0]), max.max(pixel[0]))
        });

    if min >= max {
        return image.clone();
    }

    let range = (max - min) as f32;
    let mut result = image.clone();
    for pixel in result.pixels_mut() {
        let stretched = ((pixel[0] - min) as f32 / range * 255.0) as u8;
        *pixel = Luma([stretched]);
    }
    result
}

/// Hard threshold to black and white.
fn binarize(image: &GrayImage, threshold: u8) -> GrayImage {
    let mut result = image.clone();
    for pixel in result.pixels_mut() {
        *pixel = Luma([if pixel[0] > threshold { 255 } else { 0 }]);
    }
    result
}

/// Formats handed to the recognizer without raster preprocessing.
pub fn is_document_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
