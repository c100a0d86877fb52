//! Error types for the emsflow-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the emsflow library.
#[derive(Error, Debug)]
pub enum EmsflowError {
    /// EMS file parsing error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Persistence gateway error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Filesystem watch error.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// Image decoding/encoding error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to EMS file parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The source file could not be read at all.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record line carried a recognized tag but no payload fields.
    #[error("line {line}: {tag} record has no fields")]
    EmptyRecord { line: usize, tag: char },

    /// A record line could not be mapped onto its section.
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Errors from the persistence gateway.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend rejected a request.
    #[error("request failed: {0}")]
    Request(String),

    /// A response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// An operation exceeded its configured deadline.
    #[error("operation timed out after {0}s")]
    Timeout(u64),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The file format is not supported for text extraction.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The image failed validation before upload.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors from the filesystem watcher.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The watch root does not exist or is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The underlying notify subscription failed.
    #[error("watcher failed: {0}")]
    Subscription(String),
}

/// Result type for the emsflow library.
pub type Result<T> = std::result::Result<T, EmsflowError>;
