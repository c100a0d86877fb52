//! Core library for EMS estimate ingestion.
//!
//! This crate provides:
//! - EMS export file parsing (pipe-delimited tagged records)
//! - Estimate assembly, normalization and totals reconciliation
//! - Image association and OCR-based entity extraction
//! - The watch pipeline: filesystem events, dedup, persistence, relocation

pub mod assoc;
pub mod ems;
pub mod error;
pub mod models;
pub mod ocr;
pub mod store;
pub mod watch;

pub use assoc::{FileNameAssociator, ImageAssociator, ImageKind};
pub use ems::EmsParser;
pub use error::{EmsflowError, ParseError, Result, StoreError};
pub use models::{EmsflowConfig, Estimate, LineItem, OperationType, ProcessingLogEntry};
pub use ocr::{OcrPipeline, OcrText, TextRecognizer};
pub use store::{EstimateStore, MemoryStore, UpsertOutcome};
pub use watch::{Coordinator, FileWatcher, ProcessOutcome};
