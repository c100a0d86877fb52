//! Data models for estimates, configuration, and processing logs.

pub mod config;
pub mod estimate;
pub mod log;

pub use config::{EmsflowConfig, LocationInfo, OcrConfig, ProcessingConfig, StoreConfig, WatchConfig};
pub use estimate::{
    AdjusterInfo, ComputedTotals, DamageArea, Estimate, InsuranceInfo, LineItem, Note,
    OperationType, ParseIssue, ParseMetadata, Part, RepairProcedure, Supplement, TotalsRecord,
    VehicleInfo,
};
pub use log::{ProcessingLogEntry, ProcessingStats, ProcessingStatus};
