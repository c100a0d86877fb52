//! Command implementations.

pub mod backfill;
pub mod config;
pub mod status;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use emsflow_core::models::EmsflowConfig;
use emsflow_core::ocr::{NullRecognizer, OcrPipeline};
use emsflow_core::{Coordinator, EstimateStore, FileNameAssociator};
use emsflow_store::RestStore;

/// Load configuration from the given path, or fall back to defaults.
pub(crate) fn load_config(path: Option<&str>) -> anyhow::Result<EmsflowConfig> {
    match path {
        Some(path) => Ok(EmsflowConfig::from_file(Path::new(path))?),
        None => Ok(EmsflowConfig::default()),
    }
}

/// Connect to the backend and assemble the processing coordinator. The
/// connectivity probe is fatal: a service that cannot persist anything
/// should not start consuming files.
pub(crate) async fn build_coordinator(
    config: &EmsflowConfig,
) -> anyhow::Result<(Arc<Coordinator>, Arc<RestStore>)> {
    let store = Arc::new(RestStore::new(&config.store)?);
    store
        .check_connection()
        .await
        .map_err(|e| anyhow::anyhow!("backend connection test failed: {e}"))?;

    let ocr = if config.ocr.enabled {
        OcrPipeline::new(Arc::new(NullRecognizer), &config.ocr)
    } else {
        OcrPipeline::disabled()
    };

    let coordinator = Coordinator::new(
        store.clone(),
        Arc::new(ocr),
        Arc::new(FileNameAssociator::new(config.processing.max_image_suffix)),
        config.clone(),
    );
    Ok((Arc::new(coordinator), store))
}
