//! EMS file assembly: fold lines into one estimate, then reconcile and
//! normalize.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{ParseError, Result};
use crate::models::estimate::{ComputedTotals, Estimate, ParseIssue};

use super::line::apply_line;
use super::vocab::{normalize_make, normalize_model};

/// Parser for EMS export files.
#[derive(Debug, Clone, Default)]
pub struct EmsParser;

impl EmsParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one EMS file into an estimate.
    ///
    /// Only a read failure is a hard error. Every per-line malformity is
    /// absorbed into `metadata.parse_issues` and the caller receives a
    /// best-effort estimate.
    pub fn parse_file(&self, path: &Path) -> Result<Estimate> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        info!(file = %file_name, "parsing EMS file");

        let bytes = std::fs::read(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        // Fingerprint covers the raw bytes so byte-identical content always
        // maps to the same upsert identity.
        let fingerprint = format!("{:x}", Sha256::digest(&bytes));
        let content = String::from_utf8_lossy(&bytes);

        let mut estimate = Estimate::new(file_name, fingerprint);
        let mut total_lines = 0usize;

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            total_lines += 1;

            let line_number = index + 1;
            if let Err(err) = apply_line(line, line_number, &mut estimate) {
                warn!(line = line_number, error = %err, "skipping malformed line");
                estimate.metadata.parse_issues.push(ParseIssue {
                    line: line_number,
                    content: line.to_string(),
                    message: err.to_string(),
                });
            }
        }

        estimate.metadata.total_lines = total_lines;

        reconcile_totals(&mut estimate);
        normalize(&mut estimate);

        info!(
            line_items = estimate.line_items.len(),
            issues = estimate.metadata.parse_issues.len(),
            "assembled estimate"
        );
        Ok(estimate)
    }
}

/// Compute line-item sums and record them in metadata. The sums are
/// recorded whether or not an explicit totals record was present; effective
/// totals on [`Estimate`] prefer the explicit record.
fn reconcile_totals(estimate: &mut Estimate) {
    let mut computed = ComputedTotals::default();
    for item in &estimate.line_items {
        computed.labor_total += item.labor_cost;
        computed.parts_total += item.part_cost;
        computed.total_cost += item.total_cost;
    }

    if estimate.totals.is_none() && !estimate.line_items.is_empty() {
        debug!("no totals record; line-item sums will be adopted");
    }
    estimate.metadata.computed_totals = computed;
}

/// Canonicalize vocabulary: manufacturer abbreviations and model casing.
/// Line-item operations were already normalized during record dispatch.
fn normalize(estimate: &mut Estimate) {
    if !estimate.vehicle.make.is_empty() {
        estimate.vehicle.make = normalize_make(&estimate.vehicle.make);
    }
    if !estimate.vehicle.model.is_empty() {
        estimate.vehicle.model = normalize_model(&estimate.vehicle.model);
    }
}
