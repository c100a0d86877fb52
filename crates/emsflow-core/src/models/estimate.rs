//! Estimate data models built from EMS export records.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A complete repair estimate assembled from one EMS file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Estimate {
    /// Estimate number from the header record.
    pub estimate_number: String,

    /// Claim number from the header record.
    pub claim_number: String,

    /// Date the estimate was written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_date: Option<NaiveDate>,

    /// Expected completion date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<NaiveDate>,

    /// Workflow status (default: imported).
    pub status: String,

    /// Insurer-designated repair program identifier.
    pub drp_provider: String,

    /// Vehicle information from the V record.
    pub vehicle: VehicleInfo,

    /// Insurance information from the I record.
    pub insurance: InsuranceInfo,

    /// Adjuster contact from the A record, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjuster: Option<AdjusterInfo>,

    /// Ordered line items from L records.
    pub line_items: Vec<LineItem>,

    /// Parts-catalog entries from P records. Parts are a shared catalog,
    /// not owned by this estimate.
    pub parts: Vec<Part>,

    /// Explicit totals from the T record. `None` means the file carried no
    /// totals record; presence is tracked separately from value so an
    /// all-zero record is still honored verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<TotalsRecord>,

    /// Ordered notes from N records.
    pub notes: Vec<Note>,

    /// Ordered supplements from S records.
    pub supplements: Vec<Supplement>,

    /// Damage assessment areas from D records.
    pub damage_areas: Vec<DamageArea>,

    /// Repair procedures from R records.
    pub repair_procedures: Vec<RepairProcedure>,

    /// File name the estimate was parsed from.
    pub source_file: String,

    /// SHA-256 hex digest over the raw file bytes. Used as idempotent
    /// upsert identity alongside the estimate number.
    pub fingerprint: String,

    /// Parse metadata and computed totals.
    pub metadata: ParseMetadata,
}

impl Estimate {
    /// Create an empty estimate for the given source file.
    pub fn new(source_file: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            status: "imported".to_string(),
            source_file: source_file.into(),
            fingerprint: fingerprint.into(),
            ..Self::default()
        }
    }

    /// Effective labor total: explicit totals record when present,
    /// otherwise the sum over line items.
    pub fn labor_total(&self) -> Decimal {
        match &self.totals {
            Some(t) => t.labor_total,
            None => self.metadata.computed_totals.labor_total,
        }
    }

    /// Effective parts total.
    pub fn parts_total(&self) -> Decimal {
        match &self.totals {
            Some(t) => t.parts_total,
            None => self.metadata.computed_totals.parts_total,
        }
    }

    /// Effective tax total. There is no line-item fallback for tax.
    pub fn tax_total(&self) -> Decimal {
        self.totals.as_ref().map(|t| t.tax_total).unwrap_or_default()
    }

    /// Effective total cost.
    pub fn total_cost(&self) -> Decimal {
        match &self.totals {
            Some(t) => t.total_cost,
            None => self.metadata.computed_totals.total_cost,
        }
    }

    /// Number of records assembled from the file, for processing logs.
    pub fn record_count(&self) -> usize {
        1 + self.line_items.len() + self.parts.len()
    }
}

/// Vehicle sub-record from the V line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleInfo {
    /// Vehicle identification number.
    pub vin: String,

    /// Model year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    /// Manufacturer, canonicalized during normalization.
    pub make: String,

    /// Model, title-cased during normalization.
    pub model: String,

    /// Trim level.
    pub trim_level: String,

    /// Odometer reading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<u32>,

    /// Exterior color.
    pub color: String,

    /// Body style.
    pub body_style: String,

    /// Engine size designation.
    pub engine_size: String,

    /// Transmission designation.
    pub transmission: String,
}

/// Insurance sub-record from the I line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceInfo {
    /// Insurance company name.
    pub company: String,

    /// Policy number.
    pub policy_number: String,

    /// Claim number as recorded by the insurer.
    pub claim_number: String,

    /// Policy deductible.
    pub deductible: Decimal,

    /// Coverage description.
    pub coverage: String,
}

/// Adjuster contact from the A line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdjusterInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub company: String,
}

/// A single repair line item from an L record. Owned exclusively by one
/// estimate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    /// Position on the estimate.
    pub line_number: u32,

    /// Canonical operation type.
    pub operation: OperationType,

    /// Part or operation description.
    pub part_description: String,

    /// Part number, if the line references one.
    pub part_number: String,

    /// Quantity (default 1).
    pub quantity: Decimal,

    /// Labor hours.
    pub labor_hours: Decimal,

    /// Labor rate per hour.
    pub labor_rate: Decimal,

    /// Labor cost for the line.
    pub labor_cost: Decimal,

    /// Part cost for the line.
    pub part_cost: Decimal,

    /// Total cost. Defaults to labor + part cost when the record does not
    /// supply one.
    pub total_cost: Decimal,

    /// Category label.
    pub category: String,

    /// Subcategory label.
    pub subcategory: String,

    /// Free-form notes.
    pub notes: String,
}

/// Canonical repair operation vocabulary. Unmapped abbreviations pass
/// through unchanged (lowercased) as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Replace,
    Repair,
    Refinish,
    RemoveInstall,
    OverhaulAdjust,
    Supplement,
    #[serde(untagged)]
    Other(String),
}

impl OperationType {
    /// Map an operation abbreviation to its canonical term,
    /// case-insensitively. Unmapped values are passed through lowercased.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "R" => OperationType::Replace,
            "REP" => OperationType::Repair,
            "REF" => OperationType::Refinish,
            "I&R" => OperationType::RemoveInstall,
            "O&A" => OperationType::OverhaulAdjust,
            "SUPP" => OperationType::Supplement,
            _ => OperationType::Other(raw.trim().to_lowercase()),
        }
    }

    /// Canonical term for display and persistence.
    pub fn as_str(&self) -> &str {
        match self {
            OperationType::Replace => "replace",
            OperationType::Repair => "repair",
            OperationType::Refinish => "refinish",
            OperationType::RemoveInstall => "remove_install",
            OperationType::OverhaulAdjust => "overhaul_adjust",
            OperationType::Supplement => "supplement",
            OperationType::Other(s) => s,
        }
    }
}

impl Default for OperationType {
    fn default() -> Self {
        Self::Repair
    }
}

/// A parts-catalog entry from a P record. Deduplicated globally by part
/// number on upsert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    /// Catalog identity.
    pub part_number: String,

    /// Part name.
    pub part_name: String,

    /// Original equipment manufacturer number.
    pub oem_number: String,

    /// Aftermarket equivalent number.
    pub aftermarket_number: String,

    /// List price.
    pub list_price: Decimal,

    /// Acquisition cost.
    pub cost: Decimal,

    /// Availability description.
    pub availability: String,

    /// Supplier name.
    pub supplier: String,

    /// Category label.
    pub category: String,

    /// Description.
    pub description: String,
}

/// Explicit estimate totals from the T record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsRecord {
    pub labor_total: Decimal,
    pub parts_total: Decimal,
    pub sublet_total: Decimal,
    pub tax_total: Decimal,
    pub total_cost: Decimal,
    pub sales_tax: Decimal,
    pub grand_total: Decimal,
}

/// A note from an N record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    /// Note type (default: general).
    pub kind: String,

    /// Note text.
    pub text: String,

    /// Timestamp carried on the record, when parseable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Author name.
    pub author: String,
}

/// A supplement from an S record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Supplement {
    /// Supplement number.
    pub number: String,

    /// Date filed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Reason for the supplement.
    pub reason: String,

    /// Supplement amount.
    pub amount: Decimal,

    /// Status (default: pending).
    pub status: String,
}

/// A damage assessment area from a D record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DamageArea {
    pub area: String,
    pub severity: String,
    pub description: String,
    pub operation: String,
}

/// A repair procedure from an R record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairProcedure {
    pub procedure: String,
    pub description: String,
    pub labor_time: Decimal,
    pub skill_level: String,
    pub refinish_included: bool,
}

/// Metadata accumulated while assembling an estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseMetadata {
    /// When the file was parsed.
    pub parsed_at: DateTime<Utc>,

    /// Non-blank line count in the source file.
    pub total_lines: usize,

    /// Per-line parse failures. A failing line never aborts the file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_issues: Vec<ParseIssue>,

    /// Sums over line items, always computed regardless of whether an
    /// explicit totals record was adopted.
    pub computed_totals: ComputedTotals,
}

impl Default for ParseMetadata {
    fn default() -> Self {
        Self {
            parsed_at: Utc::now(),
            total_lines: 0,
            parse_issues: Vec::new(),
            computed_totals: ComputedTotals::default(),
        }
    }
}

/// A recoverable parse failure on one line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseIssue {
    /// 1-based line number in the source file.
    pub line: usize,

    /// Raw line content.
    pub content: String,

    /// Failure message.
    pub message: String,
}

/// Line-item derived sums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputedTotals {
    pub labor_total: Decimal,
    pub parts_total: Decimal,
    pub total_cost: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_operation_normalize_known() {
        assert_eq!(OperationType::normalize("REP"), OperationType::Repair);
        assert_eq!(OperationType::normalize("rep"), OperationType::Repair);
        assert_eq!(OperationType::normalize("R"), OperationType::Replace);
        assert_eq!(OperationType::normalize("I&R"), OperationType::RemoveInstall);
        assert_eq!(OperationType::normalize("O&A"), OperationType::OverhaulAdjust);
    }

    #[test]
    fn test_operation_normalize_passthrough() {
        assert_eq!(
            OperationType::normalize("BLEND"),
            OperationType::Other("blend".to_string())
        );
        assert_eq!(OperationType::normalize("BLEND").as_str(), "blend");
    }

    #[test]
    fn test_effective_totals_prefer_explicit_record() {
        let mut estimate = Estimate::new("a.ems", "abc");
        estimate.metadata.computed_totals = ComputedTotals {
            labor_total: dec(150),
            parts_total: dec(30),
            total_cost: dec(180),
        };
        estimate.totals = Some(TotalsRecord {
            labor_total: dec(100),
            parts_total: dec(25),
            total_cost: dec(125),
            ..TotalsRecord::default()
        });

        assert_eq!(estimate.labor_total(), dec(100));
        assert_eq!(estimate.parts_total(), dec(25));
        assert_eq!(estimate.total_cost(), dec(125));
    }

    #[test]
    fn test_effective_totals_fall_back_to_sums() {
        let mut estimate = Estimate::new("a.ems", "abc");
        estimate.metadata.computed_totals = ComputedTotals {
            labor_total: dec(150),
            parts_total: dec(30),
            total_cost: dec(180),
        };

        assert_eq!(estimate.labor_total(), dec(150));
        assert_eq!(estimate.parts_total(), dec(30));
        assert_eq!(estimate.total_cost(), dec(180));
    }

    #[test]
    fn test_all_zero_totals_record_is_honored() {
        let mut estimate = Estimate::new("a.ems", "abc");
        estimate.metadata.computed_totals = ComputedTotals {
            labor_total: dec(150),
            parts_total: dec(30),
            total_cost: dec(180),
        };
        estimate.totals = Some(TotalsRecord::default());

        assert_eq!(estimate.labor_total(), Decimal::ZERO);
        assert_eq!(estimate.total_cost(), Decimal::ZERO);
    }
}
