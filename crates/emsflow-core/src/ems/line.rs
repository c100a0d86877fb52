//! Single-line record parsing: tag dispatch and positional field mapping.
//!
//! Pure mapping from one raw tagged line onto the accumulating estimate;
//! no I/O happens here.

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::ParseError;
use crate::models::estimate::*;

use super::dates::parse_date;

/// Field delimiter used by EMS exports.
pub const DELIMITER: char = '|';

/// Closed set of recognized record tags, plus an explicit unknown fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    Header,
    Vehicle,
    Insurance,
    LineItem,
    Part,
    Totals,
    Note,
    Supplement,
    Adjuster,
    DamageArea,
    RepairProcedure,
    /// Anything else. Ignored without error or mutation.
    Unknown,
}

impl RecordTag {
    /// Map a one-character tag field to its record type.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "H" => RecordTag::Header,
            "V" => RecordTag::Vehicle,
            "I" => RecordTag::Insurance,
            "L" => RecordTag::LineItem,
            "P" => RecordTag::Part,
            "T" => RecordTag::Totals,
            "N" => RecordTag::Note,
            "S" => RecordTag::Supplement,
            "A" => RecordTag::Adjuster,
            "D" => RecordTag::DamageArea,
            "R" => RecordTag::RepairProcedure,
            _ => RecordTag::Unknown,
        }
    }
}

/// Apply one non-blank, trimmed line to the estimate.
///
/// Singleton sections (header, vehicle, insurance, totals, adjuster)
/// overwrite their slot; repeatable sections append. Unknown tags are a
/// debug-only signal. `line_number` is 1-based and used only for error
/// reporting.
pub fn apply_line(line: &str, line_number: usize, estimate: &mut Estimate) -> Result<(), ParseError> {
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    let tag = RecordTag::from_tag(fields[0]);

    if tag == RecordTag::Unknown {
        debug!(line = line_number, tag = fields[0], "unknown record tag");
        return Ok(());
    }

    if fields.len() < 2 {
        return Err(ParseError::EmptyRecord {
            line: line_number,
            tag: fields[0].chars().next().unwrap_or('?'),
        });
    }

    match tag {
        RecordTag::Header => apply_header(&fields, estimate),
        RecordTag::Vehicle => apply_vehicle(&fields, estimate),
        RecordTag::Insurance => apply_insurance(&fields, estimate),
        RecordTag::LineItem => apply_line_item(&fields, estimate),
        RecordTag::Part => apply_part(&fields, estimate),
        RecordTag::Totals => apply_totals(&fields, estimate),
        RecordTag::Note => apply_note(&fields, estimate),
        RecordTag::Supplement => apply_supplement(&fields, estimate),
        RecordTag::Adjuster => apply_adjuster(&fields, estimate),
        RecordTag::DamageArea => apply_damage_area(&fields, estimate),
        RecordTag::RepairProcedure => apply_repair_procedure(&fields, estimate),
        RecordTag::Unknown => unreachable!("handled above"),
    }

    Ok(())
}

/// Positional field access; missing positions read as blank.
fn field(fields: &[&str], index: usize) -> String {
    fields.get(index).map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Numeric coercion: blank or malformed input defaults to zero.
fn parse_decimal(fields: &[&str], index: usize) -> Decimal {
    parse_decimal_opt(fields, index).unwrap_or_default()
}

/// Numeric coercion preserving absence: blank or malformed input is `None`.
fn parse_decimal_opt(fields: &[&str], index: usize) -> Option<Decimal> {
    fields
        .get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<Decimal>().ok())
}

fn parse_i32(fields: &[&str], index: usize) -> Option<i32> {
    fields
        .get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i32>().ok())
}

fn parse_u32(fields: &[&str], index: usize) -> Option<u32> {
    fields
        .get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<u32>().ok())
}

fn apply_header(fields: &[&str], estimate: &mut Estimate) {
    estimate.estimate_number = field(fields, 1);
    estimate.claim_number = field(fields, 2);
    estimate.estimate_date = parse_date(&field(fields, 3));
    estimate.completion_date = parse_date(&field(fields, 4));
    let status = field(fields, 5);
    estimate.status = if status.is_empty() { "imported".to_string() } else { status };
    estimate.drp_provider = field(fields, 6);
}

fn apply_vehicle(fields: &[&str], estimate: &mut Estimate) {
    estimate.vehicle = VehicleInfo {
        vin: field(fields, 1),
        year: parse_i32(fields, 2),
        make: field(fields, 3),
        model: field(fields, 4),
        trim_level: field(fields, 5),
        mileage: parse_u32(fields, 6),
        color: field(fields, 7),
        body_style: field(fields, 8),
        engine_size: field(fields, 9),
        transmission: field(fields, 10),
    };
}

fn apply_insurance(fields: &[&str], estimate: &mut Estimate) {
    estimate.insurance = InsuranceInfo {
        company: field(fields, 1),
        policy_number: field(fields, 2),
        claim_number: field(fields, 3),
        deductible: parse_decimal(fields, 4),
        coverage: field(fields, 5),
    };
}

fn apply_line_item(fields: &[&str], estimate: &mut Estimate) {
    let labor_cost = parse_decimal(fields, 8);
    let part_cost = parse_decimal(fields, 9);
    // An absent total defaults to labor + part; an explicit value is kept
    // verbatim, zero included.
    let total_cost = parse_decimal_opt(fields, 10).unwrap_or(labor_cost + part_cost);

    let item = LineItem {
        line_number: parse_u32(fields, 1).unwrap_or(estimate.line_items.len() as u32 + 1),
        operation: OperationType::normalize(&field(fields, 2)),
        part_description: field(fields, 3),
        part_number: field(fields, 4),
        quantity: parse_decimal_opt(fields, 5).unwrap_or(Decimal::ONE),
        labor_hours: parse_decimal(fields, 6),
        labor_rate: parse_decimal(fields, 7),
        labor_cost,
        part_cost,
        total_cost,
        category: field(fields, 11),
        subcategory: field(fields, 12),
        notes: field(fields, 13),
    };

    estimate.line_items.push(item);
}

fn apply_part(fields: &[&str], estimate: &mut Estimate) {
    estimate.parts.push(Part {
        part_number: field(fields, 1),
        part_name: field(fields, 2),
        oem_number: field(fields, 3),
        aftermarket_number: field(fields, 4),
        list_price: parse_decimal(fields, 5),
        cost: parse_decimal(fields, 6),
        availability: field(fields, 7),
        supplier: field(fields, 8),
        category: field(fields, 9),
        description: field(fields, 10),
    });
}

fn apply_totals(fields: &[&str], estimate: &mut Estimate) {
    estimate.totals = Some(TotalsRecord {
        labor_total: parse_decimal(fields, 1),
        parts_total: parse_decimal(fields, 2),
        sublet_total: parse_decimal(fields, 3),
        tax_total: parse_decimal(fields, 4),
        total_cost: parse_decimal(fields, 5),
        sales_tax: parse_decimal(fields, 6),
        grand_total: parse_decimal(fields, 7),
    });
}

fn apply_note(fields: &[&str], estimate: &mut Estimate) {
    let kind = field(fields, 1);
    estimate.notes.push(Note {
        kind: if kind.is_empty() { "general".to_string() } else { kind },
        text: field(fields, 2),
        date: parse_date(&field(fields, 3)),
        author: field(fields, 4),
    });
}

fn apply_supplement(fields: &[&str], estimate: &mut Estimate) {
    let status = field(fields, 5);
    estimate.supplements.push(Supplement {
        number: field(fields, 1),
        date: parse_date(&field(fields, 2)),
        reason: field(fields, 3),
        amount: parse_decimal(fields, 4),
        status: if status.is_empty() { "pending".to_string() } else { status },
    });
}

fn apply_adjuster(fields: &[&str], estimate: &mut Estimate) {
    estimate.adjuster = Some(AdjusterInfo {
        name: field(fields, 1),
        phone: field(fields, 2),
        email: field(fields, 3),
        company: field(fields, 4),
    });
}

fn apply_damage_area(fields: &[&str], estimate: &mut Estimate) {
    let operation = field(fields, 4);
    estimate.damage_areas.push(DamageArea {
        area: field(fields, 1),
        severity: field(fields, 2),
        description: field(fields, 3),
        operation: if operation.is_empty() { "repair".to_string() } else { operation },
    });
}

fn apply_repair_procedure(fields: &[&str], estimate: &mut Estimate) {
    estimate.repair_procedures.push(RepairProcedure {
        procedure: field(fields, 1),
        description: field(fields, 2),
        labor_time: parse_decimal(fields, 3),
        skill_level: field(fields, 4),
        refinish_included: field(fields, 5) == "Y",
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty() -> Estimate {
        Estimate::new("test.ems", "0000")
    }

    #[test]
    fn test_line_item_example() {
        let mut estimate = empty();
        apply_line(
            "L|1|REP|Front Bumper|BMP-001|1|2.5|65|162.50|45.00|207.50|Exterior|Bumper|",
            1,
            &mut estimate,
        )
        .unwrap();

        let item = &estimate.line_items[0];
        assert_eq!(item.line_number, 1);
        assert_eq!(item.operation, OperationType::Repair);
        assert_eq!(item.part_description, "Front Bumper");
        assert_eq!(item.labor_hours, "2.5".parse().unwrap());
        assert_eq!(item.labor_cost, "162.50".parse().unwrap());
        assert_eq!(item.part_cost, "45.00".parse().unwrap());
        assert_eq!(item.total_cost, "207.50".parse().unwrap());
    }

    #[test]
    fn test_line_item_total_defaults_to_labor_plus_part() {
        let mut estimate = empty();
        apply_line("L|1|REP|Hood||1|1.0|50|100.00|20.00|", 1, &mut estimate).unwrap();
        assert_eq!(estimate.line_items[0].total_cost, "120".parse().unwrap());
    }

    #[test]
    fn test_line_item_explicit_zero_total_is_kept() {
        let mut estimate = empty();
        apply_line("L|1|REP|Hood||1|1.0|50|100.00|20.00|0.00|", 1, &mut estimate).unwrap();
        assert_eq!(estimate.line_items[0].total_cost, Decimal::ZERO);
    }

    #[test]
    fn test_line_number_defaults_to_sequence() {
        let mut estimate = empty();
        apply_line("L||REP|Hood|", 1, &mut estimate).unwrap();
        apply_line("L||REP|Fender|", 2, &mut estimate).unwrap();
        assert_eq!(estimate.line_items[0].line_number, 1);
        assert_eq!(estimate.line_items[1].line_number, 2);
    }

    #[test]
    fn test_unknown_tag_is_ignored_without_mutation() {
        let mut estimate = empty();
        apply_line("X|whatever|fields", 1, &mut estimate).unwrap();
        apply_line("E|", 1, &mut estimate).unwrap();

        assert!(estimate.estimate_number.is_empty());
        assert!(estimate.line_items.is_empty());
        assert!(estimate.parts.is_empty());
        assert!(estimate.notes.is_empty());
        assert!(estimate.totals.is_none());
    }

    #[test]
    fn test_bare_recognized_tag_is_an_empty_record() {
        let mut estimate = empty();
        let err = apply_line("L", 7, &mut estimate).unwrap_err();
        assert!(matches!(err, ParseError::EmptyRecord { line: 7, tag: 'L' }));
        assert!(estimate.line_items.is_empty());
    }

    #[test]
    fn test_singleton_sections_overwrite() {
        let mut estimate = empty();
        apply_line("H|EST-1|CLM-1|03/15/2024||open|", 1, &mut estimate).unwrap();
        apply_line("H|EST-2|CLM-2|||", 2, &mut estimate).unwrap();
        assert_eq!(estimate.estimate_number, "EST-2");
        // Blank status re-defaults on overwrite.
        assert_eq!(estimate.status, "imported");
    }

    #[test]
    fn test_repeatable_sections_append_in_order() {
        let mut estimate = empty();
        apply_line("N|general|first note||tech", 1, &mut estimate).unwrap();
        apply_line("N||second note||", 2, &mut estimate).unwrap();
        assert_eq!(estimate.notes.len(), 2);
        assert_eq!(estimate.notes[0].text, "first note");
        assert_eq!(estimate.notes[1].kind, "general");
    }

    #[test]
    fn test_vehicle_numeric_coercion() {
        let mut estimate = empty();
        apply_line("V|1G1ZD5ST8JF134768|2018|CHEV|MALIBU|LT|not-a-number|Silver|", 1, &mut estimate)
            .unwrap();
        assert_eq!(estimate.vehicle.year, Some(2018));
        assert_eq!(estimate.vehicle.mileage, None);
        assert_eq!(estimate.vehicle.make, "CHEV");
    }

    #[test]
    fn test_totals_record_presence() {
        let mut estimate = empty();
        assert!(estimate.totals.is_none());
        apply_line("T|0|0|0|0|0|0|0", 1, &mut estimate).unwrap();
        assert!(estimate.totals.is_some());
    }

    #[test]
    fn test_repair_procedure_refinish_flag() {
        let mut estimate = empty();
        apply_line("R|R&I bumper|remove and install|1.5|P2|Y", 1, &mut estimate).unwrap();
        apply_line("R|blend fender|blend|0.5|P1|N", 2, &mut estimate).unwrap();
        assert!(estimate.repair_procedures[0].refinish_included);
        assert!(!estimate.repair_procedures[1].refinish_included);
    }
}
