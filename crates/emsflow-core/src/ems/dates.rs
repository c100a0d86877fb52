//! Date parsing for EMS record fields.

use chrono::NaiveDate;

/// Formats tried in priority order; the first match wins. EMS exports are
/// US-originated, so no DD/MM disambiguation is attempted.
const DATE_FORMATS: [&str; 3] = ["%m/%d/%Y", "%Y-%m-%d", "%m-%d-%Y"];

/// Parse a date field. Blank or unrecognized input yields `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
