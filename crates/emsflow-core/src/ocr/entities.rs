//! Structured entity extraction from recognized image text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // 17 characters, alphanumeric, excluding I, O, Q.
    static ref VIN: Regex = Regex::new(r"\b[A-HJ-NPR-Z0-9]{17}\b").unwrap();

    static ref PHONE: Regex =
        Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap();

    static ref EMAIL: Regex =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap();

    static ref CLAIM_NUMBER: Regex =
        Regex::new(r"(?i)(?:claim|file|ref)[\s#:]*([A-Z0-9-]{6,20})").unwrap();

    static ref ESTIMATE_NUMBER: Regex =
        Regex::new(r"(?i)(?:estimate|est)[\s#:]*([A-Z0-9-]{6,20})").unwrap();
}

/// Damage vocabulary tested by keyword membership.
const DAMAGE_TERMS: &[&str] = &[
    "dent", "scratch", "cracked", "broken", "damaged", "bent", "torn",
    "collision", "impact", "bumper", "hood", "door", "fender", "quarter panel",
    "headlight", "taillight", "windshield", "mirror", "paint",
];

/// Part vocabulary tested by keyword membership.
const PART_TERMS: &[&str] = &[
    "airbag", "alternator", "battery", "brake", "clutch", "engine",
    "exhaust", "filter", "radiator", "starter", "transmission", "tire",
    "wheel", "axle", "suspension", "catalytic converter",
];

/// Entities pulled out of recognized text with fixed pattern matchers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentEntities {
    pub vins: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub emails: Vec<String>,
    pub claim_numbers: Vec<String>,
    pub estimate_numbers: Vec<String>,
    pub damage_terms: Vec<String>,
    pub part_terms: Vec<String>,
}

impl DocumentEntities {
    pub fn is_empty(&self) -> bool {
        self.vins.is_empty()
            && self.phone_numbers.is_empty()
            && self.emails.is_empty()
            && self.claim_numbers.is_empty()
            && self.estimate_numbers.is_empty()
            && self.damage_terms.is_empty()
            && self.part_terms.is_empty()
    }
}

/// Run all fixed matchers over recognized text.
pub fn extract_entities(text: &str) -> DocumentEntities {
    let lower = text.to_lowercase();

    DocumentEntities {
        vins: unique_matches(&VIN, text),
        phone_numbers: unique_matches(&PHONE, text),
        emails: unique_matches(&EMAIL, text),
        claim_numbers: unique_captures(&CLAIM_NUMBER, text),
        estimate_numbers: unique_captures(&ESTIMATE_NUMBER, text),
        damage_terms: keyword_members(DAMAGE_TERMS, &lower),
        part_terms: keyword_members(PART_TERMS, &lower),
    }
}

fn unique_matches(pattern: &Regex, text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in pattern.find_iter(text) {
        let value = m.as_str().to_string();
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

fn unique_captures(pattern: &Regex, text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in pattern.captures_iter(text) {
        let value = caps[1].to_string();
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

fn keyword_members(vocabulary: &[&str], lower_text: &str) -> Vec<String> {
    vocabulary
        .iter()
        .filter(|term| lower_text.contains(*term))
        .map(|term| term.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vin_extraction() {
        let entities = extract_entities("VIN: 1G1ZD5ST8JF134768 on the dash");
        assert_eq!(entities.vins, vec!["1G1ZD5ST8JF134768"]);
    }

    #[test]
    fn test_vin_rejects_banned_letters() {
        // Contains I and O, which VINs never use.
        let entities = extract_entities("IO1ZD5ST8JF134768");
        assert!(entities.vins.is_empty());
    }

    #[test]
    fn test_phone_and_email() {
        let entities = extract_entities("Call (555) 867-5309 or mail adjuster@insurer.com");
        assert_eq!(entities.phone_numbers, vec!["(555) 867-5309"]);
        assert_eq!(entities.emails, vec!["adjuster@insurer.com"]);
    }

    #[test]
    fn test_labeled_numbers() {
        let entities = extract_entities("Claim #CLM-2024-0042 Estimate: EST-001234");
        assert_eq!(entities.claim_numbers, vec!["CLM-2024-0042"]);
        assert_eq!(entities.estimate_numbers, vec!["EST-001234"]);
    }

    #[test]
    fn test_keyword_vocabularies() {
        let entities =
            extract_entities("Deep scratch across the hood, radiator pushed into the engine");
        assert!(entities.damage_terms.contains(&"scratch".to_string()));
        assert!(entities.damage_terms.contains(&"hood".to_string()));
        assert!(entities.part_terms.contains(&"radiator".to_string()));
        assert!(entities.part_terms.contains(&"engine".to_string()));
    }

    #[test]
    fn test_duplicates_collapse() {
        let entities = extract_entities("555-867-5309 then again 555-867-5309");
        assert_eq!(entities.phone_numbers.len(), 1);
    }

    #[test]
    fn test_empty_text() {
        assert!(extract_entities("").is_empty());
    }
}
