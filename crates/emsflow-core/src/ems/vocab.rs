//! Controlled-vocabulary normalization for manufacturer and model names.

/// Manufacturer abbreviations as written by the estimating system, mapped
/// to canonical names.
const MAKE_MAP: &[(&str, &str)] = &[
    ("CHEV", "Chevrolet"),
    ("FORD", "Ford"),
    ("TOYO", "Toyota"),
    ("HOND", "Honda"),
    ("NISS", "Nissan"),
    ("HYUN", "Hyundai"),
    ("SUBR", "Subaru"),
    ("MAZD", "Mazda"),
    ("BMW", "BMW"),
    ("MERC", "Mercedes-Benz"),
    ("AUDI", "Audi"),
    ("VOLK", "Volkswagen"),
];

/// Canonicalize a manufacturer abbreviation, case-insensitively. Unmapped
/// values pass through unchanged.
pub fn normalize_make(make: &str) -> String {
    let key = make.trim().to_uppercase();
    MAKE_MAP
        .iter()
        .find(|(abbrev, _)| *abbrev == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| make.to_string())
}

/// Title-case a model name: first character upper, rest lower.
pub fn normalize_model(model: &str) -> String {
    let mut chars = model.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_make_abbreviation() {
        assert_eq!(normalize_make("CHEV"), "Chevrolet");
        assert_eq!(normalize_make("chev"), "Chevrolet");
        assert_eq!(normalize_make("MERC"), "Mercedes-Benz");
    }

    #[test]
    fn test_unmapped_make_passes_through() {
        assert_eq!(normalize_make("TESLA"), "TESLA");
        assert_eq!(normalize_make("Rivian"), "Rivian");
    }

    #[test]
    fn test_model_title_case() {
        assert_eq!(normalize_model("CAMRY"), "Camry");
        assert_eq!(normalize_model("silverado"), "Silverado");
        assert_eq!(normalize_model(""), "");
    }
}
