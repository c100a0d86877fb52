//! Best-effort association between estimate files and nearby images.
//!
//! The filename heuristic is inherently ambiguous under similar names, so
//! it sits behind [`ImageAssociator`]; a stricter strategy (an explicit
//! manifest) can replace it without touching the coordinator.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ocr::SUPPORTED_FORMATS;

/// Classification of an associated image, derived from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Vin,
    Damage,
    Before,
    After,
    Supplement,
    Document,
}

impl ImageKind {
    /// Classify by file name. Damage photo is the default.
    pub fn classify(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains("vin") {
            ImageKind::Vin
        } else if name.contains("before") {
            ImageKind::Before
        } else if name.contains("after") {
            ImageKind::After
        } else if name.contains("supplement") {
            ImageKind::Supplement
        } else if name.ends_with(".pdf") {
            ImageKind::Document
        } else {
            ImageKind::Damage
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Vin => "vin",
            ImageKind::Damage => "damage",
            ImageKind::Before => "before",
            ImageKind::After => "after",
            ImageKind::Supplement => "supplement",
            ImageKind::Document => "document",
        }
    }
}

/// Strategy for finding image candidates next to a just-processed
/// estimate file.
pub trait ImageAssociator: Send + Sync {
    /// Image files considered associated with the estimate file.
    fn candidates_for(&self, estimate_path: &Path) -> Vec<PathBuf>;
}

/// Filename-based association: the image stem equals the estimate's stem,
/// or the stem plus a bounded numeric suffix (`_1` .. `_N`), with an
/// extension from the supported set matched case-insensitively.
#[derive(Debug, Clone)]
pub struct FileNameAssociator {
    max_suffix: u32,
}

impl FileNameAssociator {
    pub fn new(max_suffix: u32) -> Self {
        Self { max_suffix }
    }

    fn stem_matches(&self, base: &str, stem: &str) -> bool {
        if stem == base {
            return true;
        }
        stem.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|n| n.parse::<u32>().ok())
            .is_some_and(|n| n >= 1 && n <= self.max_suffix)
    }
}

impl Default for FileNameAssociator {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ImageAssociator for FileNameAssociator {
    fn candidates_for(&self, estimate_path: &Path) -> Vec<PathBuf> {
        let Some(base) = estimate_path.file_stem().and_then(|s| s.to_str()) else {
            return Vec::new();
        };
        let Some(dir) = estimate_path.parent() else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let extension_ok = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        SUPPORTED_FORMATS.iter().any(|s| ext.eq_ignore_ascii_case(s))
                    });
                let stem_ok = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| self.stem_matches(base, stem));
                extension_ok && stem_ok
            })
            .collect();

        matches.sort();
        debug!(
            estimate = %estimate_path.display(),
            count = matches.len(),
            "image candidates resolved"
        );
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_candidates_match_stem_and_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "EST-100.ems");
        touch(root, "EST-100.jpg");
        touch(root, "EST-100_1.png");
        touch(root, "EST-100_2.JPG");
        touch(root, "EST-100_11.jpg"); // beyond the suffix bound
        touch(root, "EST-100x.jpg"); // different stem
        touch(root, "EST-200.jpg"); // different estimate
        touch(root, "EST-100.txt"); // unsupported extension

        let associator = FileNameAssociator::default();
        let found = associator.candidates_for(&root.join("EST-100.ems"));
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["EST-100.jpg", "EST-100_1.png", "EST-100_2.JPG"]);
    }

    #[test]
    fn test_extension_matching_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(root, "EST-7.ems");
        touch(root, "EST-7.PDF");

        let found = FileNameAssociator::default().candidates_for(&root.join("EST-7.ems"));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_no_candidates_for_missing_dir() {
        let found =
            FileNameAssociator::default().candidates_for(Path::new("/nonexistent/EST-1.ems"));
        assert!(found.is_empty());
    }

    #[test]
    fn test_image_kind_classification() {
        assert_eq!(ImageKind::classify(Path::new("vin_plate.jpg")), ImageKind::Vin);
        assert_eq!(ImageKind::classify(Path::new("before_repair.png")), ImageKind::Before);
        assert_eq!(ImageKind::classify(Path::new("after_1.png")), ImageKind::After);
        assert_eq!(
            ImageKind::classify(Path::new("supplement_scan.jpg")),
            ImageKind::Supplement
        );
        assert_eq!(ImageKind::classify(Path::new("EST-100.pdf")), ImageKind::Document);
        assert_eq!(ImageKind::classify(Path::new("EST-100_1.jpg")), ImageKind::Damage);
    }
}
