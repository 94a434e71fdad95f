//! Content fingerprints for duplicate detection.
//!
//! Two SHA-256 hashes are computed over a skill's fetched text files:
//! one over raw content and one over whitespace-normalized content. The
//! normalized variant catches low-effort copies that only reformat.

use sha2::{Digest, Sha256};

/// Both fingerprint variants for one skill's file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub full: String,
    pub normalized: String,
}

/// Collapse runs of whitespace to single spaces and trim line edges, so
/// reindented or re-wrapped copies hash identically.
fn normalize(content: &str) -> String {
    content
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hash the (path, content) pairs of every fetched text file. Files are
/// sorted by path first so traversal order never changes the hash.
pub fn compute(files: &[(String, String)]) -> Fingerprints {
    let mut sorted: Vec<&(String, String)> = files.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut full = Sha256::new();
    let mut normalized = Sha256::new();
    for (path, content) in sorted {
        full.update(path.as_bytes());
        full.update([0u8]);
        full.update(content.as_bytes());
        full.update([0u8]);

        normalized.update(path.as_bytes());
        normalized.update([0u8]);
        normalized.update(normalize(content).as_bytes());
        normalized.update([0u8]);
    }

    Fingerprints {
        full: format!("{:x}", full.finalize()),
        normalized: format!("{:x}", normalized.finalize()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independent() {
        let a = compute(&[
            ("SKILL.md".to_string(), "hello".to_string()),
            ("util.py".to_string(), "print(1)".to_string()),
        ]);
        let b = compute(&[
            ("util.py".to_string(), "print(1)".to_string()),
            ("SKILL.md".to_string(), "hello".to_string()),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalized_ignores_reformatting() {
        let original = compute(&[("SKILL.md".to_string(), "a  b\n\n  c d  ".to_string())]);
        let reformatted = compute(&[("SKILL.md".to_string(), "a b\nc d".to_string())]);
        assert_ne!(original.full, reformatted.full);
        assert_eq!(original.normalized, reformatted.normalized);
    }

    #[test]
    fn test_content_changes_both() {
        let a = compute(&[("SKILL.md".to_string(), "alpha".to_string())]);
        let b = compute(&[("SKILL.md".to_string(), "beta".to_string())]);
        assert_ne!(a.full, b.full);
        assert_ne!(a.normalized, b.normalized);
    }

    #[test]
    fn test_path_is_part_of_identity() {
        let a = compute(&[("a.md".to_string(), "same".to_string())]);
        let b = compute(&[("b.md".to_string(), "same".to_string())]);
        assert_ne!(a.full, b.full);
    }
}
