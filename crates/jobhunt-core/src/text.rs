//! Text normalization shared by connectors and the filter.

use crate::types::WorkMode;
use std::collections::HashSet;

/// Replace non-breaking spaces, collapse whitespace runs, and trim.
#[must_use]
pub fn clean_text(s: &str) -> String {
    s.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a raw location string.
///
/// Strips a leading `Location:`/`LOCATIONS:` label and drops repeated
/// comma-separated segments (case-insensitive, first spelling wins).
#[must_use]
pub fn normalize_location(loc: &str) -> String {
    let loc = clean_text(loc);
    if loc.is_empty() {
        return String::new();
    }

    let loc = loc
        .strip_prefix("Location:")
        .or_else(|| loc.strip_prefix("LOCATIONS:"))
        .unwrap_or(&loc)
        .trim();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in loc.split(',') {
        let part = clean_text(part);
        if part.is_empty() {
            continue;
        }
        if seen.insert(part.to_lowercase()) {
            out.push(part);
        }
    }
    out.join(", ")
}

/// Infer the work mode from location, title, and description text.
#[must_use]
pub fn infer_work_mode(location: &str, title: &str, description: &str) -> WorkMode {
    let blob = format!("{location} {title} {description}").to_lowercase();

    if blob.contains("remote") {
        WorkMode::Remote
    } else if blob.contains("hybrid") {
        WorkMode::Hybrid
    } else if blob.contains("on-site") || blob.contains("onsite") || blob.contains("on site") {
        WorkMode::Onsite
    } else {
        WorkMode::Unknown
    }
}

/// Anchor text like "View job" or "Apply now" is not a title.
#[must_use]
pub fn looks_like_junk_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.contains("view") || lower.contains("apply")
}

/// Pull the value after a `Location:` style label out of free text.
///
/// The value ends at the first line break, ` | ` or ` · ` and must be at
/// most 80 bytes once cleaned.
#[must_use]
pub fn extract_labeled_location(s: &str) -> Option<String> {
    // ASCII folding keeps byte offsets aligned with the original.
    let lower = s.to_ascii_lowercase();
    for label in ["location:", "locations:", "job location:"] {
        let Some(idx) = lower.find(label) else {
            continue;
        };
        let mut rest = s[idx + label.len()..].trim();
        for cut in ["\n", "\r", " | ", " · "] {
            if let Some(j) = rest.find(cut) {
                rest = &rest[..j];
            }
        }
        let rest = clean_text(rest);
        if !rest.is_empty() && rest.len() <= 80 {
            return Some(rest);
        }
    }
    None
}

/// Case-insensitive "any term is a substring of haystack".
///
/// Blank terms never match.
#[must_use]
pub fn contains_any_fold<S: AsRef<str>>(haystack: &str, terms: &[S]) -> bool {
    first_match_fold(haystack, terms).is_some()
}

/// First term (in list order) found in `haystack`, case-insensitively.
#[must_use]
pub fn first_match_fold<'a, S: AsRef<str>>(haystack: &str, terms: &'a [S]) -> Option<&'a str> {
    let hay = haystack.to_lowercase();
    terms.iter().map(AsRef::as_ref).find(|term| {
        let term = term.trim();
        !term.is_empty() && hay.contains(&term.to_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Senior\u{a0}Rust \n\t Engineer "), "Senior Rust Engineer");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_normalize_location_dedupes_segments() {
        assert_eq!(
            normalize_location("Location: Austin, TX, austin,  TX "),
            "Austin, TX"
        );
        assert_eq!(normalize_location("LOCATIONS: Remote, US"), "Remote, US");
        assert_eq!(normalize_location("   "), "");
    }

    #[test]
    fn test_infer_work_mode_precedence() {
        assert_eq!(infer_work_mode("Remote - US", "", ""), WorkMode::Remote);
        assert_eq!(infer_work_mode("NYC", "Engineer (Hybrid)", ""), WorkMode::Hybrid);
        assert_eq!(infer_work_mode("", "", "This role is on-site"), WorkMode::Onsite);
        assert_eq!(infer_work_mode("Hybrid or remote", "", ""), WorkMode::Remote);
        assert_eq!(infer_work_mode("Denver", "Engineer", ""), WorkMode::Unknown);
    }

    #[test]
    fn test_junk_title() {
        assert!(looks_like_junk_title("View job"));
        assert!(looks_like_junk_title("Apply now"));
        assert!(!looks_like_junk_title("Backend Engineer"));
    }

    #[test]
    fn test_extract_labeled_location() {
        assert_eq!(
            extract_labeled_location("Team: Core\nLocation: Berlin, Germany\nType: Full-time"),
            Some("Berlin, Germany".to_string())
        );
        assert_eq!(
            extract_labeled_location("Job Location: Remote | Apply"),
            Some("Remote".to_string())
        );
        assert_eq!(extract_labeled_location("no label here"), None);
    }

    #[test]
    fn test_first_match_fold() {
        let terms = vec!["  ".to_string(), "RUST".to_string(), "go".to_string()];
        assert_eq!(first_match_fold("Senior rust and Go dev", &terms), Some("RUST"));
        assert!(!contains_any_fold("python", &terms));
    }
}
