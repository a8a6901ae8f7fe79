//! Clause boundary detection.
//!
//! Splits raw contract text into ordered [`ParsedClause`] units. Each line
//! is offered to an ordered table of named [`BoundaryMatcher`]s; the first
//! matcher that recognises the line as a clause heading opens a new clause,
//! and every other line is continuation text of the currently open clause.
//!
//! Text before the first heading becomes a synthetic `Preamble` clause
//! numbered `"0"`. Clause spans are contiguous and cover the whole input,
//! so no text is ever dropped.
//!
//! # Example
//!
//! ```rust
//! use contract_harness_core::clause::parse_clauses;
//!
//! let clauses = parse_clauses("Clause 1 Definitions\nWords.\nClause 2 Scope\nMore words.\n");
//! assert_eq!(clauses.len(), 2);
//! assert_eq!(clauses[1].clause_number, "2");
//! assert_eq!(clauses[1].clause_title.as_deref(), Some("Scope"));
//! ```

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Clause number given to text preceding the first detected heading.
pub const PREAMBLE_CLAUSE_NUMBER: &str = "0";
/// Title given to the synthetic preamble clause.
pub const PREAMBLE_TITLE: &str = "Preamble";

const MAX_TITLE_CHARS: usize = 150;

/// Canonical key for a clause number.
///
/// Removes all whitespace, uppercases, drops empty and trailing segments and
/// strips leading zeros from each dotted segment (`" 02.03 "` → `"2.3"`,
/// `"2a.01"` → `"2A.1"`). The function is idempotent.
pub fn normalize_clause_number(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    compact
        .split('.')
        .filter(|seg| !seg.is_empty())
        .map(strip_leading_zeros)
        .collect::<Vec<_>>()
        .join(".")
}

fn strip_leading_zeros(segment: &str) -> String {
    let stripped = segment.trim_start_matches('0');
    let starts_with_digit = stripped.starts_with(|c: char| c.is_ascii_digit());
    if segment.starts_with('0') && !starts_with_digit {
        format!("0{}", stripped)
    } else {
        stripped.to_string()
    }
}

/// Ancestor prefixes of a normalized clause number, nearest first
/// (`"2.3.1"` → `["2.3", "2"]`).
pub fn clause_ancestors(normalized: &str) -> Vec<String> {
    let segments: Vec<&str> = normalized.split('.').collect();
    (1..segments.len())
        .rev()
        .map(|n| segments[..n].join("."))
        .collect()
}

/// A clause unit produced by [`parse_clauses`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedClause {
    /// Normalized clause number (`"0"` for the preamble).
    pub clause_number: String,
    pub clause_title: Option<String>,
    /// Verbatim text of the clause, heading line included.
    pub content: String,
    /// Byte range of `content` within the parsed text.
    pub span: Range<usize>,
}

impl ParsedClause {
    pub fn is_preamble(&self) -> bool {
        self.clause_number == PREAMBLE_CLAUSE_NUMBER
    }
}

/// A heading recognised by a [`BoundaryMatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    pub clause_number: String,
    pub clause_title: Option<String>,
}

/// A named heading recogniser. Matchers are evaluated in table order and the
/// first match wins.
pub struct BoundaryMatcher {
    pub name: &'static str,
    matcher: fn(&str) -> Option<Boundary>,
}

impl BoundaryMatcher {
    pub fn try_match(&self, line: &str) -> Option<Boundary> {
        (self.matcher)(line)
    }
}

/// Heading matchers in priority order.
pub static BOUNDARY_MATCHERS: [BoundaryMatcher; 3] = [
    BoundaryMatcher {
        name: "explicit_keyword",
        matcher: match_explicit_keyword,
    },
    BoundaryMatcher {
        name: "numbered_heading",
        matcher: match_numbered_heading,
    },
    BoundaryMatcher {
        name: "alphanumeric",
        matcher: match_alphanumeric,
    },
];

static EXPLICIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i:sub-?clause|clause|article|section)\s+(\d{1,3}[A-Za-z]?(?:\.\d{1,3}[A-Za-z]?)*)\.?(?:\s*[-–—:.]?\s+(.+?))?\s*$",
    )
    .expect("explicit heading regex")
});

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}(?:\.\d{1,3})*)\.?\s+([A-Z][^\r\n]*?)\s*$").expect("numbered heading regex")
});

static ALPHANUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,3}[A-Z](?:\.\d{1,3})+)\.?(?:\s*[-–—:]?\s+(.+?))?\s*$")
        .expect("alphanumeric heading regex")
});

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Words that continue a sentence wrapped onto a line starting with a
/// citation.
const CONNECTIVES: [&str; 17] = [
    "and", "or", "of", "to", "is", "are", "shall", "will", "may", "must", "which", "that", "with",
    "by", "as", "applies", "apply",
];

fn clean_title(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().take(MAX_TITLE_CHARS).collect())
}

/// Whether the text after a clause number reads as a heading title
/// rather than running prose or a date.
fn reads_as_title(title: &str) -> bool {
    if title.chars().count() > MAX_TITLE_CHARS || title.ends_with([',', ';']) {
        return false;
    }
    let first_word = title
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches([',', '.', ':'])
        .to_lowercase();
    if MONTHS.contains(&first_word.as_str()) || CONNECTIVES.contains(&first_word.as_str()) {
        return false;
    }
    !title.starts_with(|c: char| c.is_lowercase())
}

fn match_explicit_keyword(line: &str) -> Option<Boundary> {
    let caps = EXPLICIT_RE.captures(line.trim())?;
    let title = caps.get(2).map(|m| m.as_str());
    if title.is_some_and(|t| !reads_as_title(t)) {
        return None;
    }
    Some(Boundary {
        clause_number: normalize_clause_number(caps.get(1)?.as_str()),
        clause_title: clean_title(title),
    })
}

fn match_numbered_heading(line: &str) -> Option<Boundary> {
    let caps = NUMBERED_RE.captures(line.trim())?;
    let title = caps.get(2)?.as_str();
    if !reads_as_title(title) {
        return None;
    }

    Some(Boundary {
        clause_number: normalize_clause_number(caps.get(1)?.as_str()),
        clause_title: clean_title(Some(title)),
    })
}

fn match_alphanumeric(line: &str) -> Option<Boundary> {
    let caps = ALPHANUMERIC_RE.captures(line.trim())?;
    let title = caps.get(2).map(|m| m.as_str());
    if title.is_some_and(|t| !reads_as_title(t)) {
        return None;
    }
    Some(Boundary {
        clause_number: normalize_clause_number(caps.get(1)?.as_str()),
        clause_title: clean_title(title),
    })
}

/// Run the matcher table over one line, returning the winning matcher's
/// name with its boundary.
pub fn detect_boundary(line: &str) -> Option<(&'static str, Boundary)> {
    BOUNDARY_MATCHERS
        .iter()
        .find_map(|m| m.try_match(line).map(|b| (m.name, b)))
}

/// Parse text into ordered clauses.
///
/// Guarantees:
/// - at least one clause is returned (a single preamble for text without
///   headings, including empty text);
/// - spans are contiguous, in document order, and cover the whole input;
/// - whitespace-only text before the first heading is folded into the first
///   clause instead of producing an empty preamble.
pub fn parse_clauses(text: &str) -> Vec<ParsedClause> {
    let mut clauses = Vec::new();
    let mut open: Option<(Boundary, usize)> = None;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        if let Some((_, boundary)) = detect_boundary(line) {
            match open.take() {
                Some((prev, start)) => clauses.push(make_clause(text, prev, start..offset)),
                None if offset > 0 && !text[..offset].trim().is_empty() => {
                    clauses.push(preamble(text, 0..offset));
                }
                None => {}
            }
            let start = if clauses.is_empty() { 0 } else { offset };
            open = Some((boundary, start));
        }
        offset += line.len();
    }

    match open {
        Some((boundary, start)) => clauses.push(make_clause(text, boundary, start..text.len())),
        None => clauses.push(preamble(text, 0..text.len())),
    }

    clauses
}

fn make_clause(text: &str, boundary: Boundary, span: Range<usize>) -> ParsedClause {
    ParsedClause {
        clause_number: boundary.clause_number,
        clause_title: boundary.clause_title,
        content: text[span.clone()].to_string(),
        span,
    }
}

fn preamble(text: &str, span: Range<usize>) -> ParsedClause {
    ParsedClause {
        clause_number: PREAMBLE_CLAUSE_NUMBER.to_string(),
        clause_title: Some(PREAMBLE_TITLE.to_string()),
        content: text[span.clone()].to_string(),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_clause_number(" 14.1 "), "14.1");
        assert_eq!(normalize_clause_number("02.03"), "2.3");
        assert_eq!(normalize_clause_number("2a.01"), "2A.1");
        assert_eq!(normalize_clause_number("14.1."), "14.1");
        assert_eq!(normalize_clause_number("0"), "0");
        assert_eq!(normalize_clause_number("00"), "0");
        assert_eq!(normalize_clause_number("1 . 2"), "1.2");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "14.1", " 02.03 ", "2a.01", "0A", "00.1", "..3..", "Appendix D", "x", "", "10.0.0",
        ];
        for raw in inputs {
            let once = normalize_clause_number(raw);
            assert_eq!(normalize_clause_number(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(clause_ancestors("2.3.1"), vec!["2.3", "2"]);
        assert!(clause_ancestors("5").is_empty());
    }

    #[test]
    fn test_matcher_priority() {
        let (name, b) = detect_boundary("Sub-Clause 14.1 Payment").unwrap();
        assert_eq!(name, "explicit_keyword");
        assert_eq!(b.clause_number, "14.1");
        assert_eq!(b.clause_title.as_deref(), Some("Payment"));

        let (name, b) = detect_boundary("9.1  Contractor's Obligations\n").unwrap();
        assert_eq!(name, "numbered_heading");
        assert_eq!(b.clause_number, "9.1");

        let (name, b) = detect_boundary("2A.1 - Scope of Works").unwrap();
        assert_eq!(name, "alphanumeric");
        assert_eq!(b.clause_number, "2A.1");
        assert_eq!(b.clause_title.as_deref(), Some("Scope of Works"));
    }

    #[test]
    fn test_non_headings() {
        assert!(detect_boundary("the contractor shall comply with the law").is_none());
        assert!(detect_boundary("10 June 2024").is_none());
        assert!(detect_boundary("3 units, 4 metres, and similar,").is_none());
        assert!(detect_boundary("").is_none());
    }

    #[test]
    fn test_wrapped_citations_are_not_headings() {
        let text = "Clause 14 Payment\nThe Employer shall pay in accordance with\nSub-Clause 14.1 and the Contractor shall invoice monthly, subject to\nClause 14 of these conditions being satisfied.\n";
        let clauses = parse_clauses(text);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].clause_number, "14");
        assert_eq!(clauses[0].clause_title.as_deref(), Some("Payment"));
        assert!(clauses[0].content.contains("being satisfied."));

        assert!(detect_boundary("Clause 7 shall apply to the Works").is_none());
        assert!(detect_boundary("Clause 7 Variations, Adjustments,").is_none());
        assert!(detect_boundary("Clause 7").is_some());
        assert!(detect_boundary("2A.1 applies only to provisional sums").is_none());
    }

    #[test]
    fn test_no_boundaries_single_clause() {
        let text = "This agreement is made between the parties.\nIt has no numbering.";
        let clauses = parse_clauses(text);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].clause_number, PREAMBLE_CLAUSE_NUMBER);
        assert_eq!(clauses[0].content, text);
        assert_eq!(clauses[0].span, 0..text.len());
    }

    #[test]
    fn test_empty_text() {
        let clauses = parse_clauses("");
        assert_eq!(clauses.len(), 1);
        assert!(clauses[0].content.is_empty());
    }

    #[test]
    fn test_preamble_and_order() {
        let text = "CONTRACT FOR WORKS\nBetween A and B\nClause 1 Definitions\nTerms.\n1.1 Employer\nMeans the employer.\nClause 2 Scope\nThe works.\n";
        let clauses = parse_clauses(text);
        let numbers: Vec<&str> = clauses.iter().map(|c| c.clause_number.as_str()).collect();
        assert_eq!(numbers, vec!["0", "1", "1.1", "2"]);
        assert_eq!(clauses[0].clause_title.as_deref(), Some(PREAMBLE_TITLE));
        assert!(clauses[2].content.contains("Means the employer."));

        let rebuilt: String = clauses.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(rebuilt, text);
        for pair in clauses.windows(2) {
            assert_eq!(pair[0].span.end, pair[1].span.start);
        }
    }

    #[test]
    fn test_blank_lead_folds_into_first_clause() {
        let text = "\n\nClause 1 Definitions\nTerms.\n";
        let clauses = parse_clauses(text);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].clause_number, "1");
        assert_eq!(clauses[0].span, 0..text.len());
    }

    #[test]
    fn test_malformed_lines_are_continuation() {
        let text = "Clause 4 Insurance\n@@## garbled ~~ line\n   \nClause 5 Claims\n";
        let clauses = parse_clauses(text);
        assert_eq!(clauses.len(), 2);
        assert!(clauses[0].content.contains("garbled"));
    }
}
