//! Cross-reference detection between clauses.
//!
//! A [`ReferenceDetector`] scans chunk text with an ordered table of
//! independent pattern families (explicit `Clause 14.1`, appendix/annex
//! and form/exhibit citations, signal-word citations such as
//! `pursuant to 5.1`, parenthetical `(see 2.3)` and bare `2A.1`). Every
//! family is evaluated over the full text; when two families claim the same
//! target span the higher-priority family wins, and within one text each
//! target is reported once (first occurrence).
//!
//! Each detection is classified by the vocabulary in a fixed-width window
//! around it and scored from its family's base confidence, boosted when the
//! target is a known clause and penalised when the target is a single
//! top-level number.

pub mod graph;

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clause::{clause_ancestors, normalize_clause_number};
use crate::models::{ClauseReference, ContractDocument, DocumentChunk, ReferenceType};

/// Family of a citation pattern, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternFamily {
    Explicit,
    Appendix,
    Form,
    Implicit,
    Parenthetical,
    BareNumeric,
}

impl PatternFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternFamily::Explicit => "explicit",
            PatternFamily::Appendix => "appendix",
            PatternFamily::Form => "form",
            PatternFamily::Implicit => "implicit",
            PatternFamily::Parenthetical => "parenthetical",
            PatternFamily::BareNumeric => "bare_numeric",
        }
    }

    /// Whether the family cites a numbered clause (as opposed to an
    /// appendix or form label).
    pub fn cites_clause(&self) -> bool {
        !matches!(self, PatternFamily::Appendix | PatternFamily::Form)
    }
}

/// Scoring and classification parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub explicit_confidence: f64,
    pub appendix_confidence: f64,
    pub form_confidence: f64,
    pub implicit_confidence: f64,
    pub parenthetical_confidence: f64,
    pub bare_numeric_confidence: f64,
    /// Added when the target is in the known-clause index (capped at 1.0).
    pub known_boost: f64,
    /// Multiplier for single-segment clause targets such as `"5"`.
    pub single_segment_penalty: f64,
    /// Minimum confidence for a known target to be stored as resolved.
    pub confidence_threshold: f64,
    /// Characters inspected on each side of a match for classification.
    pub context_window: usize,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            explicit_confidence: 0.95,
            appendix_confidence: 0.90,
            form_confidence: 0.90,
            implicit_confidence: 0.85,
            parenthetical_confidence: 0.80,
            bare_numeric_confidence: 0.60,
            known_boost: 0.10,
            single_segment_penalty: 0.8,
            confidence_threshold: 0.7,
            context_window: 50,
        }
    }
}

impl ReferenceConfig {
    pub fn base_confidence(&self, family: PatternFamily) -> f64 {
        match family {
            PatternFamily::Explicit => self.explicit_confidence,
            PatternFamily::Appendix => self.appendix_confidence,
            PatternFamily::Form => self.form_confidence,
            PatternFamily::Implicit => self.implicit_confidence,
            PatternFamily::Parenthetical => self.parenthetical_confidence,
            PatternFamily::BareNumeric => self.bare_numeric_confidence,
        }
    }
}

/// The set of clause numbers (and labels) present in a contract.
#[derive(Debug, Clone, Default)]
pub struct KnownClauseIndex {
    clauses: HashSet<String>,
}

impl KnownClauseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every clause number carried by `chunks`.
    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a DocumentChunk>) -> Self {
        let mut index = Self::new();
        for chunk in chunks {
            if let Some(number) = &chunk.clause_number {
                index.insert(number);
            }
        }
        index
    }

    /// Register appendix/schedule/form labels named by the documents
    /// themselves (e.g. a schedule filed as "Appendix D - Rates").
    pub fn add_document_labels(&mut self, documents: &[ContractDocument]) {
        for doc in documents {
            for name in [Some(doc.name.as_str()), doc.file_name.as_deref()]
                .into_iter()
                .flatten()
            {
                let spaced = name.replace(['_', '-'], " ");
                for caps in APPENDIX_RE.captures_iter(&spaced).chain(FORM_RE.captures_iter(&spaced)) {
                    if let Some((label, _)) = label_target(&caps) {
                        self.clauses.insert(label);
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, clause_number: &str) {
        let key = normalize_clause_number(clause_number);
        if !key.is_empty() {
            self.clauses.insert(key);
        }
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn contains_exact(&self, clause_number: &str) -> bool {
        self.clauses.contains(&normalize_clause_number(clause_number))
    }

    /// A target is known if it, or any ancestor prefix of it, is indexed.
    pub fn is_known(&self, clause_number: &str) -> bool {
        let key = normalize_clause_number(clause_number);
        self.clauses.contains(&key)
            || clause_ancestors(&key)
                .iter()
                .any(|prefix| self.clauses.contains(prefix))
    }
}

/// One citation found in a text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedReference {
    /// Normalized target key.
    pub target_clause: String,
    pub reference_text: String,
    pub reference_type: ReferenceType,
    /// Byte range of the full match within the scanned text.
    pub span: Range<usize>,
    pub confidence: f64,
    pub family: PatternFamily,
    pub known: bool,
}

const CLAUSE_NUMBER: &str = r"\d{1,3}[A-Za-z]?(?:\.\d{1,3}[A-Za-z]?)*";

static EXPLICIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:sub-?clauses?|clauses?|articles?|sections?|paragraphs?)\s+(?P<target>{})\b",
        CLAUSE_NUMBER
    ))
    .expect("explicit reference regex")
});

static IMPLICIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:as\s+per|pursuant\s+to|in\s+accordance\s+with|subject\s+to|referred\s+to\s+in|described\s+in|specified\s+in|set\s+out\s+in|under)\s+(?P<target>\d{1,3}[A-Za-z]?(?:\.\d{1,3}[A-Za-z]?)+)\b",
    )
    .expect("implicit reference regex")
});

static PARENTHETICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\(\s*(?:see|refer\s+to|ref\.?|cf\.?)\s+(?:(?:sub-?)?clause\s+)?(?P<target>{})\s*\)",
        CLAUSE_NUMBER
    ))
    .expect("parenthetical reference regex")
});

static BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<target>\d{1,3}[A-Z](?:\.\d{1,3})+|\d{1,3}(?:\.\d{1,3}){1,3})\b")
        .expect("bare reference regex")
});

static APPENDIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<kind>(?i:appendix|annexure|annex|schedule))\s+(?P<target>[A-Z]{1,2}\b|\d{1,2}\b)")
        .expect("appendix reference regex")
});

static FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<kind>(?i:form|exhibit))\s+(?:(?i:no)\.?\s*)?(?P<target>[A-Z]{1,2}\b|\d{1,2}\b)")
        .expect("form reference regex")
});

static OVERRIDE_VOCAB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:delet(?:e|ed|es|ing|ion)|replac(?:e|ed|es|ing|ement)|supersed(?:e|ed|es|ing)|notwithstanding|substitut(?:e|ed|es|ing)|amend(?:ed|s|ing|ment)?|in\s+lieu\s+of|shall\s+not\s+apply|void)\b",
    )
    .expect("override vocabulary regex")
});

static SUPPLEMENT_VOCAB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:add(?:ed|s|ing|ition)?|insert(?:ed|s|ing)?|supplement(?:ed|s|ing|ary)?|append(?:ed|s|ing)?|in\s+addition\s+to|further\s+to)\b",
    )
    .expect("supplement vocabulary regex")
});

/// A named citation pattern.
struct ReferencePattern {
    family: PatternFamily,
    regex: &'static LazyLock<Regex>,
    target: fn(&Captures) -> Option<(String, Range<usize>)>,
}

/// Citation patterns in priority order.
static REFERENCE_PATTERNS: [ReferencePattern; 6] = [
    ReferencePattern {
        family: PatternFamily::Explicit,
        regex: &EXPLICIT_RE,
        target: clause_target,
    },
    ReferencePattern {
        family: PatternFamily::Appendix,
        regex: &APPENDIX_RE,
        target: label_target,
    },
    ReferencePattern {
        family: PatternFamily::Form,
        regex: &FORM_RE,
        target: label_target,
    },
    ReferencePattern {
        family: PatternFamily::Implicit,
        regex: &IMPLICIT_RE,
        target: clause_target,
    },
    ReferencePattern {
        family: PatternFamily::Parenthetical,
        regex: &PARENTHETICAL_RE,
        target: clause_target,
    },
    ReferencePattern {
        family: PatternFamily::BareNumeric,
        regex: &BARE_RE,
        target: clause_target,
    },
];

fn clause_target(caps: &Captures) -> Option<(String, Range<usize>)> {
    let m = caps.name("target")?;
    Some((normalize_clause_number(m.as_str()), m.range()))
}

/// `"Appendix D"` → `"APPENDIX-D"`, `"Annexure 2"` → `"ANNEX-2"`.
fn label_target(caps: &Captures) -> Option<(String, Range<usize>)> {
    let kind = caps.name("kind")?.as_str().to_ascii_uppercase();
    let kind = match kind.as_str() {
        "ANNEXURE" => "ANNEX",
        other => other,
    };
    let m = caps.name("target")?;
    let label = format!("{}-{}", kind, m.as_str());
    Some((normalize_clause_number(&label), caps.get(0)?.range()))
}

/// Bare numbers that read as money, percentages, dates or decimals are
/// not citations.
fn bare_context_ok(text: &str, span: &Range<usize>) -> bool {
    let before = text[..span.start].chars().next_back();
    if matches!(before, Some(c) if c.is_alphanumeric() || "$£€,.".contains(c)) {
        return false;
    }
    let mut after = text[span.end..].chars();
    match after.next() {
        Some('%') => false,
        Some('.') | Some(',') => !matches!(after.next(), Some(c) if c.is_ascii_digit()),
        _ => true,
    }
}

/// Detects clause citations in chunk text.
pub struct ReferenceDetector {
    config: ReferenceConfig,
    index: KnownClauseIndex,
}

impl ReferenceDetector {
    pub fn new(config: ReferenceConfig, index: KnownClauseIndex) -> Self {
        Self { config, index }
    }

    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }

    /// Find citations in `text`, ordered by position.
    ///
    /// Targets equal to `source_clause` (after normalization) are dropped,
    /// and each target is reported once.
    pub fn detect_references(
        &self,
        text: &str,
        source_clause: Option<&str>,
    ) -> Vec<DetectedReference> {
        let source_key = source_clause.map(normalize_clause_number);

        let mut raw: Vec<(Range<usize>, PatternFamily, String, Range<usize>)> = Vec::new();
        for pattern in &REFERENCE_PATTERNS {
            for caps in pattern.regex.captures_iter(text) {
                let (Some(whole), Some((target, target_span))) = (caps.get(0), (pattern.target)(&caps))
                else {
                    continue;
                };
                if target.is_empty() {
                    continue;
                }
                if pattern.family == PatternFamily::BareNumeric && !bare_context_ok(text, &target_span) {
                    continue;
                }
                raw.push((target_span, pattern.family, target, whole.range()));
            }
        }
        raw.sort_by(|a, b| a.0.start.cmp(&b.0.start).then(a.1.cmp(&b.1)));

        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();

        for (target_span, family, target, span) in raw {
            if claimed
                .iter()
                .any(|c| c.start < target_span.end && target_span.start < c.end)
            {
                continue;
            }
            claimed.push(target_span);

            if source_key.as_deref() == Some(target.as_str()) {
                continue;
            }
            if !seen.insert(target.clone()) {
                continue;
            }

            let known = self.index.is_known(&target);
            out.push(DetectedReference {
                reference_type: self.classify(text, &span, family),
                confidence: self.score(family, &target, known),
                reference_text: text[span.clone()].to_string(),
                target_clause: target,
                span,
                family,
                known,
            });
        }

        out.sort_by_key(|r| r.span.start);
        out
    }

    fn classify(&self, text: &str, span: &Range<usize>, family: PatternFamily) -> ReferenceType {
        let window = context_window(text, span, self.config.context_window);
        if OVERRIDE_VOCAB_RE.is_match(window) {
            ReferenceType::Overrides
        } else if SUPPLEMENT_VOCAB_RE.is_match(window) {
            ReferenceType::Supplements
        } else if family.cites_clause() {
            ReferenceType::Mentions
        } else {
            ReferenceType::CrossReference
        }
    }

    fn score(&self, family: PatternFamily, target: &str, known: bool) -> f64 {
        let mut confidence = self.config.base_confidence(family);
        if known {
            confidence = (confidence + self.config.known_boost).min(1.0);
        }
        if family.cites_clause() && !target.contains('.') {
            confidence *= self.config.single_segment_penalty;
        }
        (confidence * 1000.0).round() / 1000.0
    }

    /// Whether a detection is persisted as a resolved link.
    pub fn resolves(&self, detected: &DetectedReference) -> bool {
        detected.known && detected.confidence >= self.config.confidence_threshold
    }
}

/// Up to `width` characters either side of `span`, on char boundaries.
fn context_window<'a>(text: &'a str, span: &Range<usize>, width: usize) -> &'a str {
    let start = match width {
        0 => span.start,
        _ => text[..span.start]
            .char_indices()
            .rev()
            .nth(width - 1)
            .map(|(i, _)| i)
            .unwrap_or(0),
    };
    let end = text[span.end..]
        .char_indices()
        .nth(width)
        .map(|(i, _)| span.end + i)
        .unwrap_or(text.len());
    &text[start..end]
}

/// Detect references across `chunks` and build persisted link records.
///
/// Detection runs on each chunk's own content (without split overlap).
/// Links are deduplicated by (source clause, target clause, source
/// document); the first occurrence in chunk order wins. Detections below
/// the threshold or with unknown targets are kept with `is_resolved =
/// false`.
pub fn build_clause_references(
    chunks: &[DocumentChunk],
    detector: &ReferenceDetector,
) -> Vec<ClauseReference> {
    let mut ordered: Vec<&DocumentChunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| {
        a.document_id
            .cmp(&b.document_id)
            .then(a.chunk_index.cmp(&b.chunk_index))
    });

    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut out = Vec::new();

    for chunk in ordered {
        let source = chunk.normalized_clause();
        for detected in detector.detect_references(chunk.own_content(), source.as_deref()) {
            let key = (
                source.clone().unwrap_or_default(),
                detected.target_clause.clone(),
                chunk.document_id.clone(),
            );
            if !seen.insert(key) {
                continue;
            }
            out.push(ClauseReference {
                id: Uuid::new_v4().to_string(),
                contract_id: chunk.contract_id.clone(),
                source_clause_number: source.clone(),
                source_document_id: chunk.document_id.clone(),
                source_chunk_id: chunk.id.clone(),
                is_resolved: detector.resolves(&detected),
                target_clause_number: detected.target_clause,
                reference_type: detected.reference_type,
                reference_text: detected.reference_text,
                confidence: detected.confidence,
            });
        }
    }
    out
}

/// Recompute `is_resolved` against a (possibly changed) index.
///
/// Returns the number of references whose flag changed.
pub fn refresh_resolution(
    references: &mut [ClauseReference],
    index: &KnownClauseIndex,
    threshold: f64,
) -> usize {
    let mut changed = 0;
    for r in references.iter_mut() {
        let resolved = index.is_known(&r.target_clause_number) && r.confidence >= threshold;
        if resolved != r.is_resolved {
            r.is_resolved = resolved;
            changed += 1;
        }
    }
    changed
}

/// Count references per target clause.
pub fn target_counts(references: &[ClauseReference]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for r in references {
        *counts
            .entry(normalize_clause_number(&r.target_clause_number))
            .or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, DocumentGroup};
    use std::collections::BTreeMap;

    fn detector_with(known: &[&str]) -> ReferenceDetector {
        let mut index = KnownClauseIndex::new();
        for k in known {
            index.insert(k);
        }
        ReferenceDetector::new(ReferenceConfig::default(), index)
    }

    fn chunk(doc: &str, index: i64, clause: &str, content: &str) -> DocumentChunk {
        DocumentChunk {
            id: format!("{}-{}", doc, index),
            document_id: doc.to_string(),
            contract_id: "c1".to_string(),
            chunk_index: index,
            content: content.to_string(),
            content_hash: String::new(),
            content_type: ContentType::Text,
            clause_number: Some(clause.to_string()),
            clause_title: None,
            token_count: 0,
            extraction_confidence: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_explicit_reference() {
        let d = detector_with(&[]);
        let refs = d.detect_references("The Contractor shall comply with Clause 14.1 at all times.", None);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_clause, "14.1");
        assert_eq!(refs[0].family, PatternFamily::Explicit);
        assert_eq!(refs[0].reference_type, ReferenceType::Mentions);
        assert!((refs[0].confidence - 0.95).abs() < 1e-9);
        assert_eq!(refs[0].reference_text, "Clause 14.1");
    }

    #[test]
    fn test_no_self_reference() {
        let d = detector_with(&["1.6"]);
        let text = "As stated in Clause 1.6 and (see 1.6) and as per 01.6, refer to Clause 2.1.";
        let refs = d.detect_references(text, Some("1.6"));
        assert!(refs.iter().all(|r| r.target_clause != "1.6"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_clause, "2.1");
    }

    #[test]
    fn test_families_and_order() {
        let d = detector_with(&[]);
        let text = "Payment as per 2.3 (see 4.2) under Sub-Clause 8.1 per Appendix D using Form B and item 2A.1.";
        let refs = d.detect_references(text, None);
        let targets: Vec<&str> = refs.iter().map(|r| r.target_clause.as_str()).collect();
        assert_eq!(targets, vec!["2.3", "4.2", "8.1", "APPENDIX-D", "FORM-B", "2A.1"]);
        let families: Vec<PatternFamily> = refs.iter().map(|r| r.family).collect();
        assert_eq!(
            families,
            vec![
                PatternFamily::Implicit,
                PatternFamily::Parenthetical,
                PatternFamily::Explicit,
                PatternFamily::Appendix,
                PatternFamily::Form,
                PatternFamily::BareNumeric,
            ]
        );
        assert_eq!(refs[3].reference_type, ReferenceType::CrossReference);
        for pair in refs.windows(2) {
            assert!(pair[0].span.start < pair[1].span.start);
        }
    }

    #[test]
    fn test_duplicates_first_wins() {
        let d = detector_with(&[]);
        let refs = d.detect_references("Clause 3.1 applies. Again Clause 03.1 applies.", None);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].span.start, 0);
    }

    #[test]
    fn test_classification_window() {
        let d = detector_with(&[]);
        let refs = d.detect_references("Sub-Clause 4.2 is deleted and replaced by the following.", None);
        assert_eq!(refs[0].reference_type, ReferenceType::Overrides);

        let refs = d.detect_references("Insert the following at the end of Clause 6.3.", None);
        assert_eq!(refs[0].reference_type, ReferenceType::Supplements);

        let far = format!("Clause 6.3 applies.{}deleted", " ".repeat(80));
        let refs = d.detect_references(&far, None);
        assert_eq!(refs[0].reference_type, ReferenceType::Mentions);
    }

    #[test]
    fn test_confidence_boost_and_penalty() {
        let d = detector_with(&["2.3", "5"]);
        let refs = d.detect_references("Clause 2.3 and Clause 5 and Clause 9.9 and Clause 7", None);
        let by_target: HashMap<&str, f64> =
            refs.iter().map(|r| (r.target_clause.as_str(), r.confidence)).collect();
        assert!((by_target["2.3"] - 1.0).abs() < 1e-9);
        assert!((by_target["5"] - 0.8).abs() < 1e-9);
        assert!((by_target["9.9"] - 0.95).abs() < 1e-9);
        assert!((by_target["7"] - 0.76).abs() < 1e-9);
    }

    #[test]
    fn test_bare_numbers_filtered() {
        let d = detector_with(&[]);
        let refs = d.detect_references("Pay $1.50 or 12.5% on 12.05.2024 for 1,234.56 units.", None);
        assert!(refs.is_empty(), "unexpected: {:?}", refs);
    }

    #[test]
    fn test_known_index_ancestors() {
        let mut index = KnownClauseIndex::new();
        index.insert("2");
        assert!(index.is_known("2.3.1"));
        assert!(index.is_known(" 02.3 "));
        assert!(!index.is_known("3.1"));
        assert!(!index.contains_exact("2.3"));
    }

    #[test]
    fn test_document_labels_indexed() {
        let doc = ContractDocument::new("c1", DocumentGroup::Schedule, "Appendix D - Rates", 1);
        let mut index = KnownClauseIndex::new();
        index.add_document_labels(&[doc]);
        assert!(index.is_known("APPENDIX-D"));
    }

    #[test]
    fn test_build_references_dedup_and_resolution() {
        let chunks = vec![
            chunk("docA", 0, "1.1", "See Clause 2.1. Also Clause 2.1 again."),
            chunk("docA", 1, "1.1", "Continuation citing Clause 2.1 and Clause 9.9."),
            chunk("docA", 2, "2.1", "Body of 2.1 cites Clause 1.1."),
            chunk("docB", 0, "1.1", "Other document cites Clause 2.1."),
        ];
        let index = KnownClauseIndex::from_chunks(&chunks);
        let detector = ReferenceDetector::new(ReferenceConfig::default(), index);
        let refs = build_clause_references(&chunks, &detector);

        let keys: Vec<(String, &str, &str)> = refs
            .iter()
            .map(|r| {
                (
                    r.source_clause_number.clone().unwrap_or_default(),
                    r.target_clause_number.as_str(),
                    r.source_document_id.as_str(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("1.1".to_string(), "2.1", "docA"),
                ("1.1".to_string(), "9.9", "docA"),
                ("2.1".to_string(), "1.1", "docA"),
                ("1.1".to_string(), "2.1", "docB"),
            ]
        );
        assert!(refs[0].is_resolved);
        assert!(!refs[1].is_resolved);
    }

    #[test]
    fn test_refresh_resolution() {
        let chunks = vec![chunk("docA", 0, "1", "Refer to Clause 4.4 for details.")];
        let detector = ReferenceDetector::new(ReferenceConfig::default(), KnownClauseIndex::from_chunks(&chunks));
        let mut refs = build_clause_references(&chunks, &detector);
        assert!(!refs[0].is_resolved);

        let mut index = KnownClauseIndex::from_chunks(&chunks);
        index.insert("4");
        assert_eq!(refresh_resolution(&mut refs, &index, 0.7), 1);
        assert!(refs[0].is_resolved);
        assert_eq!(refresh_resolution(&mut refs, &index, 0.7), 0);
    }

    #[test]
    fn test_context_window_unicode() {
        let text = "ééééé Clause 1.2 ééééé";
        let span = 11..21;
        assert_eq!(&text[span.clone()], "Clause 1.2");
        let w = context_window(text, &span, 3);
        assert_eq!(w, "éé Clause 1.2 éé");
        assert_eq!(context_window(text, &span, 0), "Clause 1.2");
    }
}
