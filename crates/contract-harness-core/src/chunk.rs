//! Clause-aware chunker.
//!
//! Turns extracted document text into [`DocumentChunk`]s that respect a
//! token budget while keeping clause structure intact:
//!
//! 1. [`parse_clauses`] splits the text into ordered clause units.
//! 2. Clauses within `max_tokens` become a single chunk.
//! 3. Oversized clauses are split on sentence boundaries by
//!    [`split_large_clause`]; every piece after the first starts with an
//!    overlap tail of trailing sentences from the previous piece.
//! 4. Pieces below `min_tokens` are merged back into the previous piece of
//!    the same clause when the result still fits the budget.
//! 5. Tabular rows (e.g. a BOQ spreadsheet) become `table` chunks.
//!
//! Token counts are estimated from character counts
//! ([`CHARS_PER_TOKEN`] characters ≈ 1 token) so results are reproducible.
//! Each chunk carries a SHA-256 hash of its normalized content for
//! duplicate detection.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clause::{parse_clauses, ParsedClause};
use crate::models::{
    ContentType, ContractDocument, DocumentChunk, META_CLAUSE_PART, META_OVERLAP_BYTES,
};
use crate::source::{ExtractedTable, ExtractedText};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Default floor below which a split piece is merged into its predecessor.
pub const DEFAULT_MIN_TOKENS: usize = 50;

/// Token budget for chunking.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingOptions {
    pub max_tokens: usize,
    #[serde(default)]
    pub overlap_tokens: usize,
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
}

fn default_min_tokens() -> usize {
    DEFAULT_MIN_TOKENS
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            overlap_tokens: 100,
            min_tokens: DEFAULT_MIN_TOKENS,
        }
    }
}

/// Estimated token count: `ceil(chars / CHARS_PER_TOKEN)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// One piece of a (possibly split) clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ClausePiece {
    pub content: String,
    /// Byte length of the overlap prefix repeated from the previous piece.
    pub overlap_bytes: usize,
    pub token_count: usize,
}

impl ClausePiece {
    /// The piece content without its overlap prefix.
    pub fn own_content(&self) -> &str {
        &self.content[self.overlap_bytes..]
    }
}

/// Split a clause that exceeds `max_tokens`, with sentence overlap.
///
/// Returns the clause unchanged as a single piece when it fits.
pub fn split_large_clause(
    clause: &ParsedClause,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<ClausePiece> {
    split_content(
        &clause.content,
        &ChunkingOptions {
            max_tokens,
            overlap_tokens,
            min_tokens: DEFAULT_MIN_TOKENS,
        },
    )
}

/// Split arbitrary clause text according to `options`.
///
/// Concatenating [`ClausePiece::own_content`] of the returned pieces yields
/// `content` exactly.
pub fn split_content(content: &str, options: &ChunkingOptions) -> Vec<ClausePiece> {
    let max_chars = options.max_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_budget = options.overlap_tokens * CHARS_PER_TOKEN;

    if content.chars().count() <= max_chars {
        return vec![ClausePiece {
            content: content.to_string(),
            overlap_bytes: 0,
            token_count: estimate_tokens(content),
        }];
    }

    let units: Vec<&str> = split_sentences(content)
        .into_iter()
        .flat_map(|s| hard_split(s, max_chars))
        .collect();

    let mut pieces: Vec<(String, Vec<&str>)> = Vec::new();
    let mut overlap = String::new();
    let mut own: Vec<&str> = Vec::new();
    let mut current_chars = 0usize;

    for unit in units {
        let unit_chars = unit.chars().count();
        if !own.is_empty() && current_chars + unit_chars > max_chars {
            let tail = overlap_tail(&own, overlap_budget, max_chars.saturating_sub(unit_chars));
            pieces.push((std::mem::take(&mut overlap), std::mem::take(&mut own)));
            current_chars = tail.chars().count();
            overlap = tail;
        }
        own.push(unit);
        current_chars += unit_chars;
    }
    if !own.is_empty() {
        pieces.push((overlap, own));
    }

    merge_undersized(pieces, options.min_tokens, max_chars)
}

/// Trailing units of `own` whose total stays within `budget` and `limit`.
fn overlap_tail(own: &[&str], budget: usize, limit: usize) -> String {
    let cap = budget.min(limit);
    let mut taken = 0usize;
    let mut start = own.len();
    for (i, unit) in own.iter().enumerate().rev() {
        let n = unit.chars().count();
        if taken + n > cap {
            break;
        }
        taken += n;
        start = i;
    }
    own[start..].concat()
}

fn merge_undersized(
    pieces: Vec<(String, Vec<&str>)>,
    min_tokens: usize,
    max_chars: usize,
) -> Vec<ClausePiece> {
    let mut out: Vec<ClausePiece> = Vec::with_capacity(pieces.len());
    for (overlap, own) in pieces {
        let own_text = own.concat();
        if let Some(prev) = out.last_mut() {
            let fits = prev.content.chars().count() + own_text.chars().count() <= max_chars;
            if estimate_tokens(&own_text) < min_tokens && fits {
                prev.content.push_str(&own_text);
                prev.token_count = estimate_tokens(&prev.content);
                continue;
            }
        }
        let overlap_bytes = overlap.len();
        let content = overlap + &own_text;
        out.push(ClausePiece {
            token_count: estimate_tokens(&content),
            content,
            overlap_bytes,
        });
    }
    out
}

/// Split text into sentence slices that concatenate back to `text`.
///
/// A sentence ends at a newline, or at `.`, `!` or `?` followed by
/// whitespace; the trailing whitespace stays with the sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i + 1),
            '.' | '!' | '?' => match chars.peek() {
                Some(&(_, next)) if next.is_whitespace() => {
                    let mut end = i + c.len_utf8();
                    while let Some(&(j, ws)) = chars.peek() {
                        if !ws.is_whitespace() {
                            break;
                        }
                        end = j + ws.len_utf8();
                        chars.next();
                        if ws == '\n' {
                            break;
                        }
                    }
                    Some(end)
                }
                _ => None,
            },
            _ => None,
        };
        if let Some(end) = end {
            out.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Break a unit longer than `max_chars` at whitespace (or hard at the
/// character limit when there is none).
fn hard_split(unit: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut remaining = unit;
    while remaining.chars().count() > max_chars {
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let split_at = remaining[..limit]
            .rfind(['\n', ' '])
            .filter(|&pos| pos > 0)
            .map(|pos| pos + 1)
            .unwrap_or(limit);
        out.push(&remaining[..split_at]);
        remaining = &remaining[split_at..];
    }
    if !remaining.is_empty() {
        out.push(remaining);
    }
    out
}

/// Stable duplicate-detection hash: SHA-256 over lowercased text with
/// whitespace runs collapsed.
pub fn content_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

static TABULAR_COLUMNS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S(?: {2,}|\t)\S").expect("column gap regex"));
static NUMERIC_CELL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)\d[\d,]*(?:\.\d+)?(?:\s|$)").expect("numeric cell regex")
});
static FORM_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)_{5,}|\.{8,}|^\s*(?i:form\s+of)\b").expect("form marker regex")
});

/// Whether a line looks like a table row: pipe/tab separated cells, or at
/// least two wide column gaps, or several numeric cells.
pub fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.matches('|').count() >= 2 || trimmed.matches('\t').count() >= 2 {
        return true;
    }
    if TABULAR_COLUMNS_RE.find_iter(trimmed).count() >= 2 {
        return true;
    }
    NUMERIC_CELL_RE.find_iter(trimmed).count() >= 3
}

/// Fraction of non-empty lines that look tabular.
pub fn tabular_line_ratio(text: &str) -> f64 {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return 0.0;
    }
    let tabular = lines.iter().filter(|l| is_tabular_line(l)).count();
    tabular as f64 / lines.len() as f64
}

/// Classify chunk text as table, form, or plain text.
pub fn classify_content(text: &str) -> ContentType {
    if tabular_line_ratio(text) > 0.5 {
        ContentType::Table
    } else if FORM_MARKER_RE.is_match(text) {
        ContentType::Form
    } else {
        ContentType::Text
    }
}

/// Chunk the extracted text and tables of one document.
///
/// Returns chunks with contiguous indices starting at 0: clause chunks in
/// document order first, then table chunks.
pub fn chunk_document(
    document: &ContractDocument,
    extracted: &ExtractedText,
    options: &ChunkingOptions,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();

    if !extracted.text.trim().is_empty() || extracted.tables.is_empty() {
        for clause in parse_clauses(&extracted.text) {
            if clause.content.trim().is_empty() && clause.is_preamble() {
                continue;
            }
            let pieces = split_content(&clause.content, options);
            for (part, piece) in pieces.into_iter().enumerate() {
                let mut metadata = BTreeMap::new();
                if part > 0 {
                    metadata.insert(META_CLAUSE_PART.to_string(), part.to_string());
                }
                if piece.overlap_bytes > 0 {
                    metadata.insert(
                        META_OVERLAP_BYTES.to_string(),
                        piece.overlap_bytes.to_string(),
                    );
                }
                let index = chunks.len() as i64;
                chunks.push(make_chunk(
                    document,
                    index,
                    piece.content,
                    classify_content(&clause.content),
                    Some(clause.clause_number.clone()),
                    clause.clause_title.clone(),
                    extracted.confidence,
                    metadata,
                ));
            }
        }
    }

    for table in &extracted.tables {
        for content in table_blocks(table, options.max_tokens * CHARS_PER_TOKEN) {
            let mut metadata = BTreeMap::new();
            if !table.name.is_empty() {
                metadata.insert("table".to_string(), table.name.clone());
            }
            let index = chunks.len() as i64;
            chunks.push(make_chunk(
                document,
                index,
                content,
                ContentType::Table,
                None,
                None,
                extracted.confidence,
                metadata,
            ));
        }
    }

    chunks
}

/// Render table rows (` | `-joined cells) and group them to the budget.
fn table_blocks(table: &ExtractedTable, max_chars: usize) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for row in &table.rows {
        let line = row
            .iter()
            .map(|c| c.trim())
            .collect::<Vec<_>>()
            .join(" | ");
        if line.replace('|', "").trim().is_empty() {
            continue;
        }
        if !current.is_empty() && current.chars().count() + 1 + line.chars().count() > max_chars {
            blocks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

#[allow(clippy::too_many_arguments)]
fn make_chunk(
    document: &ContractDocument,
    index: i64,
    content: String,
    content_type: ContentType,
    clause_number: Option<String>,
    clause_title: Option<String>,
    extraction_confidence: Option<f64>,
    metadata: BTreeMap<String, String>,
) -> DocumentChunk {
    DocumentChunk {
        id: Uuid::new_v4().to_string(),
        document_id: document.id.clone(),
        contract_id: document.contract_id.clone(),
        chunk_index: index,
        content_hash: content_hash(&content),
        token_count: estimate_tokens(&content),
        content,
        content_type,
        clause_number,
        clause_title,
        extraction_confidence,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentGroup;

    fn doc() -> ContractDocument {
        ContractDocument::new("contract-1", DocumentGroup::Conditions, "General Conditions", 1)
    }

    fn options(max_tokens: usize, overlap_tokens: usize) -> ChunkingOptions {
        ChunkingOptions {
            max_tokens,
            overlap_tokens,
            min_tokens: DEFAULT_MIN_TOKENS,
        }
    }

    /// 100 sentences of exactly 90 characters each (9,000 characters).
    fn long_clause() -> String {
        (0..100)
            .map(|i| format!("{:03} {}. ", i, "x".repeat(84)))
            .collect()
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_small_clause_unchanged() {
        let clause = parse_clauses("Clause 1 Definitions\nShort text.\n").remove(0);
        let pieces = split_large_clause(&clause, 2000, 100);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].content, clause.content);
        assert_eq!(pieces[0].overlap_bytes, 0);
    }

    #[test]
    fn test_split_with_overlap() {
        let text = long_clause();
        assert_eq!(text.chars().count(), 9000);
        let pieces = split_content(&text, &options(2000, 100));
        assert_eq!(pieces.len(), 2);

        let first = &pieces[0].content;
        let second = &pieces[1];
        assert!(first.chars().count() <= 8000);
        assert!(second.overlap_bytes > 300 && second.overlap_bytes <= 400);
        let tail = &first[first.len() - second.overlap_bytes..];
        assert!(second.content.starts_with(tail));
    }

    #[test]
    fn test_split_is_content_preserving() {
        let inputs = vec![
            long_clause(),
            "word ".repeat(5000),
            "a".repeat(20_000),
            "First line\nSecond line. Third sentence! Fourth?\n".repeat(300),
            "Ünïcödé sentence with accents. ".repeat(700),
        ];
        for text in inputs {
            for (max, overlap) in [(2000, 100), (100, 20), (50, 0), (10, 5)] {
                let pieces = split_content(&text, &options(max, overlap));
                let rebuilt: String = pieces.iter().map(|p| p.own_content()).collect();
                assert_eq!(rebuilt, text, "lost content at max={} overlap={}", max, overlap);
            }
        }
    }

    #[test]
    fn test_pieces_respect_budget() {
        let text = "Sentence number one is here. ".repeat(400);
        let pieces = split_content(&text, &options(100, 20));
        for p in &pieces {
            assert!(p.content.chars().count() <= 400, "piece too large: {}", p.content.len());
        }
    }

    #[test]
    fn test_undersized_tail_merges() {
        // 26 sentences of 40 chars; a 1,000-char budget leaves a short tail.
        let text: String = (0..26).map(|i| format!("{:02} {}. ", i, "y".repeat(35))).collect();
        let opts = ChunkingOptions {
            max_tokens: 250,
            overlap_tokens: 0,
            min_tokens: 50,
        };
        let pieces = split_content(&text, &opts);
        // 1,040 chars cannot fit one piece; the 40-char remainder would be
        // below the floor but merging would exceed the budget, so it stays.
        assert_eq!(pieces.len(), 2);

        let opts = ChunkingOptions {
            max_tokens: 250,
            overlap_tokens: 0,
            min_tokens: 0,
        };
        assert_eq!(split_content(&text, &opts).len(), 2);
    }

    #[test]
    fn test_merge_when_it_fits() {
        let pieces = vec![
            (String::new(), vec!["aaaa ", "bbbb "]),
            (String::new(), vec!["cc"]),
        ];
        let merged = merge_undersized(pieces, 5, 100);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "aaaa bbbb cc");
    }

    #[test]
    fn test_split_sentences_roundtrip() {
        let text = "One. Two!  Three?\nFour\n\nFive 14.1 stays";
        let sentences = split_sentences(text);
        assert_eq!(sentences.concat(), text);
        assert_eq!(sentences[0], "One. ");
        assert!(sentences.iter().any(|s| s.contains("14.1 stays")));
    }

    #[test]
    fn test_chunk_document_indices_and_clauses() {
        let text = "Preamble words.\nClause 1 Definitions\nTerms apply.\nClause 2 Scope\nThe works.\n";
        let chunks = chunk_document(&doc(), &ExtractedText::from_text(text), &ChunkingOptions::default());
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.contract_id, "contract-1");
        }
        assert_eq!(chunks[0].clause_number.as_deref(), Some("0"));
        assert_eq!(chunks[2].clause_title.as_deref(), Some("Scope"));
    }

    #[test]
    fn test_chunk_document_split_metadata() {
        let text = format!("Clause 7 Payment\n{}", long_clause());
        let chunks = chunk_document(&doc(), &ExtractedText::from_text(text.clone()), &options(2000, 100));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].clause_part(), 1);
        assert!(chunks[1].overlap_bytes() > 0);
        let rebuilt: String = chunks.iter().map(|c| c.own_content()).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_table_chunks() {
        let extracted = ExtractedText {
            tables: vec![ExtractedTable {
                name: "Bill 1".into(),
                rows: vec![
                    vec!["Item".into(), "Description".into(), "Qty".into()],
                    vec!["1.01".into(), "Excavation".into(), "120".into()],
                    vec!["".into(), "".into(), "".into()],
                ],
            }],
            ..Default::default()
        };
        let chunks = chunk_document(&doc(), &extracted, &ChunkingOptions::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content_type, ContentType::Table);
        assert_eq!(chunks[0].content, "Item | Description | Qty\n1.01 | Excavation | 120");
    }

    #[test]
    fn test_content_hash_normalized() {
        assert_eq!(content_hash("Hello   World\n"), content_hash("hello world"));
        assert_ne!(content_hash("hello world"), content_hash("hello worlds"));
    }

    #[test]
    fn test_classify_content() {
        assert_eq!(classify_content("Plain prose here."), ContentType::Text);
        assert_eq!(
            classify_content("Item | Desc | Rate\n1 | Concrete | 100\n2 | Steel | 200"),
            ContentType::Table
        );
        assert_eq!(
            classify_content("Signed by: ______________\nDate: ________"),
            ContentType::Form
        );
    }
}
