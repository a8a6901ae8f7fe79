//! Structural integrity checks over one contract.
//!
//! The engine runs a fixed table of ten independent checks against a
//! [`ContractSnapshot`]. Each check returns a [`CheckResult`] with a stable
//! code, a severity and the offending items. Nothing is corrected: the
//! engine only reports.
//!
//! | # | code | severity |
//! |---|------|----------|
//! | 1 | `duplicate_clause_numbers` | error |
//! | 2 | `ocr_quality` | error above `ocr_error_limit`, else warning |
//! | 3 | `duplicate_content` | warning |
//! | 4 | `addendum_chronology` | error on ordering violations, else warning |
//! | 5 | `unlinked_conditions_overlap` | warning |
//! | 6 | `boq_structure` | warning |
//! | 7 | `unresolved_references` | error above `unresolved_error_limit`, else warning |
//! | 8 | `chunk_size` | error |
//! | 9 | `naming_convention` | warning |
//! | 10 | `addendum_conflicts` | warning |
//!
//! The result is valid when no error-severity check has items.

mod report;

pub use report::render_markdown;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::chunk::tabular_line_ratio;
use crate::clause::PREAMBLE_CLAUSE_NUMBER;
use crate::models::{ConditionsKind, ContentType, ContractDocument, DocumentGroup, DocumentStatus};
use crate::snapshot::ContractSnapshot;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub ocr_confidence_threshold: f64,
    pub ocr_error_limit: usize,
    pub unresolved_error_limit: usize,
    pub max_chunk_tokens: usize,
    /// Share of tabular-looking lines above which a BOQ text chunk is
    /// flagged.
    pub tabular_line_ratio: f64,
    pub large_file_bytes: u64,
    pub min_tokens_for_large_file: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            ocr_confidence_threshold: 0.8,
            ocr_error_limit: 5,
            unresolved_error_limit: 10,
            max_chunk_tokens: 2500,
            tabular_line_ratio: 0.3,
            large_file_bytes: 1_000_000,
            min_tokens_for_large_file: 100,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.ocr_confidence_threshold) {
            bail!("validation.ocr_confidence_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.tabular_line_ratio) {
            bail!("validation.tabular_line_ratio must be within [0, 1]");
        }
        if self.max_chunk_tokens == 0 {
            bail!("validation.max_chunk_tokens must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// One offending item found by a check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub message: String,
    pub document_id: Option<String>,
    pub chunk_id: Option<String>,
    pub clause_number: Option<String>,
    /// Other documents involved (duplicates, conflicts).
    pub related_document_ids: Vec<String>,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    fn document(mut self, id: &str) -> Self {
        self.document_id = Some(id.to_string());
        self
    }

    fn chunk(mut self, id: &str) -> Self {
        self.chunk_id = Some(id.to_string());
        self
    }

    fn clause(mut self, clause: &str) -> Self {
        self.clause_number = Some(clause.to_string());
        self
    }

    fn related(mut self, ids: Vec<String>) -> Self {
        self.related_document_ids = ids;
        self
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub code: &'static str,
    pub title: &'static str,
    pub severity: Severity,
    pub message: String,
    pub items: Vec<ValidationIssue>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub documents: usize,
    pub chunks: usize,
    pub references: usize,
    pub overrides: usize,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub error_items: usize,
    pub warning_items: usize,
}

/// Point-in-time report. Never persisted as authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub contract_id: String,
    pub is_valid: bool,
    /// Failing checks with error severity.
    pub errors: Vec<CheckResult>,
    /// Failing checks with warning severity.
    pub warnings: Vec<CheckResult>,
    /// Every check, passed or not, in table order.
    pub checks: Vec<CheckResult>,
    pub summary: ValidationSummary,
}

impl ValidationResult {
    pub fn check(&self, code: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.code == code)
    }
}

/// What a check function produces before it is labelled.
struct Outcome {
    severity: Severity,
    message: String,
    items: Vec<ValidationIssue>,
}

/// A named entry of the check table.
pub struct ValidationCheck {
    pub code: &'static str,
    pub title: &'static str,
    run: fn(&ContractSnapshot, &ValidationConfig) -> Outcome,
}

impl ValidationCheck {
    pub fn run(&self, snapshot: &ContractSnapshot, config: &ValidationConfig) -> CheckResult {
        let outcome = (self.run)(snapshot, config);
        CheckResult {
            code: self.code,
            title: self.title,
            severity: outcome.severity,
            message: outcome.message,
            items: outcome.items,
        }
    }
}

pub static VALIDATION_CHECKS: [ValidationCheck; 10] = [
    ValidationCheck {
        code: "duplicate_clause_numbers",
        title: "Duplicate clause numbers",
        run: check_duplicate_clauses,
    },
    ValidationCheck {
        code: "ocr_quality",
        title: "Low-confidence or OCR-suspect text",
        run: check_ocr_quality,
    },
    ValidationCheck {
        code: "duplicate_content",
        title: "Identical content across documents",
        run: check_duplicate_content,
    },
    ValidationCheck {
        code: "addendum_chronology",
        title: "Addendum chronology",
        run: check_addendum_chronology,
    },
    ValidationCheck {
        code: "unlinked_conditions_overlap",
        title: "General/Particular overlap without override",
        run: check_conditions_overlap,
    },
    ValidationCheck {
        code: "boq_structure",
        title: "Bill of Quantities structure",
        run: check_boq_structure,
    },
    ValidationCheck {
        code: "unresolved_references",
        title: "Unresolved references",
        run: check_unresolved_references,
    },
    ValidationCheck {
        code: "chunk_size",
        title: "Chunk size and extraction yield",
        run: check_chunk_size,
    },
    ValidationCheck {
        code: "naming_convention",
        title: "File naming and group assignment",
        run: check_naming_convention,
    },
    ValidationCheck {
        code: "addendum_conflicts",
        title: "Clauses modified by several addenda",
        run: check_addendum_conflicts,
    },
];

/// Runs the check table with one configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate(&self, snapshot: &ContractSnapshot) -> ValidationResult {
        let checks: Vec<CheckResult> = VALIDATION_CHECKS
            .iter()
            .map(|check| check.run(snapshot, &self.config))
            .collect();

        let failing = |severity: Severity| -> Vec<CheckResult> {
            checks
                .iter()
                .filter(|c| c.severity == severity && !c.passed())
                .cloned()
                .collect()
        };
        let errors = failing(Severity::Error);
        let warnings = failing(Severity::Warning);

        let summary = ValidationSummary {
            documents: snapshot.documents.len(),
            chunks: snapshot.chunks.len(),
            references: snapshot.references.len(),
            overrides: snapshot.overrides.len(),
            checks_run: checks.len(),
            checks_passed: checks.iter().filter(|c| c.passed()).count(),
            error_items: errors.iter().map(|c| c.items.len()).sum(),
            warning_items: warnings.iter().map(|c| c.items.len()).sum(),
        };

        ValidationResult {
            contract_id: snapshot.contract_id.clone(),
            is_valid: errors.is_empty(),
            errors,
            warnings,
            checks,
            summary,
        }
    }
}

fn outcome(severity: Severity, items: Vec<ValidationIssue>, what: &str) -> Outcome {
    let message = if items.is_empty() {
        format!("no {} found", what)
    } else {
        format!("{} {} found", items.len(), what)
    };
    Outcome {
        severity,
        message,
        items,
    }
}

fn document_name(snapshot: &ContractSnapshot, id: &str) -> String {
    snapshot
        .document(id)
        .map(|d| d.name.clone())
        .unwrap_or_else(|| id.to_string())
}

// 1
fn check_duplicate_clauses(snapshot: &ContractSnapshot, _: &ValidationConfig) -> Outcome {
    let mut counts: BTreeMap<(&str, String), usize> = BTreeMap::new();
    for chunk in &snapshot.chunks {
        // Continuation pieces of a split clause share its number.
        if chunk.clause_part() != 0 {
            continue;
        }
        if let Some(key) = chunk.normalized_clause() {
            *counts.entry((chunk.document_id.as_str(), key)).or_default() += 1;
        }
    }

    let items = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|((doc, clause), n)| {
            ValidationIssue::new(format!(
                "clause {} appears {} times in {}",
                clause,
                n,
                document_name(snapshot, doc)
            ))
            .document(doc)
            .clause(&clause)
        })
        .collect();
    outcome(Severity::Error, items, "duplicate clause numbers")
}

static OCR_SUSPECT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("replacement character", "\u{FFFD}"),
        ("letters and digits mixed in a word", r"\b[A-Za-z]+[0-9][A-Za-z]+\b"),
        ("letter inside a clause number", r"\b\d+[lIO]\.\d"),
        ("spaced-out letters", r"\b(?:[A-Za-z] ){4,}[A-Za-z]\b"),
        ("symbol noise", r"[~`^¬¦]{2,}"),
    ]
    .into_iter()
    .map(|(label, pattern)| (label, Regex::new(pattern).expect("ocr pattern")))
    .collect()
});

/// Label of the first OCR-mistake pattern matching `text`.
pub fn ocr_suspect_pattern(text: &str) -> Option<&'static str> {
    OCR_SUSPECT_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(label, _)| *label)
}

// 2
fn check_ocr_quality(snapshot: &ContractSnapshot, config: &ValidationConfig) -> Outcome {
    let mut items = Vec::new();
    for chunk in &snapshot.chunks {
        let reason = match chunk.extraction_confidence {
            Some(c) if c < config.ocr_confidence_threshold => {
                Some(format!("extraction confidence {:.2}", c))
            }
            _ => ocr_suspect_pattern(chunk.own_content()).map(str::to_string),
        };
        if let Some(reason) = reason {
            let mut issue = ValidationIssue::new(format!(
                "chunk {} of {}: {}",
                chunk.chunk_index,
                document_name(snapshot, &chunk.document_id),
                reason
            ))
            .document(&chunk.document_id)
            .chunk(&chunk.id);
            if let Some(clause) = &chunk.clause_number {
                issue = issue.clause(clause);
            }
            items.push(issue);
        }
    }
    let severity = if items.len() > config.ocr_error_limit {
        Severity::Error
    } else {
        Severity::Warning
    };
    outcome(severity, items, "OCR-suspect chunks")
}

// 3
fn check_duplicate_content(snapshot: &ContractSnapshot, _: &ValidationConfig) -> Outcome {
    let mut by_hash: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for chunk in &snapshot.chunks {
        if chunk.content.trim().is_empty() || chunk.content_hash.is_empty() {
            continue;
        }
        by_hash
            .entry(chunk.content_hash.as_str())
            .or_default()
            .insert(chunk.document_id.as_str());
    }

    let items = by_hash
        .into_iter()
        .filter(|(_, docs)| docs.len() > 1)
        .map(|(hash, docs)| {
            let names: Vec<String> = docs.iter().map(|d| document_name(snapshot, d)).collect();
            ValidationIssue::new(format!(
                "identical content ({}) in {}",
                &hash[..hash.len().min(12)],
                names.join(", ")
            ))
            .related(docs.iter().map(|d| d.to_string()).collect())
        })
        .collect();
    outcome(Severity::Warning, items, "duplicated chunks")
}

// 4
fn check_addendum_chronology(snapshot: &ContractSnapshot, _: &ValidationConfig) -> Outcome {
    let mut addenda: Vec<_> = snapshot
        .documents
        .iter()
        .filter(|d| d.group == DocumentGroup::Addendum)
        .collect();
    addenda.sort_by_key(|d| d.sequence_number);

    let mut items = Vec::new();
    let mut violation = false;
    let mut last_dated: Option<&ContractDocument> = None;
    for doc in addenda {
        let Some(date) = doc.effective_date else {
            items.push(
                ValidationIssue::new(format!(
                    "addendum {} ({}) has no effective date",
                    doc.sequence_number, doc.name
                ))
                .document(&doc.id),
            );
            continue;
        };
        if let Some(prev) = last_dated {
            if let Some(prev_date) = prev.effective_date {
                if date < prev_date {
                    violation = true;
                    items.push(
                        ValidationIssue::new(format!(
                            "addendum {} dated {} precedes addendum {} dated {}",
                            doc.sequence_number, date, prev.sequence_number, prev_date
                        ))
                        .document(&doc.id)
                        .related(vec![prev.id.clone()]),
                    );
                }
            }
        }
        last_dated = Some(doc);
    }

    let severity = if violation {
        Severity::Error
    } else {
        Severity::Warning
    };
    outcome(severity, items, "addendum chronology problems")
}

fn clause_keys(snapshot: &ContractSnapshot, document_id: &str) -> BTreeSet<String> {
    snapshot
        .chunks
        .iter()
        .filter(|c| c.document_id == document_id)
        .filter_map(|c| c.normalized_clause())
        .filter(|k| k != PREAMBLE_CLAUSE_NUMBER)
        .collect()
}

// 5
fn check_conditions_overlap(snapshot: &ContractSnapshot, _: &ValidationConfig) -> Outcome {
    let of_kind = |kind: ConditionsKind| -> Vec<_> {
        snapshot
            .documents
            .iter()
            .filter(|d| d.conditions_kind() == Some(kind))
            .collect()
    };
    let generals = of_kind(ConditionsKind::General);
    let particulars = of_kind(ConditionsKind::Particular);

    let mut items = Vec::new();
    for particular in &particulars {
        let p_clauses = clause_keys(snapshot, &particular.id);
        for general in &generals {
            let linked = snapshot.overrides.iter().any(|o| {
                (o.overriding_document_id == particular.id
                    && o.overridden_document_id == general.id)
                    || (o.overriding_document_id == general.id
                        && o.overridden_document_id == particular.id)
            });
            if linked {
                continue;
            }
            let shared: Vec<String> = clause_keys(snapshot, &general.id)
                .intersection(&p_clauses)
                .cloned()
                .collect();
            if shared.is_empty() {
                continue;
            }
            let shown: Vec<&str> = shared.iter().take(10).map(String::as_str).collect();
            let more = if shared.len() > shown.len() { ", ..." } else { "" };
            items.push(
                ValidationIssue::new(format!(
                    "{} and {} share {} clause(s) with no override link: {}{}",
                    particular.name,
                    general.name,
                    shared.len(),
                    shown.join(", "),
                    more
                ))
                .document(&particular.id)
                .related(vec![general.id.clone()]),
            );
        }
    }
    outcome(Severity::Warning, items, "unlinked General/Particular overlaps")
}

// 6
fn check_boq_structure(snapshot: &ContractSnapshot, config: &ValidationConfig) -> Outcome {
    let mut items = Vec::new();
    for doc in snapshot
        .documents
        .iter()
        .filter(|d| d.group == DocumentGroup::Boq)
    {
        let chunks = snapshot.chunks_for(&doc.id);
        if chunks.is_empty() {
            continue;
        }
        if !chunks.iter().any(|c| c.content_type == ContentType::Table) {
            items.push(
                ValidationIssue::new(format!("{} has no table chunks", doc.name)).document(&doc.id),
            );
        }
        for chunk in chunks
            .iter()
            .filter(|c| c.content_type == ContentType::Text)
        {
            let ratio = tabular_line_ratio(chunk.own_content());
            if ratio > config.tabular_line_ratio {
                items.push(
                    ValidationIssue::new(format!(
                        "chunk {} of {} is {:.0}% tabular lines but typed as text",
                        chunk.chunk_index,
                        doc.name,
                        ratio * 100.0
                    ))
                    .document(&doc.id)
                    .chunk(&chunk.id),
                );
            }
        }
    }
    outcome(Severity::Warning, items, "BOQ structure problems")
}

// 7
fn check_unresolved_references(snapshot: &ContractSnapshot, config: &ValidationConfig) -> Outcome {
    let items: Vec<ValidationIssue> = snapshot
        .references
        .iter()
        .filter(|r| !r.is_resolved)
        .map(|r| {
            ValidationIssue::new(format!(
                "\"{}\" in {} (clause {}) does not resolve to {} (confidence {:.2})",
                r.reference_text,
                document_name(snapshot, &r.source_document_id),
                r.source_clause_number.as_deref().unwrap_or("-"),
                r.target_clause_number,
                r.confidence
            ))
            .document(&r.source_document_id)
            .chunk(&r.source_chunk_id)
            .clause(&r.target_clause_number)
        })
        .collect();
    let severity = if items.len() > config.unresolved_error_limit {
        Severity::Error
    } else {
        Severity::Warning
    };
    outcome(severity, items, "unresolved references")
}

// 8
fn check_chunk_size(snapshot: &ContractSnapshot, config: &ValidationConfig) -> Outcome {
    let mut items = Vec::new();
    let mut tokens_by_doc: HashMap<&str, usize> = HashMap::new();
    for chunk in &snapshot.chunks {
        *tokens_by_doc.entry(chunk.document_id.as_str()).or_default() += chunk.token_count;
        if chunk.token_count > config.max_chunk_tokens {
            items.push(
                ValidationIssue::new(format!(
                    "chunk {} of {} has {} tokens (max {})",
                    chunk.chunk_index,
                    document_name(snapshot, &chunk.document_id),
                    chunk.token_count,
                    config.max_chunk_tokens
                ))
                .document(&chunk.document_id)
                .chunk(&chunk.id),
            );
        }
    }

    for doc in &snapshot.documents {
        if doc.status != DocumentStatus::Processed {
            continue;
        }
        let Some(bytes) = doc.file_size_bytes else {
            continue;
        };
        let tokens = tokens_by_doc.get(doc.id.as_str()).copied().unwrap_or(0);
        if bytes > config.large_file_bytes && tokens < config.min_tokens_for_large_file {
            items.push(
                ValidationIssue::new(format!(
                    "{} is {} bytes but yielded only {} tokens",
                    doc.name, bytes, tokens
                ))
                .document(&doc.id)
                .suggest("re-extract with OCR"),
            );
        }
    }
    outcome(Severity::Error, items, "chunk size problems")
}

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(AGR|LOA|COC|ADD|BOQ|SCH)(\d+)_([^.]+)\.([A-Za-z0-9]+)$").expect("file name regex")
});

/// Keyword phrases hinting at a document group, checked in order.
const GROUP_KEYWORDS: &[(DocumentGroup, &[&str])] = &[
    (
        DocumentGroup::Boq,
        &["boq", "bill of quantities", "bills of quantities", "priced bill"],
    ),
    (
        DocumentGroup::Schedule,
        &["appendix", "annex", "annexure", "schedule", "schedules"],
    ),
    (
        DocumentGroup::Addendum,
        &["addendum", "addenda", "corrigendum", "amendment"],
    ),
    (
        DocumentGroup::AcceptanceLetter,
        &["letter of acceptance", "acceptance letter", "loa"],
    ),
    (
        DocumentGroup::Conditions,
        &["conditions", "gcc", "pcc", "conditions of contract"],
    ),
    (DocumentGroup::Agreement, &["agreement", "contract agreement"]),
];

/// Groups whose keywords appear in `name`, in table order.
pub fn keyword_groups(name: &str) -> Vec<DocumentGroup> {
    let words: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "));
    GROUP_KEYWORDS
        .iter()
        .filter(|(_, phrases)| phrases.iter().any(|p| padded.contains(&format!(" {} ", p))))
        .map(|(group, _)| *group)
        .collect()
}

// 9
fn check_naming_convention(snapshot: &ContractSnapshot, _: &ValidationConfig) -> Outcome {
    let mut items = Vec::new();
    for doc in &snapshot.documents {
        let file_name = doc.display_file_name();
        match FILE_NAME_RE.captures(file_name) {
            None => items.push(
                ValidationIssue::new(format!(
                    "{} does not follow {{GROUP}}{{SEQ}}_{{Name}}.{{ext}}",
                    file_name
                ))
                .document(&doc.id)
                .suggest(format!(
                    "{}{}_{}",
                    doc.group.file_prefix(),
                    doc.sequence_number,
                    file_name
                )),
            ),
            Some(caps) => {
                let prefix_group = DocumentGroup::from_file_prefix(&caps[1]);
                if prefix_group != Some(doc.group) {
                    items.push(
                        ValidationIssue::new(format!(
                            "{} carries prefix {} but is filed under {}",
                            file_name,
                            &caps[1],
                            doc.group.label()
                        ))
                        .document(&doc.id)
                        .suggest(prefix_group.map(|g| g.as_str()).unwrap_or("rename")),
                    );
                }
            }
        }

        let hinted = keyword_groups(&format!("{} {}", doc.name, file_name));
        if let Some(suggested) = hinted.first() {
            if !hinted.contains(&doc.group) {
                items.push(
                    ValidationIssue::new(format!(
                        "{} is filed under {} but its name suggests {}",
                        file_name,
                        doc.group.label(),
                        suggested.label()
                    ))
                    .document(&doc.id)
                    .suggest(suggested.as_str()),
                );
            }
        }
    }
    outcome(Severity::Warning, items, "naming problems")
}

// 10
fn check_addendum_conflicts(snapshot: &ContractSnapshot, _: &ValidationConfig) -> Outcome {
    let mut docs_by_clause: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for chunk in &snapshot.chunks {
        let Some(doc) = snapshot.document(&chunk.document_id) else {
            continue;
        };
        if doc.group != DocumentGroup::Addendum {
            continue;
        }
        if let Some(key) = chunk.normalized_clause() {
            if key != PREAMBLE_CLAUSE_NUMBER {
                docs_by_clause
                    .entry(key)
                    .or_default()
                    .insert(doc.id.as_str());
            }
        }
    }

    let items = docs_by_clause
        .into_iter()
        .filter(|(_, docs)| docs.len() > 1)
        .map(|(clause, docs)| {
            let names: Vec<String> = docs.iter().map(|d| document_name(snapshot, d)).collect();
            ValidationIssue::new(format!(
                "clause {} is modified by {} addenda: {}",
                clause,
                docs.len(),
                names.join(", ")
            ))
            .clause(&clause)
            .related(docs.iter().map(|d| d.to_string()).collect())
        })
        .collect();
    outcome(Severity::Warning, items, "addendum conflicts")
}
