//! Core data models used throughout Contract Harness.
//!
//! These types represent the contract documents, chunks, clause references
//! and override edges that flow through the ingestion pipeline. All types
//! are plain data: they carry no storage handles and can be freely cloned
//! between the pure analysis stages and the persistence layer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clause::normalize_clause_number;

/// Metadata key recording which piece of a split clause a chunk holds.
pub const META_CLAUSE_PART: &str = "clause_part";
/// Metadata key recording the byte length of the overlap prefix carried
/// over from the previous piece of the same clause.
pub const META_OVERLAP_BYTES: &str = "overlap_bytes";
/// Metadata key used to force the Particular/General classification of a
/// Conditions-of-Contract document.
pub const META_CONDITIONS_KIND: &str = "conditions_kind";
/// Metadata key holding the last processing error of a document.
pub const META_LAST_ERROR: &str = "last_error";
/// Metadata key holding the path the document was uploaded from.
pub const META_SOURCE_PATH: &str = "source_path";

/// The contractual group a document is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentGroup {
    Agreement,
    AcceptanceLetter,
    Conditions,
    Addendum,
    Boq,
    Schedule,
}

impl DocumentGroup {
    pub const ALL: [DocumentGroup; 6] = [
        DocumentGroup::Agreement,
        DocumentGroup::AcceptanceLetter,
        DocumentGroup::Conditions,
        DocumentGroup::Addendum,
        DocumentGroup::Boq,
        DocumentGroup::Schedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentGroup::Agreement => "agreement",
            DocumentGroup::AcceptanceLetter => "acceptance_letter",
            DocumentGroup::Conditions => "conditions",
            DocumentGroup::Addendum => "addendum",
            DocumentGroup::Boq => "boq",
            DocumentGroup::Schedule => "schedule",
        }
    }

    /// Human-readable label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentGroup::Agreement => "Agreement",
            DocumentGroup::AcceptanceLetter => "Acceptance Letter",
            DocumentGroup::Conditions => "Conditions of Contract",
            DocumentGroup::Addendum => "Addendum",
            DocumentGroup::Boq => "Bill of Quantities",
            DocumentGroup::Schedule => "Schedules",
        }
    }

    /// File-name prefix of the `{GROUP}{SEQ}_{Name}.{ext}` convention.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            DocumentGroup::Agreement => "AGR",
            DocumentGroup::AcceptanceLetter => "LOA",
            DocumentGroup::Conditions => "COC",
            DocumentGroup::Addendum => "ADD",
            DocumentGroup::Boq => "BOQ",
            DocumentGroup::Schedule => "SCH",
        }
    }

    pub fn from_file_prefix(prefix: &str) -> Option<Self> {
        let upper = prefix.to_ascii_uppercase();
        Self::ALL.into_iter().find(|g| g.file_prefix() == upper)
    }
}

impl fmt::Display for DocumentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentGroup {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Ok(match key.as_str() {
            "agreement" | "agr" => DocumentGroup::Agreement,
            "acceptance_letter" | "acceptance" | "letter_of_acceptance" | "loa" => {
                DocumentGroup::AcceptanceLetter
            }
            "conditions" | "conditions_of_contract" | "coc" => DocumentGroup::Conditions,
            "addendum" | "addenda" | "add" => DocumentGroup::Addendum,
            "boq" | "bill_of_quantities" => DocumentGroup::Boq,
            "schedule" | "schedules" | "sch" => DocumentGroup::Schedule,
            other => bail!(
                "Unknown document group: '{}'. Must be agreement, acceptance_letter, conditions, addendum, boq, or schedule.",
                other
            ),
        })
    }
}

/// Sub-classification of a Conditions-of-Contract document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionsKind {
    Particular,
    General,
}

/// Processing status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "pending" => DocumentStatus::Pending,
            "processing" => DocumentStatus::Processing,
            "processed" => DocumentStatus::Processed,
            "failed" => DocumentStatus::Failed,
            other => bail!("Unknown document status: '{}'", other),
        })
    }
}

/// A contract document as registered on upload.
///
/// Immutable after creation except for `status` and `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDocument {
    pub id: String,
    pub contract_id: String,
    pub group: DocumentGroup,
    pub name: String,
    pub file_name: Option<String>,
    /// Monotonic per (contract, group); never reused.
    pub sequence_number: u32,
    pub effective_date: Option<NaiveDate>,
    pub supersedes_document_id: Option<String>,
    pub status: DocumentStatus,
    pub file_size_bytes: Option<u64>,
    pub created_at: i64,
    pub metadata: BTreeMap<String, String>,
}

impl ContractDocument {
    pub fn new(
        contract_id: impl Into<String>,
        group: DocumentGroup,
        name: impl Into<String>,
        sequence_number: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            contract_id: contract_id.into(),
            group,
            name: name.into(),
            file_name: None,
            sequence_number,
            effective_date: None,
            supersedes_document_id: None,
            status: DocumentStatus::Pending,
            file_size_bytes: None,
            created_at: Utc::now().timestamp(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_effective_date(mut self, date: NaiveDate) -> Self {
        self.effective_date = Some(date);
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_supersedes(mut self, document_id: impl Into<String>) -> Self {
        self.supersedes_document_id = Some(document_id.into());
        self
    }

    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = Some(bytes);
        self
    }

    /// The name checked against the file-naming convention.
    pub fn display_file_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(&self.name)
    }

    /// Particular/General classification, only for the Conditions group.
    ///
    /// An explicit `conditions_kind` metadata entry wins; otherwise the
    /// document name is inspected and anything not marked particular (or
    /// special) is treated as General Conditions.
    pub fn conditions_kind(&self) -> Option<ConditionsKind> {
        if self.group != DocumentGroup::Conditions {
            return None;
        }
        if let Some(kind) = self.metadata.get(META_CONDITIONS_KIND) {
            match kind.to_ascii_lowercase().as_str() {
                "particular" => return Some(ConditionsKind::Particular),
                "general" => return Some(ConditionsKind::General),
                _ => {}
            }
        }
        let name = format!("{} {}", self.name, self.display_file_name()).to_lowercase();
        if name.contains("particular") || name.contains("special condition") {
            Some(ConditionsKind::Particular)
        } else {
            Some(ConditionsKind::General)
        }
    }
}

/// Kind of content held by a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Table,
    Form,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Table => "table",
            ContentType::Form => "form",
        }
    }
}

impl FromStr for ContentType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "text" => ContentType::Text,
            "table" => ContentType::Table,
            "form" => ContentType::Form,
            other => bail!("Unknown content type: '{}'", other),
        })
    }
}

/// A bounded unit of extracted text, associated with zero or one clause.
///
/// Chunks of a document are recreated wholesale on every processing pass;
/// `chunk_index` is unique and order-preserving within the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub contract_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub content_hash: String,
    pub content_type: ContentType,
    pub clause_number: Option<String>,
    pub clause_title: Option<String>,
    pub token_count: usize,
    /// Extraction (OCR) confidence of the source text, when known.
    pub extraction_confidence: Option<f64>,
    pub metadata: BTreeMap<String, String>,
}

impl DocumentChunk {
    pub fn normalized_clause(&self) -> Option<String> {
        self.clause_number
            .as_deref()
            .map(normalize_clause_number)
            .filter(|n| !n.is_empty())
    }

    /// Byte length of the overlap prefix repeated from the previous piece.
    pub fn overlap_bytes(&self) -> usize {
        self.metadata
            .get(META_OVERLAP_BYTES)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Zero for the first (or only) piece of a clause.
    pub fn clause_part(&self) -> usize {
        self.metadata
            .get(META_CLAUSE_PART)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// The chunk content without the injected overlap prefix.
    pub fn own_content(&self) -> &str {
        self.content
            .get(self.overlap_bytes()..)
            .unwrap_or(&self.content)
    }
}

/// How a detected citation relates to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Mentions,
    Overrides,
    Supplements,
    CrossReference,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Mentions => "mentions",
            ReferenceType::Overrides => "overrides",
            ReferenceType::Supplements => "supplements",
            ReferenceType::CrossReference => "cross_reference",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "mentions" => ReferenceType::Mentions,
            "overrides" => ReferenceType::Overrides,
            "supplements" => ReferenceType::Supplements,
            "cross_reference" => ReferenceType::CrossReference,
            other => bail!("Unknown reference type: '{}'", other),
        })
    }
}

/// A persisted citation from one chunk to a clause number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseReference {
    pub id: String,
    pub contract_id: String,
    pub source_clause_number: Option<String>,
    pub source_document_id: String,
    pub source_chunk_id: String,
    pub target_clause_number: String,
    pub reference_type: ReferenceType,
    pub reference_text: String,
    pub confidence: f64,
    pub is_resolved: bool,
}

/// Breadth of an override edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideType {
    Full,
    Partial,
    ClauseSpecific,
}

impl OverrideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideType::Full => "full",
            OverrideType::Partial => "partial",
            OverrideType::ClauseSpecific => "clause_specific",
        }
    }
}

impl FromStr for OverrideType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Ok(match s {
            "full" => OverrideType::Full,
            "partial" => OverrideType::Partial,
            "clause_specific" => OverrideType::ClauseSpecific,
            other => bail!("Unknown override type: '{}'", other),
        })
    }
}

/// A derived precedence edge between two documents of one contract.
///
/// Fully recomputable from the document set; edges are neither guaranteed
/// acyclic nor free of contradictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOverride {
    pub contract_id: String,
    pub overriding_document_id: String,
    pub overridden_document_id: String,
    pub override_scope: String,
    pub override_type: OverrideType,
    /// `None` or empty means contract-wide.
    pub affected_clauses: Option<Vec<String>>,
    pub reason: String,
    pub effective_date: Option<NaiveDate>,
}

impl DocumentOverride {
    /// Whether this edge applies to `clause_number`.
    pub fn covers_clause(&self, clause_number: &str) -> bool {
        if self.override_type == OverrideType::Full {
            return true;
        }
        match &self.affected_clauses {
            None => true,
            Some(list) if list.is_empty() => true,
            Some(list) => {
                let key = normalize_clause_number(clause_number);
                list.iter().any(|c| normalize_clause_number(c) == key)
            }
        }
    }
}
