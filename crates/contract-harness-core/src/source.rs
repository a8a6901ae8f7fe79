//! Text extraction abstraction.
//!
//! A [`TextSource`] turns a registered [`ContractDocument`] into raw text
//! and/or tabular rows. Concrete sources (local files, an OCR service) live
//! in the application crate; the core only consumes [`ExtractedText`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::ContractDocument;

/// A named table of rows, e.g. one spreadsheet sheet of a Bill of Quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTable {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

/// Output of a [`TextSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    /// Full running text, pages joined with newlines.
    pub text: String,
    /// Per-page text, when the source knows page boundaries.
    pub pages: Vec<String>,
    pub tables: Vec<ExtractedTable>,
    /// Mean extraction (OCR) confidence in `[0, 1]`, when reported.
    pub confidence: Option<f64>,
}

impl ExtractedText {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tables.iter().all(|t| t.rows.is_empty())
    }
}

/// A storage/extraction service that yields the text of a document.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Short identifier used in logs (e.g. `"file"`, `"ocr"`).
    fn name(&self) -> &str;

    async fn extract(&self, document: &ContractDocument) -> Result<ExtractedText>;
}
