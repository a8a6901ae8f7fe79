//! A loaded, point-in-time view of one contract.
//!
//! The precedence and validation stages are pure functions over a
//! [`ContractSnapshot`]; loading it from a store is the caller's job.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{ClauseReference, ContractDocument, DocumentChunk, DocumentOverride};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContractSnapshot {
    pub contract_id: String,
    pub documents: Vec<ContractDocument>,
    pub chunks: Vec<DocumentChunk>,
    pub references: Vec<ClauseReference>,
    pub overrides: Vec<DocumentOverride>,
}

impl ContractSnapshot {
    pub fn new(contract_id: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            ..Default::default()
        }
    }

    pub fn document(&self, id: &str) -> Option<&ContractDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn documents_by_id(&self) -> HashMap<&str, &ContractDocument> {
        self.documents.iter().map(|d| (d.id.as_str(), d)).collect()
    }

    /// Chunks of one document in `chunk_index` order.
    pub fn chunks_for(&self, document_id: &str) -> Vec<&DocumentChunk> {
        let mut chunks: Vec<&DocumentChunk> = self
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    /// Chunks carrying `normalized` as clause number, in document then
    /// chunk order.
    pub fn chunks_for_clause(&self, normalized: &str) -> Vec<&DocumentChunk> {
        let mut chunks: Vec<&DocumentChunk> = self
            .chunks
            .iter()
            .filter(|c| c.normalized_clause().as_deref() == Some(normalized))
            .collect();
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        chunks
    }
}
