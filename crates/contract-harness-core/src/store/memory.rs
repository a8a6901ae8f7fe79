//! In-memory repositories for tests and embedding in other hosts.
//!
//! One [`InMemoryContractStore`] implements all four repository traits over
//! `Vec`/`HashMap` state behind `std::sync::RwLock`, so cascading deletes
//! behave like the SQLite schema.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::models::{
    ClauseReference, ContractDocument, DocumentChunk, DocumentGroup, DocumentOverride,
    DocumentStatus, META_LAST_ERROR,
};

use super::{ChunkRepository, DocumentRepository, OverrideRepository, ReferenceRepository};

struct StoredEmbedding {
    chunk_id: String,
    document_id: String,
    model: String,
    content_hash: String,
    _vector: Vec<f32>,
}

#[derive(Default)]
struct State {
    documents: Vec<ContractDocument>,
    chunks: Vec<DocumentChunk>,
    references: Vec<ClauseReference>,
    overrides: Vec<DocumentOverride>,
    embeddings: Vec<StoredEmbedding>,
    sequences: HashMap<(String, DocumentGroup), u32>,
}

#[derive(Default)]
pub struct InMemoryContractStore {
    state: RwLock<State>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    /// Number of stored embeddings.
    pub fn embedding_count(&self) -> Result<usize> {
        Ok(self.read()?.embeddings.len())
    }
}

fn reference_key(r: &ClauseReference) -> (&str, Option<&str>, &str, &str) {
    (
        r.contract_id.as_str(),
        r.source_clause_number.as_deref(),
        r.target_clause_number.as_str(),
        r.source_document_id.as_str(),
    )
}

#[async_trait]
impl DocumentRepository for InMemoryContractStore {
    async fn register_document(&self, mut document: ContractDocument) -> Result<ContractDocument> {
        let mut state = self.write()?;
        if state.documents.iter().any(|d| d.id == document.id) {
            bail!("document {} already exists", document.id);
        }
        let key = (document.contract_id.clone(), document.group);
        let next = state.sequences.get(&key).copied().unwrap_or(0) + 1;
        state.sequences.insert(key, next);
        document.sequence_number = next;
        state.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: &str) -> Result<Option<ContractDocument>> {
        Ok(self.read()?.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, contract_id: &str) -> Result<Vec<ContractDocument>> {
        let mut docs: Vec<ContractDocument> = self
            .read()?
            .documents
            .iter()
            .filter(|d| d.contract_id == contract_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| {
            a.group
                .cmp(&b.group)
                .then(a.sequence_number.cmp(&b.sequence_number))
        });
        Ok(docs)
    }

    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut state = self.write()?;
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| anyhow!("document not found: {}", id))?;
        doc.status = status;
        match error {
            Some(message) => {
                doc.metadata
                    .insert(META_LAST_ERROR.to_string(), message.to_string());
            }
            None => {
                doc.metadata.remove(META_LAST_ERROR);
            }
        }
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.documents.len();
        state.documents.retain(|d| d.id != id);
        if state.documents.len() == before {
            return Ok(false);
        }
        state.chunks.retain(|c| c.document_id != id);
        state.embeddings.retain(|e| e.document_id != id);
        state.references.retain(|r| r.source_document_id != id);
        state
            .overrides
            .retain(|o| o.overriding_document_id != id && o.overridden_document_id != id);
        Ok(true)
    }

    async fn sequence_high_water(&self, contract_id: &str, group: DocumentGroup) -> Result<u32> {
        Ok(self
            .read()?
            .sequences
            .get(&(contract_id.to_string(), group))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl ChunkRepository for InMemoryContractStore {
    async fn replace_chunks(&self, document_id: &str, chunks: &[DocumentChunk]) -> Result<()> {
        let mut state = self.write()?;
        if !state.documents.iter().any(|d| d.id == document_id) {
            bail!("document not found: {}", document_id);
        }
        for chunk in chunks {
            if chunk.document_id != document_id {
                bail!("chunk {} belongs to another document", chunk.id);
            }
        }
        state.chunks.retain(|c| c.document_id != document_id);
        state.embeddings.retain(|e| e.document_id != document_id);
        state.chunks.extend(chunks.iter().cloned());
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut chunks: Vec<DocumentChunk> = self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn list_chunks(&self, contract_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut chunks: Vec<DocumentChunk> = self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.contract_id == contract_id)
            .cloned()
            .collect();
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(chunks)
    }

    async fn upsert_embedding(
        &self,
        chunk: &DocumentChunk,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        state.embeddings.retain(|e| e.chunk_id != chunk.id);
        state.embeddings.push(StoredEmbedding {
            chunk_id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            model: model.to_string(),
            content_hash: chunk.content_hash.clone(),
            _vector: vector.to_vec(),
        });
        Ok(())
    }

    async fn chunks_needing_embedding(
        &self,
        contract_id: &str,
        model: &str,
    ) -> Result<Vec<DocumentChunk>> {
        let state = self.read()?;
        Ok(state
            .chunks
            .iter()
            .filter(|c| c.contract_id == contract_id)
            .filter(|c| {
                !state.embeddings.iter().any(|e| {
                    e.chunk_id == c.id && e.model == model && e.content_hash == c.content_hash
                })
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReferenceRepository for InMemoryContractStore {
    async fn upsert_references(&self, references: &[ClauseReference]) -> Result<()> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        for r in references {
            match state
                .references
                .iter_mut()
                .find(|existing| reference_key(existing) == reference_key(r))
            {
                Some(existing) => *existing = r.clone(),
                None => state.references.push(r.clone()),
            }
        }
        Ok(())
    }

    async fn list_references(&self, contract_id: &str) -> Result<Vec<ClauseReference>> {
        Ok(self
            .read()?
            .references
            .iter()
            .filter(|r| r.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn clear_references(&self, contract_id: &str) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.references.len();
        state.references.retain(|r| r.contract_id != contract_id);
        Ok((before - state.references.len()) as u64)
    }
}

#[async_trait]
impl OverrideRepository for InMemoryContractStore {
    async fn insert_overrides(&self, overrides: &[DocumentOverride]) -> Result<()> {
        self.write()?.overrides.extend(overrides.iter().cloned());
        Ok(())
    }

    async fn list_overrides(&self, contract_id: &str) -> Result<Vec<DocumentOverride>> {
        Ok(self
            .read()?
            .overrides
            .iter()
            .filter(|o| o.contract_id == contract_id)
            .cloned()
            .collect())
    }

    async fn clear_overrides(&self, contract_id: &str) -> Result<u64> {
        let mut state = self.write()?;
        let before = state.overrides.len();
        state.overrides.retain(|o| o.contract_id != contract_id);
        Ok((before - state.overrides.len()) as u64)
    }
}
