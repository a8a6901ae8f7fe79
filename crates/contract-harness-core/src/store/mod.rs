//! Repository interfaces for the four persisted entities.
//!
//! The core depends only on these traits. The application wires a SQLite
//! implementation; tests use [`memory::InMemoryContractStore`].
//!
//! | Trait | Entity |
//! |-------|--------|
//! | [`DocumentRepository`] | [`ContractDocument`] plus per-group sequence numbers |
//! | [`ChunkRepository`] | [`DocumentChunk`] plus chunk embeddings |
//! | [`ReferenceRepository`] | [`ClauseReference`] |
//! | [`OverrideRepository`] | [`DocumentOverride`] |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{
    ClauseReference, ContractDocument, DocumentChunk, DocumentGroup, DocumentOverride,
    DocumentStatus,
};
use crate::snapshot::ContractSnapshot;

/// Default number of records per batch write.
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Store a new document, assigning the next sequence number of its
    /// (contract, group). Numbers are never reused, even after deletion.
    async fn register_document(&self, document: ContractDocument) -> Result<ContractDocument>;

    async fn get_document(&self, id: &str) -> Result<Option<ContractDocument>>;

    /// Documents of one contract ordered by group then sequence number.
    async fn list_documents(&self, contract_id: &str) -> Result<Vec<ContractDocument>>;

    /// Update the lifecycle status. `error` is recorded in metadata when
    /// present and cleared otherwise.
    async fn update_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Delete a document together with its chunks, embeddings, the
    /// references it is the source of, and overrides naming it.
    ///
    /// Returns `false` when no such document exists.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Highest sequence number ever assigned for (contract, group).
    async fn sequence_high_water(&self, contract_id: &str, group: DocumentGroup) -> Result<u32>;
}

#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Replace every chunk of a document atomically.
    async fn replace_chunks(&self, document_id: &str, chunks: &[DocumentChunk]) -> Result<()>;

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<DocumentChunk>>;

    /// All chunks of a contract ordered by document then chunk index.
    async fn list_chunks(&self, contract_id: &str) -> Result<Vec<DocumentChunk>>;

    /// Store or update the embedding vector of a chunk.
    async fn upsert_embedding(
        &self,
        chunk: &DocumentChunk,
        vector: &[f32],
        model: &str,
    ) -> Result<()>;

    /// Chunks of a contract with no embedding for `model`, or whose
    /// embedding was computed from different content.
    async fn chunks_needing_embedding(
        &self,
        contract_id: &str,
        model: &str,
    ) -> Result<Vec<DocumentChunk>>;
}

#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    /// Insert or update references, keyed by (contract, source clause,
    /// target clause, source document).
    async fn upsert_references(&self, references: &[ClauseReference]) -> Result<()>;

    async fn list_references(&self, contract_id: &str) -> Result<Vec<ClauseReference>>;

    /// Remove every reference of a contract. Returns the number removed.
    async fn clear_references(&self, contract_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait OverrideRepository: Send + Sync {
    async fn insert_overrides(&self, overrides: &[DocumentOverride]) -> Result<()>;

    async fn list_overrides(&self, contract_id: &str) -> Result<Vec<DocumentOverride>>;

    /// Remove every override of a contract. Returns the number removed.
    async fn clear_overrides(&self, contract_id: &str) -> Result<u64>;
}

/// A backend implementing all four repositories.
pub trait ContractStore:
    DocumentRepository + ChunkRepository + ReferenceRepository + OverrideRepository
{
}

impl<T> ContractStore for T where
    T: DocumentRepository + ChunkRepository + ReferenceRepository + OverrideRepository
{
}

/// One injected handle per entity.
#[derive(Clone)]
pub struct Repositories {
    pub documents: Arc<dyn DocumentRepository>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub references: Arc<dyn ReferenceRepository>,
    pub overrides: Arc<dyn OverrideRepository>,
}

impl Repositories {
    /// Use one backend for all four entities.
    pub fn from_store<S: ContractStore + 'static>(store: Arc<S>) -> Self {
        Self {
            documents: store.clone(),
            chunks: store.clone(),
            references: store.clone(),
            overrides: store,
        }
    }

    /// Load everything known about one contract.
    pub async fn load_snapshot(&self, contract_id: &str) -> Result<ContractSnapshot> {
        Ok(ContractSnapshot {
            contract_id: contract_id.to_string(),
            documents: self.documents.list_documents(contract_id).await?,
            chunks: self.chunks.list_chunks(contract_id).await?,
            references: self.references.list_references(contract_id).await?,
            overrides: self.overrides.list_overrides(contract_id).await?,
        })
    }
}

/// A batch that failed to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub items: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchWriteReport {
    pub total_items: usize,
    pub batches: usize,
    pub written: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchWriteReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Write `items` in sequential batches of `batch_size`.
///
/// A failing batch is recorded with its index and error message; the
/// remaining batches are still attempted.
pub async fn write_in_batches<'a, T, F, Fut>(
    items: &'a [T],
    batch_size: usize,
    mut write: F,
) -> BatchWriteReport
where
    F: FnMut(usize, &'a [T]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut report = BatchWriteReport {
        total_items: items.len(),
        ..Default::default()
    };

    for (batch_index, batch) in items.chunks(batch_size.max(1)).enumerate() {
        report.batches += 1;
        match write(batch_index, batch).await {
            Ok(()) => report.written += batch.len(),
            Err(e) => report.failures.push(BatchFailure {
                batch_index,
                items: batch.len(),
                message: format!("{:#}", e),
            }),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_later_batches() {
        let items: Vec<u32> = (0..120).collect();
        let mut seen = Vec::new();
        let report = write_in_batches(&items, 50, |index, batch| {
            seen.push((index, batch.len()));
            async move {
                if index == 1 {
                    bail!("disk full");
                }
                Ok(())
            }
        })
        .await;

        assert_eq!(seen, vec![(0, 50), (1, 50), (2, 20)]);
        assert_eq!(report.batches, 3);
        assert_eq!(report.written, 70);
        assert_eq!(
            report.failures,
            vec![BatchFailure {
                batch_index: 1,
                items: 50,
                message: "disk full".into()
            }]
        );
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() {
        let report = write_in_batches::<u8, _, _>(&[], 50, |_, _| async { Ok(()) }).await;
        assert_eq!(report.batches, 0);
        assert!(report.is_complete());
    }
}
