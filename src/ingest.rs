//! Ingestion pipeline orchestration.
//!
//! [`IngestionOrchestrator`] is the composition root of the engine: it owns
//! the repositories, the embedding provider and every tuning section of the
//! configuration, and exposes two entry points:
//!
//! - [`IngestionOrchestrator::process_document`]: parse and chunk one
//!   document, tracking its lifecycle status.
//! - [`IngestionOrchestrator::run`]: the contract-wide stages, in fixed
//!   order: references → overrides → embeddings → validation.
//!
//! A failing stage is recorded in the [`PipelineReport`] and the remaining
//! stages still run.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use contract_harness_core::chunk::{chunk_document, ChunkingOptions};
use contract_harness_core::embedding::EmbeddingProvider;
use contract_harness_core::models::{ContractDocument, DocumentChunk, DocumentStatus};
use contract_harness_core::priority::{
    determine_override_relationships, find_contradictions, scope_overrides_to_clauses,
    EffectiveClause, PriorityResolver, PriorityWeights,
};
use contract_harness_core::references::graph::ReferenceGraph;
use contract_harness_core::references::{
    build_clause_references, refresh_resolution, KnownClauseIndex, ReferenceConfig,
    ReferenceDetector,
};
use contract_harness_core::source::{ExtractedText, TextSource};
use contract_harness_core::store::{
    write_in_batches, BatchFailure, BatchWriteReport, Repositories, DEFAULT_BATCH_SIZE,
};
use contract_harness_core::validation::{ValidationConfig, ValidationEngine, ValidationResult};

use crate::config::Config;
use crate::embedding::embed_with_retry;
use crate::retry::RetryPolicy;

/// Contract-wide pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    References,
    Overrides,
    Embeddings,
    Validation,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::References,
        Stage::Overrides,
        Stage::Embeddings,
        Stage::Validation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::References => "references",
            Stage::Overrides => "overrides",
            Stage::Embeddings => "embeddings",
            Stage::Validation => "validation",
        }
    }
}

/// Which stages [`IngestionOrchestrator::run`] attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageToggles {
    pub references: bool,
    pub overrides: bool,
    pub embeddings: bool,
    pub validation: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            references: true,
            overrides: true,
            embeddings: false,
            validation: true,
        }
    }
}

impl StageToggles {
    pub fn enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::References => self.references,
            Stage::Overrides => self.overrides,
            Stage::Embeddings => self.embeddings,
            Stage::Validation => self.validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub status: StageStatus,
    pub message: String,
    /// Records produced or written by the stage.
    pub items: usize,
    pub failures: Vec<BatchFailure>,
}

impl StageResult {
    fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            message: "disabled".to_string(),
            items: 0,
            failures: Vec::new(),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: StageStatus::Failed,
            message,
            items: 0,
            failures: Vec::new(),
        }
    }

    /// Succeeded when every batch was written, failed otherwise.
    fn from_batches(items: usize, message: String, failures: Vec<BatchFailure>) -> Self {
        let status = if failures.is_empty() {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };
        Self {
            status,
            message,
            items,
            failures,
        }
    }
}

/// Outcome of [`IngestionOrchestrator::run`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub contract_id: String,
    pub stages: BTreeMap<Stage, StageResult>,
    /// True when every attempted stage succeeded.
    pub success: bool,
    pub validation: Option<ValidationResult>,
}

impl PipelineReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.get(&stage)
    }
}

/// Runs document processing and the contract-wide stages against injected
/// repositories.
pub struct IngestionOrchestrator {
    repos: Repositories,
    chunking: ChunkingOptions,
    references: ReferenceConfig,
    resolver: PriorityResolver,
    validator: ValidationEngine,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    embed_policy: RetryPolicy,
    embed_batch_size: usize,
    batch_size: usize,
}

impl IngestionOrchestrator {
    /// Orchestrator with default tuning and no embedding provider.
    pub fn new(repos: Repositories) -> Self {
        Self {
            repos,
            chunking: ChunkingOptions::default(),
            references: ReferenceConfig::default(),
            resolver: PriorityResolver::new(PriorityWeights::default()),
            validator: ValidationEngine::new(ValidationConfig::default()),
            embedder: None,
            embed_policy: RetryPolicy::new(30, 1000),
            embed_batch_size: DEFAULT_BATCH_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn from_config(
        config: &Config,
        repos: Repositories,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Self {
        Self {
            repos,
            chunking: config.chunking.clone(),
            references: config.references.clone(),
            resolver: PriorityResolver::new(config.priority.clone()),
            validator: ValidationEngine::new(config.validation.clone()),
            embedder,
            embed_policy: RetryPolicy::new(
                config.embedding.timeout_secs,
                config.embedding.retry_backoff_ms,
            ),
            embed_batch_size: config.embedding.batch_size,
            batch_size: config.pipeline.batch_size,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        self.embedder = Some(embedder);
        self.embed_policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.embed_batch_size = batch_size.max(1);
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn resolver(&self) -> &PriorityResolver {
        &self.resolver
    }

    // ============ Documents ============

    pub async fn register_document(&self, document: ContractDocument) -> Result<ContractDocument> {
        if let Some(superseded) = &document.supersedes_document_id {
            match self.repos.documents.get_document(superseded).await? {
                Some(other) if other.contract_id == document.contract_id => {}
                Some(_) => bail!("document {} belongs to another contract", superseded),
                None => bail!("superseded document not found: {}", superseded),
            }
        }
        let document = self.repos.documents.register_document(document).await?;
        info!(
            document = %document.id,
            group = document.group.as_str(),
            sequence = document.sequence_number,
            "registered document"
        );
        Ok(document)
    }

    /// Chunk one document and replace its stored chunks.
    ///
    /// The document moves to `processing`, then `processed`; any failure
    /// marks it `failed` with the error kept in its metadata and is
    /// returned.
    pub async fn process_document(
        &self,
        document: &ContractDocument,
        extracted: &ExtractedText,
    ) -> Result<Vec<DocumentChunk>> {
        self.repos
            .documents
            .update_status(&document.id, DocumentStatus::Processing, None)
            .await?;

        let chunks = chunk_document(document, extracted, &self.chunking);
        match self.repos.chunks.replace_chunks(&document.id, &chunks).await {
            Ok(()) => {
                self.repos
                    .documents
                    .update_status(&document.id, DocumentStatus::Processed, None)
                    .await?;
                info!(document = %document.id, chunks = chunks.len(), "document processed");
                self.refresh_after_change(&document.contract_id).await;
                Ok(chunks)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.mark_failed(&document.id, &message).await;
                Err(e.context(format!("Failed to store chunks of {}", document.id)))
            }
        }
    }

    /// Register, extract and process one document.
    ///
    /// The registered document is returned as stored after processing.
    pub async fn ingest(
        &self,
        document: ContractDocument,
        source: &dyn TextSource,
    ) -> Result<ContractDocument> {
        let document = self.register_document(document).await?;

        let extracted = match source.extract(&document).await {
            Ok(extracted) => extracted,
            Err(e) => {
                let message = format!("{:#}", e);
                self.mark_failed(&document.id, &message).await;
                return Err(e.context(format!(
                    "{} extraction failed for {}",
                    source.name(),
                    document.id
                )));
            }
        };
        if extracted.is_empty() {
            warn!(document = %document.id, source = source.name(), "no text extracted");
        }

        self.process_document(&document, &extracted).await?;
        self.repos
            .documents
            .get_document(&document.id)
            .await?
            .ok_or_else(|| anyhow!("document vanished during processing: {}", document.id))
    }

    async fn mark_failed(&self, document_id: &str, message: &str) {
        warn!(document = document_id, error = message, "document failed");
        if let Err(e) = self
            .repos
            .documents
            .update_status(document_id, DocumentStatus::Failed, Some(message))
            .await
        {
            warn!(document = document_id, error = %e, "could not record failure");
        }
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<bool> {
        let Some(document) = self.repos.documents.get_document(document_id).await? else {
            return Ok(false);
        };
        let deleted = self.repos.documents.delete_document(document_id).await?;
        if deleted {
            self.refresh_after_change(&document.contract_id).await;
        }
        Ok(deleted)
    }

    /// Re-check stored references against the current clause index and
    /// store the ones whose resolution changed. Returns how many changed.
    pub async fn refresh_references(&self, contract_id: &str) -> Result<usize> {
        let documents = self.repos.documents.list_documents(contract_id).await?;
        let chunks = self.repos.chunks.list_chunks(contract_id).await?;
        let mut index = KnownClauseIndex::from_chunks(&chunks);
        index.add_document_labels(&documents);

        let mut stored = self.repos.references.list_references(contract_id).await?;
        let before: Vec<bool> = stored.iter().map(|r| r.is_resolved).collect();
        let changed = refresh_resolution(&mut stored, &index, self.references.confidence_threshold);
        if changed == 0 {
            return Ok(0);
        }

        let updated: Vec<_> = stored
            .into_iter()
            .zip(before)
            .filter(|(r, was)| r.is_resolved != *was)
            .map(|(r, _)| r)
            .collect();
        self.repos
            .references
            .upsert_references(&updated)
            .await
            .context("Failed to refresh reference resolution")?;
        debug!(contract = contract_id, changed, "refreshed reference resolution");
        Ok(changed)
    }

    // Chunks are already stored at this point; a stale flag is logged, not fatal.
    async fn refresh_after_change(&self, contract_id: &str) {
        if let Err(e) = self.refresh_references(contract_id).await {
            warn!(contract = contract_id, error = %e, "could not refresh references");
        }
    }

    // ============ Contract-wide stages ============

    /// Run the enabled stages for one contract.
    pub async fn run(&self, contract_id: &str, toggles: StageToggles) -> PipelineReport {
        let mut stages = BTreeMap::new();
        let mut validation = None;

        for stage in Stage::ALL {
            if !toggles.enabled(stage) {
                stages.insert(stage, StageResult::skipped());
                continue;
            }
            debug!(contract = contract_id, stage = stage.as_str(), "stage start");
            let outcome = match stage {
                Stage::References => self.run_references(contract_id).await,
                Stage::Overrides => self.run_overrides(contract_id).await,
                Stage::Embeddings => self.run_embeddings(contract_id).await,
                Stage::Validation => match self.validate(contract_id).await {
                    Ok(result) => {
                        let message = format!(
                            "{} ({} error items, {} warning items)",
                            if result.is_valid { "valid" } else { "invalid" },
                            result.summary.error_items,
                            result.summary.warning_items
                        );
                        let items = result.summary.checks_run;
                        validation = Some(result);
                        Ok(StageResult::from_batches(items, message, Vec::new()))
                    }
                    Err(e) => Err(e),
                },
            };
            let result = outcome.unwrap_or_else(|e| StageResult::failed(format!("{:#}", e)));
            match result.status {
                StageStatus::Failed => warn!(
                    contract = contract_id,
                    stage = stage.as_str(),
                    error = %result.message,
                    "stage failed"
                ),
                _ => info!(
                    contract = contract_id,
                    stage = stage.as_str(),
                    items = result.items,
                    "stage complete"
                ),
            }
            stages.insert(stage, result);
        }

        let success = stages
            .values()
            .all(|r| r.status != StageStatus::Failed);
        PipelineReport {
            contract_id: contract_id.to_string(),
            stages,
            success,
            validation,
        }
    }

    async fn run_references(&self, contract_id: &str) -> Result<StageResult> {
        let documents = self.repos.documents.list_documents(contract_id).await?;
        let chunks = self.repos.chunks.list_chunks(contract_id).await?;

        let mut index = KnownClauseIndex::from_chunks(&chunks);
        index.add_document_labels(&documents);
        let detector = ReferenceDetector::new(self.references.clone(), index);
        let references = build_clause_references(&chunks, &detector);

        let cleared = self.repos.references.clear_references(contract_id).await?;
        debug!(contract = contract_id, cleared, "cleared references");

        let repo = &self.repos.references;
        let report = write_in_batches(&references, self.batch_size, |_, batch| {
            repo.upsert_references(batch)
        })
        .await;

        let resolved = references.iter().filter(|r| r.is_resolved).count();
        let message = format!(
            "{} references ({} resolved) in {} batches",
            report.written,
            resolved,
            report.batches
        );
        Ok(StageResult::from_batches(report.written, message, report.failures))
    }

    async fn run_overrides(&self, contract_id: &str) -> Result<StageResult> {
        let documents = self.repos.documents.list_documents(contract_id).await?;
        let chunks = self.repos.chunks.list_chunks(contract_id).await?;

        let overrides = scope_overrides_to_clauses(determine_override_relationships(&documents), &chunks);
        let contradictions = find_contradictions(&overrides);
        for (a, b) in &contradictions {
            warn!(contract = contract_id, a = %a, b = %b, "documents override each other");
        }

        self.repos.overrides.clear_overrides(contract_id).await?;
        let repo = &self.repos.overrides;
        let report = write_in_batches(&overrides, self.batch_size, |_, batch| {
            repo.insert_overrides(batch)
        })
        .await;

        let mut message = format!("{} override edges", report.written);
        if !contradictions.is_empty() {
            message.push_str(&format!(", {} contradictory pairs", contradictions.len()));
        }
        Ok(StageResult::from_batches(report.written, message, report.failures))
    }

    async fn run_embeddings(&self, contract_id: &str) -> Result<StageResult> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| anyhow!("no embedding provider configured"))?;
        let pending = self
            .repos
            .chunks
            .chunks_needing_embedding(contract_id, embedder.model_name())
            .await?;
        if pending.is_empty() {
            return Ok(StageResult::from_batches(
                0,
                "all chunks up to date".to_string(),
                Vec::new(),
            ));
        }

        let report = write_in_batches(&pending, self.embed_batch_size, |batch_index, batch| {
            self.embed_batch(embedder.as_ref(), batch_index, batch)
        })
        .await;
        let message = embedding_message(embedder.model_name(), &report);
        Ok(StageResult::from_batches(report.written, message, report.failures))
    }

    async fn embed_batch(
        &self,
        embedder: &dyn EmbeddingProvider,
        batch_index: usize,
        batch: &[DocumentChunk],
    ) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embed_with_retry(embedder, &texts, self.embed_policy).await?;
        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            self.repos
                .chunks
                .upsert_embedding(chunk, vector, embedder.model_name())
                .await?;
        }
        debug!(batch = batch_index, chunks = batch.len(), "embedded batch");
        Ok(())
    }

    // ============ Queries ============

    /// Run the ten integrity checks over a contract's stored state.
    pub async fn validate(&self, contract_id: &str) -> Result<ValidationResult> {
        let snapshot = self.repos.load_snapshot(contract_id).await?;
        Ok(self.validator.validate(&snapshot))
    }

    /// The authoritative text of a clause with its override chain.
    pub async fn effective_clause(
        &self,
        contract_id: &str,
        clause_number: &str,
    ) -> Result<Option<EffectiveClause>> {
        let snapshot = self.repos.load_snapshot(contract_id).await?;
        Ok(self.resolver.effective_clause_content(&snapshot, clause_number))
    }

    pub async fn reference_graph(&self, contract_id: &str) -> Result<ReferenceGraph> {
        let documents = self.repos.documents.list_documents(contract_id).await?;
        let chunks = self.repos.chunks.list_chunks(contract_id).await?;
        let references = self.repos.references.list_references(contract_id).await?;
        Ok(ReferenceGraph::build(&documents, &chunks, &references))
    }
}

fn embedding_message(model: &str, report: &BatchWriteReport) -> String {
    format!(
        "{} of {} chunks embedded with {} ({} failed batches)",
        report.written,
        report.total_items,
        model,
        report.failures.len()
    )
}
