//! Orchestrator behaviour against the in-memory repositories.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use contract_harness::ingest::{IngestionOrchestrator, Stage, StageStatus, StageToggles};
use contract_harness::retry::RetryPolicy;
use contract_harness_core::embedding::EmbeddingProvider;
use contract_harness_core::models::{
    ClauseReference, ContractDocument, DocumentGroup, DocumentStatus,
};
use contract_harness_core::source::{ExtractedText, TextSource};
use contract_harness_core::store::memory::InMemoryContractStore;
use contract_harness_core::store::{ReferenceRepository, Repositories};

fn policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(1),
        backoff: Duration::from_millis(1),
    }
}

async fn add(
    orch: &IngestionOrchestrator,
    doc: ContractDocument,
    text: &str,
) -> ContractDocument {
    let doc = orch.register_document(doc).await.unwrap();
    orch.process_document(&doc, &ExtractedText::from_text(text))
        .await
        .unwrap();
    doc
}

fn all_stages() -> StageToggles {
    StageToggles {
        references: true,
        overrides: true,
        embeddings: true,
        validation: true,
    }
}

/// Fails every upsert whose batch contains a reference to `poison`.
struct PoisonedReferences {
    inner: Arc<InMemoryContractStore>,
    poison: String,
}

#[async_trait]
impl ReferenceRepository for PoisonedReferences {
    async fn upsert_references(&self, references: &[ClauseReference]) -> Result<()> {
        if references.iter().any(|r| r.target_clause_number == self.poison) {
            bail!("constraint violation");
        }
        self.inner.upsert_references(references).await
    }

    async fn list_references(&self, contract_id: &str) -> Result<Vec<ClauseReference>> {
        self.inner.list_references(contract_id).await
    }

    async fn clear_references(&self, contract_id: &str) -> Result<u64> {
        self.inner.clear_references(contract_id).await
    }
}

struct CountingProvider {
    calls: AtomicU32,
    fail_first: bool,
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn model_name(&self) -> &str {
        "counting"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && call == 0 {
            bail!("429 Too Many Requests");
        }
        Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0, 1.0]).collect())
    }
}

struct AlwaysDown;

#[async_trait]
impl EmbeddingProvider for AlwaysDown {
    fn model_name(&self) -> &str {
        "down"
    }
    fn dims(&self) -> usize {
        3
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("connection refused")
    }
}

struct BrokenSource;

#[async_trait]
impl TextSource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }
    async fn extract(&self, _document: &ContractDocument) -> Result<ExtractedText> {
        bail!("OCR service error 500")
    }
}

#[tokio::test]
async fn particular_conditions_govern_shared_clause() {
    let store = Arc::new(InMemoryContractStore::default());
    let orch = IngestionOrchestrator::new(Repositories::from_store(store));

    let general = add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Conditions, "General Conditions", 0),
        "9.1 Commencement\nX\n",
    )
    .await;
    let particular = add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Conditions, "Particular Conditions", 0),
        "9.1 Commencement\nY\n",
    )
    .await;

    let report = orch.run("c1", StageToggles::default()).await;
    assert!(report.success);

    let effective = orch.effective_clause("c1", "9.1").await.unwrap().unwrap();
    assert_eq!(effective.effective_document_id, particular.id);
    assert!(effective.is_composite);
    assert_eq!(effective.chain.len(), 2);
    assert_eq!(effective.chain[1].document_id, general.id);
    assert!(effective.content.contains('Y'));
}

#[tokio::test]
async fn failed_reference_batch_does_not_stop_later_stages() {
    let store = Arc::new(InMemoryContractStore::default());
    let repos = Repositories {
        references: Arc::new(PoisonedReferences {
            inner: store.clone(),
            poison: "4.2".into(),
        }),
        ..Repositories::from_store(store.clone())
    };
    let orch = IngestionOrchestrator::new(repos).with_batch_size(1);

    add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Agreement, "Agreement", 0),
        "1.1 Scope\nSee Clause 4.1 and Clause 4.2 for payment.\n\n4.1 Price\nFixed.\n\n4.2 Payment\nMonthly.\n",
    )
    .await;

    let report = orch.run("c1", StageToggles::default()).await;
    assert!(!report.success);

    let references = report.stage(Stage::References).unwrap();
    assert_eq!(references.status, StageStatus::Failed);
    assert_eq!(references.failures.len(), 1);
    assert_eq!(references.failures[0].message, "constraint violation");
    assert_eq!(references.items, 1);

    assert_eq!(
        report.stage(Stage::Overrides).unwrap().status,
        StageStatus::Succeeded
    );
    assert!(report.validation.is_some());

    let stored = store.list_references("c1").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].target_clause_number, "4.1");
}

#[tokio::test]
async fn embeddings_retry_once_and_skip_up_to_date_chunks() {
    let store = Arc::new(InMemoryContractStore::default());
    let provider = Arc::new(CountingProvider {
        calls: AtomicU32::new(0),
        fail_first: true,
    });
    let orch = IngestionOrchestrator::new(Repositories::from_store(store.clone()))
        .with_embedder(provider.clone(), policy())
        .with_batch_size(50);

    add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Agreement, "Agreement", 0),
        "1.1 Scope\nThe Works.\n\n1.2 Price\nFixed.\n",
    )
    .await;

    let report = orch.run("c1", all_stages()).await;
    assert!(report.success, "{:?}", report.stages);
    let embeddings = report.stage(Stage::Embeddings).unwrap();
    assert_eq!(embeddings.items, 2);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.embedding_count().unwrap(), 2);

    let again = orch.run("c1", all_stages()).await;
    assert_eq!(again.stage(Stage::Embeddings).unwrap().items, 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn embedding_outage_fails_only_its_stage() {
    let store = Arc::new(InMemoryContractStore::default());
    let orch = IngestionOrchestrator::new(Repositories::from_store(store.clone()))
        .with_embedder(Arc::new(AlwaysDown), policy())
        .with_batch_size(1);

    add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Agreement, "Agreement", 0),
        "1.1 Scope\nThe Works.\n\n1.2 Price\nFixed.\n",
    )
    .await;

    let report = orch.run("c1", all_stages()).await;
    assert!(!report.success);
    let embeddings = report.stage(Stage::Embeddings).unwrap();
    assert_eq!(embeddings.status, StageStatus::Failed);
    assert_eq!(embeddings.failures.len(), 2);
    assert!(embeddings.failures[0].message.contains("failed after 2 attempts"));
    assert_eq!(
        report.stage(Stage::References).unwrap().status,
        StageStatus::Succeeded
    );
    assert_eq!(
        report.stage(Stage::Validation).unwrap().status,
        StageStatus::Succeeded
    );
}

#[tokio::test]
async fn addenda_sharing_a_clause_are_reported_once() {
    let store = Arc::new(InMemoryContractStore::default());
    let orch = IngestionOrchestrator::new(Repositories::from_store(store));

    let first = add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Addendum, "Addendum 1", 0)
            .with_effective_date(chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()),
        "19.3 Insurance\nCover of 1m.\n",
    )
    .await;
    let second = add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Addendum, "Addendum 2", 0)
            .with_effective_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        "19.3 Insurance\nCover of 2m.\n",
    )
    .await;

    let report = orch.run("c1", StageToggles::default()).await;
    let validation = report.validation.unwrap();
    let conflicts = validation.check("addendum_conflicts").unwrap();
    assert_eq!(conflicts.items.len(), 1);
    let named = &conflicts.items[0].related_document_ids;
    assert!(named.contains(&first.id) && named.contains(&second.id));

    // The later addendum governs.
    let effective = orch.effective_clause("c1", "19.3").await.unwrap().unwrap();
    assert_eq!(effective.effective_document_id, second.id);
}

#[tokio::test]
async fn extraction_failure_marks_document_failed() {
    let store = Arc::new(InMemoryContractStore::default());
    let orch = IngestionOrchestrator::new(Repositories::from_store(store.clone()));

    let doc = ContractDocument::new("c1", DocumentGroup::Boq, "Bill of Quantities", 0);
    let id = doc.id.clone();
    let err = orch.ingest(doc, &BrokenSource).await.unwrap_err();
    assert!(format!("{:#}", err).contains("OCR service error 500"));

    let stored = orch
        .repositories()
        .documents
        .get_document(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(stored
        .metadata
        .values()
        .any(|v| v.contains("OCR service error 500")));
}

#[tokio::test]
async fn sequence_numbers_are_not_reused_after_delete() {
    let store = Arc::new(InMemoryContractStore::default());
    let orch = IngestionOrchestrator::new(Repositories::from_store(store));

    let a = add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Schedule, "Schedule A", 0),
        "Rates",
    )
    .await;
    assert_eq!(a.sequence_number, 1);
    assert!(orch.delete_document(&a.id).await.unwrap());

    let b = orch
        .register_document(ContractDocument::new("c1", DocumentGroup::Schedule, "Schedule B", 0))
        .await
        .unwrap();
    assert_eq!(b.sequence_number, 2);
}

#[tokio::test]
async fn stored_references_follow_clause_changes() {
    let store = Arc::new(InMemoryContractStore::default());
    let orch = IngestionOrchestrator::new(Repositories::from_store(store.clone()));

    add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Agreement, "Agreement", 0),
        "1.1 Scope\nThe Contractor shall comply with Clause 5.1 at all times.\n",
    )
    .await;
    let references_only = StageToggles {
        references: true,
        overrides: false,
        embeddings: false,
        validation: false,
    };
    assert!(orch.run("c1", references_only).await.success);

    let resolution = |refs: Vec<ClauseReference>| -> Vec<(String, bool)> {
        refs.into_iter()
            .map(|r| (r.target_clause_number, r.is_resolved))
            .collect()
    };
    assert_eq!(
        resolution(store.list_references("c1").await.unwrap()),
        vec![("5.1".to_string(), false)]
    );

    // Ingesting the cited clause resolves the stored link without a new run.
    let conditions = add(
        &orch,
        ContractDocument::new("c1", DocumentGroup::Conditions, "General Conditions", 0),
        "5.1 Payment\nMonthly.\n",
    )
    .await;
    assert_eq!(
        resolution(store.list_references("c1").await.unwrap()),
        vec![("5.1".to_string(), true)]
    );
    let validation = orch.validate("c1").await.unwrap();
    assert!(validation
        .check("unresolved_references")
        .unwrap()
        .items
        .is_empty());

    assert!(orch.delete_document(&conditions.id).await.unwrap());
    assert_eq!(
        resolution(store.list_references("c1").await.unwrap()),
        vec![("5.1".to_string(), false)]
    );
    let validation = orch.validate("c1").await.unwrap();
    assert_eq!(
        validation.check("unresolved_references").unwrap().items.len(),
        1
    );
}
