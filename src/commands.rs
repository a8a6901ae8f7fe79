//! `ctr` command implementations.
//!
//! Each `run_*` function opens the database named by the config, performs
//! one operation through the [`IngestionOrchestrator`] and prints a short
//! summary (`key: value` lines ending in `ok`) or the requested document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;

use contract_harness_core::models::{
    ContractDocument, DocumentGroup, META_CONDITIONS_KIND, META_SOURCE_PATH,
};
use contract_harness_core::priority::find_contradictions;
use contract_harness_core::source::TextSource;
use contract_harness_core::store::Repositories;
use contract_harness_core::validation::render_markdown;

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::export::{graph_json, overrides_json, write_output, OverrideExport};
use crate::extract::FileTextSource;
use crate::ingest::{IngestionOrchestrator, Stage, StageToggles};
use crate::ocr::OcrHttpSource;
use crate::sqlite_store::SqliteStore;

async fn open(config: &Config) -> Result<(SqliteStore, IngestionOrchestrator)> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let embedder = if config.embedding.is_enabled() {
        Some(create_provider(&config.embedding)?)
    } else {
        None
    };
    let repos = Repositories::from_store(Arc::new(store.clone()));
    Ok((store, IngestionOrchestrator::from_config(config, repos, embedder)))
}

/// Options of `ctr add`.
#[derive(Debug, Clone)]
pub struct AddOptions {
    pub file: PathBuf,
    pub contract_id: String,
    pub group: DocumentGroup,
    pub name: Option<String>,
    pub effective_date: Option<NaiveDate>,
    pub supersedes: Option<String>,
    /// `particular` or `general`, for Conditions documents.
    pub conditions_kind: Option<String>,
    pub ocr: bool,
}

pub fn build_document(options: &AddOptions) -> Result<ContractDocument> {
    let path = options
        .file
        .canonicalize()
        .with_context(|| format!("File not found: {}", options.file.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .with_context(|| format!("Invalid file name: {}", path.display()))?;
    let name = options.name.clone().unwrap_or_else(|| {
        Path::new(&file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file_name)
            .replace('_', " ")
    });
    let size = std::fs::metadata(&path)?.len();

    // The repository assigns the real sequence number.
    let mut document = ContractDocument::new(&options.contract_id, options.group, name, 0)
        .with_file_name(file_name)
        .with_file_size(size);
    if let Some(date) = options.effective_date {
        document = document.with_effective_date(date);
    }
    if let Some(superseded) = &options.supersedes {
        document = document.with_supersedes(superseded.clone());
    }
    if let Some(kind) = &options.conditions_kind {
        if options.group != DocumentGroup::Conditions {
            bail!("--conditions-kind only applies to the conditions group");
        }
        document
            .metadata
            .insert(META_CONDITIONS_KIND.to_string(), kind.clone());
    }
    document
        .metadata
        .insert(META_SOURCE_PATH.to_string(), path.display().to_string());
    Ok(document)
}

pub async fn run_add(config: &Config, options: &AddOptions) -> Result<()> {
    let document = build_document(options)?;
    let (store, orchestrator) = open(config).await?;

    let files = FileTextSource::new(".");
    let source: Box<dyn TextSource> = if options.ocr {
        Box::new(OcrHttpSource::new(&config.extraction, files)?)
    } else {
        Box::new(files)
    };

    let document = orchestrator.ingest(document, source.as_ref()).await?;
    let chunks = orchestrator
        .repositories()
        .chunks
        .chunks_for_document(&document.id)
        .await?;

    println!("add {}", options.file.display());
    println!("  document: {}", document.id);
    println!("  contract: {}", document.contract_id);
    println!("  group: {}", document.group.as_str());
    println!("  sequence: {}", document.sequence_number);
    println!("  source: {}", source.name());
    println!("  chunks: {}", chunks.len());
    println!("  status: {}", document.status.as_str());
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// Stage toggles from config, adjusted by command-line flags.
pub fn toggles_from_flags(
    config: &Config,
    no_references: bool,
    no_overrides: bool,
    embeddings: bool,
    no_validation: bool,
) -> StageToggles {
    let mut toggles = config.pipeline.toggles();
    if no_references {
        toggles.references = false;
    }
    if no_overrides {
        toggles.overrides = false;
    }
    if embeddings {
        toggles.embeddings = true;
    }
    if no_validation {
        toggles.validation = false;
    }
    toggles
}

pub async fn run_process(config: &Config, contract_id: &str, toggles: StageToggles) -> Result<()> {
    let (store, orchestrator) = open(config).await?;
    let report = orchestrator.run(contract_id, toggles).await;

    println!("process {}", contract_id);
    for stage in Stage::ALL {
        if let Some(result) = report.stage(stage) {
            println!(
                "  {}: {} ({})",
                stage.as_str(),
                result.status.as_str(),
                result.message
            );
            for failure in &result.failures {
                println!(
                    "    batch {}: {} items failed: {}",
                    failure.batch_index, failure.items, failure.message
                );
            }
        }
    }
    if let Some(validation) = &report.validation {
        println!(
            "  valid: {}",
            if validation.is_valid { "yes" } else { "no" }
        );
    }
    store.pool().close().await;

    if !report.success {
        bail!("pipeline finished with failed stages");
    }
    println!("ok");
    Ok(())
}

pub async fn run_validate(config: &Config, contract_id: &str, output: Option<&Path>) -> Result<()> {
    let (store, orchestrator) = open(config).await?;
    let result = orchestrator.validate(contract_id).await?;
    store.pool().close().await;
    write_output(&render_markdown(&result), output)
}

pub async fn run_clause(config: &Config, contract_id: &str, clause_number: &str) -> Result<()> {
    let (store, orchestrator) = open(config).await?;
    let effective = orchestrator.effective_clause(contract_id, clause_number).await?;
    store.pool().close().await;

    let Some(effective) = effective else {
        bail!("clause {} not found in contract {}", clause_number, contract_id);
    };

    println!("clause {}", effective.clause_number);
    println!("  effective document: {}", effective.effective_document_id);
    println!("  composite: {}", effective.is_composite);
    if !effective.tied_document_ids.is_empty() {
        println!("  tied with: {}", effective.tied_document_ids.join(", "));
    }
    println!("  chain:");
    for entry in &effective.chain {
        print!(
            "    {} [{}] priority {:.3} {}",
            entry.document_name,
            entry.group.as_str(),
            entry.priority,
            entry.relationship.as_str()
        );
        if let Some(t) = entry.override_type {
            print!(" ({})", t.as_str());
        }
        println!();
    }
    println!();
    println!("{}", effective.content.trim_end());
    Ok(())
}

pub async fn run_graph(config: &Config, contract_id: &str, output: Option<&Path>) -> Result<()> {
    let (store, orchestrator) = open(config).await?;
    let graph = orchestrator.reference_graph(contract_id).await?;
    store.pool().close().await;
    write_output(&graph_json(&graph)?, output)
}

pub async fn run_overrides(config: &Config, contract_id: &str, json: bool) -> Result<()> {
    let (store, orchestrator) = open(config).await?;
    let overrides = orchestrator
        .repositories()
        .overrides
        .list_overrides(contract_id)
        .await?;
    store.pool().close().await;

    if json {
        return write_output(&overrides_json(&OverrideExport::new(contract_id, &overrides))?, None);
    }

    println!("overrides {}", contract_id);
    for o in &overrides {
        let clauses = match &o.affected_clauses {
            Some(list) if !list.is_empty() => list.join(","),
            _ => "*".to_string(),
        };
        println!(
            "  {} -> {} [{}/{}] clauses: {}",
            o.overriding_document_id,
            o.overridden_document_id,
            o.override_scope,
            o.override_type.as_str(),
            clauses
        );
    }
    for (a, b) in find_contradictions(&overrides) {
        println!("  contradiction: {} <-> {}", a, b);
    }
    println!("  edges: {}", overrides.len());
    println!("ok");
    Ok(())
}

pub async fn run_delete(config: &Config, document_id: &str) -> Result<()> {
    let (store, orchestrator) = open(config).await?;
    let deleted = orchestrator.delete_document(document_id).await?;
    store.pool().close().await;
    if !deleted {
        bail!("document not found: {}", document_id);
    }
    println!("delete {}", document_id);
    println!("ok");
    Ok(())
}

pub async fn run_health(config: &Config) -> Result<()> {
    let source = OcrHttpSource::new(&config.extraction, FileTextSource::new("."))?;
    let health = source.health().await?;
    println!("ocr {}", source.url());
    println!("  status: {}", health.status);
    if let Some(engine) = health.engine {
        println!("  engine: {}", engine);
    }
    println!("ok");
    Ok(())
}
