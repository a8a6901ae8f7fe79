//! TOML configuration.
//!
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/contracts.sqlite"
//!
//! [chunking]
//! max_tokens = 2000
//! overlap_tokens = 100
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use contract_harness_core::chunk::ChunkingOptions;
use contract_harness_core::priority::PriorityWeights;
use contract_harness_core::references::ReferenceConfig;
use contract_harness_core::store::DEFAULT_BATCH_SIZE;
use contract_harness_core::validation::ValidationConfig;

use crate::ingest::StageToggles;

/// Default config path used by the CLI.
pub const DEFAULT_CONFIG_PATH: &str = "./config/ctr.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingOptions,
    #[serde(default)]
    pub references: ReferenceConfig,
    #[serde(default)]
    pub priority: PriorityWeights,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama host, OpenAI-compatible gateway).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_embedding_timeout_secs() -> u64 {
    30
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

/// Batch size and default stage toggles for `ctr process`.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub references: bool,
    #[serde(default = "default_true")]
    pub overrides: bool,
    #[serde(default)]
    pub embeddings: bool,
    #[serde(default = "default_true")]
    pub validation: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            references: true,
            overrides: true,
            embeddings: false,
            validation: true,
        }
    }
}

impl PipelineConfig {
    pub fn toggles(&self) -> StageToggles {
        StageToggles {
            references: self.references,
            overrides: self.overrides,
            embeddings: self.embeddings,
            validation: self.validation,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Base URL of the OCR bridge service, e.g. `http://localhost:8001`.
    #[serde(default)]
    pub ocr_url: Option<String>,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            ocr_url: None,
            timeout_secs: default_ocr_timeout_secs(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_ocr_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Chunking
    let chunking = &config.chunking;
    if chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if chunking.overlap_tokens >= chunking.max_tokens {
        bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }
    if chunking.min_tokens > chunking.max_tokens {
        bail!("chunking.min_tokens must be <= chunking.max_tokens");
    }

    // References
    let refs = &config.references;
    for (name, value) in [
        ("explicit_confidence", refs.explicit_confidence),
        ("appendix_confidence", refs.appendix_confidence),
        ("form_confidence", refs.form_confidence),
        ("implicit_confidence", refs.implicit_confidence),
        ("parenthetical_confidence", refs.parenthetical_confidence),
        ("bare_numeric_confidence", refs.bare_numeric_confidence),
        ("known_boost", refs.known_boost),
        ("single_segment_penalty", refs.single_segment_penalty),
        ("confidence_threshold", refs.confidence_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            bail!("references.{} must be in [0.0, 1.0]", name);
        }
    }
    if refs.context_window == 0 {
        bail!("references.context_window must be > 0");
    }

    config.priority.validate()?;
    config.validation.validate()?;

    // Embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if config.pipeline.batch_size == 0 {
        bail!("pipeline.batch_size must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"./data/c.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.max_tokens, 2000);
        assert_eq!(config.chunking.overlap_tokens, 100);
        assert_eq!(config.references.confidence_threshold, 0.7);
        assert_eq!(config.validation.ocr_error_limit, 5);
        assert_eq!(config.pipeline.batch_size, 50);
        assert!(!config.embedding.is_enabled());
        let toggles = config.pipeline.toggles();
        assert!(toggles.references && toggles.overrides && toggles.validation);
        assert!(!toggles.embeddings);
    }

    #[test]
    fn test_overlap_must_be_below_max() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[chunking]\nmax_tokens = 100\noverlap_tokens = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let err = parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"bert\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn test_priority_weights_crossing_groups_rejected() {
        let err = parse_config("[db]\npath = \"x\"\n[priority]\nparticular_bonus = 250.0\n")
            .unwrap_err();
        assert!(err.to_string().contains("priority weights"));
    }

    #[test]
    fn test_threshold_range_checked() {
        let err = parse_config("[db]\npath = \"x\"\n[references]\nconfidence_threshold = 1.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }
}
