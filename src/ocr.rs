//! HTTP client for the OCR bridge service.
//!
//! The service accepts a multipart upload on `POST /ocr` (field `file`) and
//! answers with the recognised text, per-line results and per-page text:
//!
//! ```json
//! {
//!   "text": "...",
//!   "results": [{"text": "...", "confidence": 0.97, "box": [[0,0],[1,0],[1,1],[0,1]], "page": 1}],
//!   "pages": [{"page_number": 1, "text": "...", "line_count": 12}],
//!   "page_count": 1,
//!   "engine": "paddleocr"
//! }
//! ```
//!
//! `GET /health` reports whether the engine is loaded.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use contract_harness_core::models::ContractDocument;
use contract_harness_core::source::{ExtractedText, TextSource};

use crate::config::ExtractionConfig;
use crate::extract::FileTextSource;
use crate::retry::{with_retry, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f64,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrPage {
    pub page_number: u32,
    pub text: String,
    #[serde(default)]
    pub line_count: usize,
}

/// Body of a successful `POST /ocr`.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub results: Vec<OcrLine>,
    #[serde(default)]
    pub pages: Vec<OcrPage>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub engine: Option<String>,
}

impl OcrResponse {
    /// Mean line confidence, `None` when no line was recognised.
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        let sum: f64 = self.results.iter().map(|r| r.confidence).sum();
        Some(sum / self.results.len() as f64)
    }

    pub fn into_extracted(self) -> ExtractedText {
        let confidence = self.mean_confidence();
        let mut pages = self.pages;
        pages.sort_by_key(|p| p.page_number);
        let pages: Vec<String> = pages.into_iter().map(|p| p.text).collect();
        let text = if self.text.trim().is_empty() {
            pages.join("\n")
        } else {
            self.text
        };
        ExtractedText {
            text,
            pages,
            tables: Vec::new(),
            confidence,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct OcrHealth {
    pub status: String,
    #[serde(default)]
    pub engine: Option<String>,
}

/// [`TextSource`] that sends the document's file to the OCR service.
pub struct OcrHttpSource {
    url: String,
    files: FileTextSource,
    policy: RetryPolicy,
    client: reqwest::Client,
}

impl OcrHttpSource {
    pub fn new(config: &ExtractionConfig, files: FileTextSource) -> Result<Self> {
        let url = config
            .ocr_url
            .clone()
            .ok_or_else(|| anyhow!("extraction.ocr_url is not configured"))?;
        // Per-attempt timeout is enforced by the retry policy.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            files,
            policy: RetryPolicy::new(config.timeout_secs, config.retry_backoff_ms),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post_once(&self, file_name: &str, bytes: &[u8]) -> Result<OcrResponse> {
        let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(format!("{}/ocr", self.url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow!("OCR service unreachable at {}: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("OCR service error {}: {}", status, body);
        }
        Ok(response.json().await?)
    }

    /// OCR raw file bytes.
    pub async fn recognize(&self, file_name: &str, bytes: &[u8]) -> Result<ExtractedText> {
        let what = format!("OCR of {}", file_name);
        let response = with_retry(self.policy, &what, || self.post_once(file_name, bytes)).await?;
        info!(
            file = file_name,
            lines = response.results.len(),
            pages = response.page_count.unwrap_or(response.pages.len() as u32),
            engine = response.engine.as_deref().unwrap_or("unknown"),
            "OCR complete"
        );
        Ok(response.into_extracted())
    }

    pub async fn health(&self) -> Result<OcrHealth> {
        let what = format!("OCR health check at {}", self.url);
        with_retry(self.policy, &what, || async {
            let response = self
                .client
                .get(format!("{}/health", self.url))
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                bail!("OCR service error {}", status);
            }
            Ok(response.json::<OcrHealth>().await?)
        })
        .await
    }
}

#[async_trait]
impl TextSource for OcrHttpSource {
    fn name(&self) -> &str {
        "ocr"
    }

    async fn extract(&self, document: &ContractDocument) -> Result<ExtractedText> {
        let path = self.files.path_for(document)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = Path::new(&path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        debug!(file = %file_name, bytes = bytes.len(), "sending to OCR");
        self.recognize(&file_name, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_confidence_and_pages() {
        let json = serde_json::json!({
            "text": "",
            "results": [
                {"text": "1.1 Definitions", "confidence": 0.9, "box": [[0,0],[1,0],[1,1],[0,1]], "page": 1},
                {"text": "Employer", "confidence": 0.7, "box": [[0,0],[1,0],[1,1],[0,1]], "page": 2}
            ],
            "pages": [
                {"page_number": 2, "text": "Employer", "line_count": 1},
                {"page_number": 1, "text": "1.1 Definitions", "line_count": 1}
            ],
            "page_count": 2,
            "engine": "paddleocr"
        });
        let response: OcrResponse = serde_json::from_value(json).unwrap();
        let extracted = response.into_extracted();
        assert_eq!(extracted.pages, vec!["1.1 Definitions", "Employer"]);
        assert_eq!(extracted.text, "1.1 Definitions\nEmployer");
        assert!((extracted.confidence.unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_no_results_means_no_confidence() {
        let response: OcrResponse =
            serde_json::from_value(serde_json::json!({"text": "blank"})).unwrap();
        assert_eq!(response.mean_confidence(), None);
        assert_eq!(response.into_extracted().text, "blank");
    }

    #[test]
    fn test_source_requires_url() {
        let config = ExtractionConfig::default();
        assert!(OcrHttpSource::new(&config, FileTextSource::new(".")).is_err());

        let config = ExtractionConfig {
            ocr_url: Some("http://localhost:8001/".into()),
            ..Default::default()
        };
        let source = OcrHttpSource::new(&config, FileTextSource::new(".")).unwrap();
        assert_eq!(source.url(), "http://localhost:8001");
    }
}
