//! JSON exports for downstream visualisation and rendering.
//!
//! Writes to a file when a path is given, otherwise to stdout so the output
//! can be piped.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use contract_harness_core::models::DocumentOverride;
use contract_harness_core::priority::find_contradictions;
use contract_harness_core::references::graph::ReferenceGraph;

/// Override edges of one contract with the contradictory pairs among them.
#[derive(Debug, Serialize)]
pub struct OverrideExport<'a> {
    pub contract_id: &'a str,
    pub overrides: &'a [DocumentOverride],
    pub contradictions: Vec<(String, String)>,
}

impl<'a> OverrideExport<'a> {
    pub fn new(contract_id: &'a str, overrides: &'a [DocumentOverride]) -> Self {
        Self {
            contract_id,
            overrides,
            contradictions: find_contradictions(overrides),
        }
    }
}

pub fn graph_json(graph: &ReferenceGraph) -> Result<String> {
    Ok(serde_json::to_string_pretty(graph)?)
}

pub fn overrides_json(export: &OverrideExport<'_>) -> Result<String> {
    Ok(serde_json::to_string_pretty(export)?)
}

/// Write `content` to `output`, or print it when no path is given.
pub fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
