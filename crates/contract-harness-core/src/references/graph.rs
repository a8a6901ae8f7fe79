//! Exportable node/edge graph of clause citations.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{target_counts, KnownClauseIndex};
use crate::clause::normalize_clause_number;
use crate::models::{ClauseReference, ContractDocument, DocumentChunk, ReferenceType};

/// A clause (or appendix/form label) in the citation graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub title: Option<String>,
    /// Documents containing this clause, in id order.
    pub documents: Vec<String>,
    /// Whether the clause, an ancestor of it, or a document label is
    /// known to the contract. Matches reference resolution.
    pub known: bool,
    /// Number of citations pointing at this node.
    pub inbound: usize,
}

/// A citation edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub document_id: String,
    pub reference_type: ReferenceType,
    pub confidence: f64,
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl ReferenceGraph {
    /// Build the graph for one contract. References without a source
    /// clause are attached to the preamble node `"0"`.
    pub fn build(
        documents: &[ContractDocument],
        chunks: &[DocumentChunk],
        references: &[ClauseReference],
    ) -> Self {
        let mut index = KnownClauseIndex::from_chunks(chunks);
        index.add_document_labels(documents);
        let inbound = target_counts(references);

        let mut nodes: BTreeMap<String, (Option<String>, BTreeSet<String>)> = BTreeMap::new();
        for chunk in chunks {
            let Some(key) = chunk.normalized_clause() else {
                continue;
            };
            let entry = nodes.entry(key).or_default();
            if entry.0.is_none() {
                entry.0 = chunk.clause_title.clone();
            }
            entry.1.insert(chunk.document_id.clone());
        }

        let mut edges = Vec::with_capacity(references.len());
        for r in references {
            let source = r
                .source_clause_number
                .as_deref()
                .map(normalize_clause_number)
                .unwrap_or_else(|| "0".to_string());
            let target = normalize_clause_number(&r.target_clause_number);

            nodes.entry(source.clone()).or_default();
            nodes.entry(target.clone()).or_default();

            edges.push(GraphEdge {
                source,
                target,
                document_id: r.source_document_id.clone(),
                reference_type: r.reference_type,
                confidence: r.confidence,
                resolved: r.is_resolved,
            });
        }

        ReferenceGraph {
            nodes: nodes
                .into_iter()
                .map(|(id, (title, documents))| GraphNode {
                    known: index.is_known(&id),
                    inbound: inbound.get(&id).copied().unwrap_or(0),
                    id,
                    title,
                    documents: documents.into_iter().collect(),
                })
                .collect(),
            edges,
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
