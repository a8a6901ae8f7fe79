//! Document precedence and override resolution.
//!
//! Contractual precedence is modelled as a numeric priority per document:
//!
//! ```text
//! priority = group base
//!          + Particular/General bonus        (Conditions only)
//!          + date-normalized bonus           (Addendum only, bounded span)
//!          + min(sequence, cap) × epsilon    (tiebreak only)
//! ```
//!
//! With the default weights the group order is
//! Agreement > Acceptance Letter > Addendum > Conditions (Particular >
//! General) > BOQ > Schedules, and [`PriorityWeights::validate`] checks that
//! no bonus can lift a document across a group boundary.
//!
//! Override edges are derived purely from the document set by
//! [`determine_override_relationships`]. Contradictory edges are reported
//! ([`find_contradictions`]) and never resolved here.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clause::{normalize_clause_number, PREAMBLE_CLAUSE_NUMBER};
use crate::models::{
    ConditionsKind, ContractDocument, DocumentChunk, DocumentGroup, DocumentOverride, OverrideType,
};
use crate::snapshot::ContractSnapshot;

/// Priority weights. Every value is configuration, not doctrine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub agreement: f64,
    pub acceptance_letter: f64,
    pub addendum: f64,
    pub conditions: f64,
    pub boq: f64,
    pub schedule: f64,
    pub particular_bonus: f64,
    pub general_bonus: f64,
    /// Maximum date bonus inside the Addendum group.
    pub addendum_date_span: f64,
    pub date_window_start: NaiveDate,
    pub date_window_end: NaiveDate,
    pub sequence_epsilon: f64,
    /// Sequence numbers above this contribute no further tiebreak.
    pub sequence_cap: u32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            agreement: 1000.0,
            acceptance_letter: 900.0,
            addendum: 800.0,
            conditions: 600.0,
            boq: 400.0,
            schedule: 300.0,
            particular_bonus: 100.0,
            general_bonus: 0.0,
            addendum_date_span: 50.0,
            date_window_start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            date_window_end: NaiveDate::from_ymd_opt(2100, 1, 1).unwrap_or_default(),
            sequence_epsilon: 0.001,
            sequence_cap: 9999,
        }
    }
}

impl PriorityWeights {
    pub fn base(&self, group: DocumentGroup) -> f64 {
        match group {
            DocumentGroup::Agreement => self.agreement,
            DocumentGroup::AcceptanceLetter => self.acceptance_letter,
            DocumentGroup::Addendum => self.addendum,
            DocumentGroup::Conditions => self.conditions,
            DocumentGroup::Boq => self.boq,
            DocumentGroup::Schedule => self.schedule,
        }
    }

    /// Largest amount a document can score above its group base.
    fn band_width(&self, group: DocumentGroup) -> f64 {
        let tiebreak = self.sequence_cap as f64 * self.sequence_epsilon;
        match group {
            DocumentGroup::Conditions => self.particular_bonus.max(self.general_bonus) + tiebreak,
            DocumentGroup::Addendum => self.addendum_date_span + tiebreak,
            _ => tiebreak,
        }
    }

    /// Reject weights whose bonuses could cross a group boundary.
    pub fn validate(&self) -> Result<()> {
        if self.particular_bonus < 0.0
            || self.general_bonus < 0.0
            || self.addendum_date_span < 0.0
            || self.sequence_epsilon < 0.0
        {
            bail!("priority bonuses and epsilon must be >= 0");
        }
        if self.date_window_end <= self.date_window_start {
            bail!("priority.date_window_end must be after date_window_start");
        }
        if self.particular_bonus <= self.general_bonus {
            bail!("priority.particular_bonus must exceed general_bonus");
        }
        let mut groups = DocumentGroup::ALL.to_vec();
        groups.sort_by(|a, b| self.base(*a).total_cmp(&self.base(*b)));
        for pair in groups.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if self.base(lower) + self.band_width(lower) >= self.base(upper) {
                bail!(
                    "priority weights let {} reach {}: base {} + bonus {} >= {}",
                    lower.label(),
                    upper.label(),
                    self.base(lower),
                    self.band_width(lower),
                    self.base(upper)
                );
            }
        }
        Ok(())
    }
}

/// How a document in an override chain relates to the clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRelationship {
    /// Highest priority; its text governs.
    Effective,
    /// Same priority as the effective document; needs human review.
    Tied,
    /// Target of an override edge from a higher-ranked contributor.
    Overridden,
    /// Lower priority with no explicit override edge.
    Subordinate,
}

impl ChainRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainRelationship::Effective => "effective",
            ChainRelationship::Tied => "tied",
            ChainRelationship::Overridden => "overridden",
            ChainRelationship::Subordinate => "subordinate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainEntry {
    pub document_id: String,
    pub document_name: String,
    pub group: DocumentGroup,
    pub priority: f64,
    pub relationship: ChainRelationship,
    pub override_type: Option<OverrideType>,
    pub content: String,
}

/// The governing text of a clause plus the audit chain behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveClause {
    pub clause_number: String,
    pub effective_document_id: String,
    pub content: String,
    pub is_composite: bool,
    /// Highest priority first.
    pub chain: Vec<ChainEntry>,
    /// Other documents sharing the top priority (empty when unambiguous).
    pub tied_document_ids: Vec<String>,
}

/// Computes document priorities and answers effective-text queries.
#[derive(Debug, Clone, Default)]
pub struct PriorityResolver {
    weights: PriorityWeights,
}

impl PriorityResolver {
    pub fn new(weights: PriorityWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    pub fn compute_priority(&self, document: &ContractDocument) -> f64 {
        let w = &self.weights;
        let mut score = w.base(document.group);

        match document.conditions_kind() {
            Some(ConditionsKind::Particular) => score += w.particular_bonus,
            Some(ConditionsKind::General) => score += w.general_bonus,
            None => {}
        }

        if document.group == DocumentGroup::Addendum {
            if let Some(date) = document.effective_date {
                let window = (w.date_window_end - w.date_window_start).num_days().max(1) as f64;
                let offset = (date - w.date_window_start).num_days() as f64;
                score += (offset / window).clamp(0.0, 1.0) * w.addendum_date_span;
            }
        }

        score + document.sequence_number.min(w.sequence_cap) as f64 * w.sequence_epsilon
    }

    /// Documents ordered by priority, highest first. Equal priorities keep
    /// their input order.
    pub fn rank<'a>(
        &self,
        documents: impl IntoIterator<Item = &'a ContractDocument>,
    ) -> Vec<(&'a ContractDocument, f64)> {
        let mut ranked: Vec<(&ContractDocument, f64)> = documents
            .into_iter()
            .map(|d| (d, self.compute_priority(d)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Resolve the effective text of `clause_number` across all documents.
    ///
    /// Returns `None` when no chunk carries the clause.
    pub fn effective_clause_content(
        &self,
        snapshot: &ContractSnapshot,
        clause_number: &str,
    ) -> Option<EffectiveClause> {
        let key = normalize_clause_number(clause_number);
        let docs = snapshot.documents_by_id();

        let mut per_doc: Vec<(&ContractDocument, String)> = Vec::new();
        for chunk in snapshot.chunks_for_clause(&key) {
            let Some(doc) = docs.get(chunk.document_id.as_str()) else {
                continue;
            };
            match per_doc.iter_mut().find(|(d, _)| d.id == doc.id) {
                Some((_, content)) => content.push_str(chunk.own_content()),
                None => per_doc.push((doc, chunk.own_content().to_string())),
            }
        }
        if per_doc.is_empty() {
            return None;
        }

        let ranked: Vec<(&ContractDocument, String, f64)> = self
            .rank(per_doc.iter().map(|(d, _)| *d))
            .into_iter()
            .filter_map(|(d, p)| {
                let (_, content) = per_doc.iter().find(|(other, _)| other.id == d.id)?;
                Some((d, content.clone(), p))
            })
            .collect();

        let top_priority = ranked[0].2;
        let mut chain: Vec<ChainEntry> = Vec::with_capacity(ranked.len());
        for (i, (doc, content, priority)) in ranked.iter().enumerate() {
            let (relationship, override_type) = if i == 0 {
                (ChainRelationship::Effective, None)
            } else if priority.total_cmp(&top_priority) == Ordering::Equal {
                (ChainRelationship::Tied, None)
            } else {
                let higher: Vec<&str> = ranked[..i].iter().map(|(d, _, _)| d.id.as_str()).collect();
                match snapshot.overrides.iter().find(|o| {
                    o.overridden_document_id == doc.id
                        && higher.contains(&o.overriding_document_id.as_str())
                        && o.covers_clause(&key)
                }) {
                    Some(edge) => (ChainRelationship::Overridden, Some(edge.override_type)),
                    None => (ChainRelationship::Subordinate, None),
                }
            };
            chain.push(ChainEntry {
                document_id: doc.id.clone(),
                document_name: doc.name.clone(),
                group: doc.group,
                priority: *priority,
                relationship,
                override_type,
                content: content.clone(),
            });
        }

        let tied_document_ids = chain
            .iter()
            .filter(|e| e.relationship == ChainRelationship::Tied)
            .map(|e| e.document_id.clone())
            .collect();

        Some(EffectiveClause {
            clause_number: key,
            effective_document_id: chain[0].document_id.clone(),
            content: chain[0].content.clone(),
            is_composite: chain.len() > 1,
            chain,
            tied_document_ids,
        })
    }
}

/// Whether `document_id` is overridden for `clause_number` by some other
/// document's edge.
pub fn is_clause_overridden(
    overrides: &[DocumentOverride],
    clause_number: &str,
    document_id: &str,
) -> bool {
    overrides.iter().any(|o| {
        o.overridden_document_id == document_id
            && o.overriding_document_id != document_id
            && o.covers_clause(clause_number)
    })
}

/// Whether addendum `a` is chronologically earlier than addendum `b`.
///
/// Dates decide when both are present; the sequence number breaks equal
/// dates and stands in when either date is missing.
fn addendum_precedes(a: &ContractDocument, b: &ContractDocument) -> bool {
    match (a.effective_date, b.effective_date) {
        (Some(da), Some(db)) if da != db => da < db,
        _ => a.sequence_number < b.sequence_number,
    }
}

/// Derive override edges from the document set.
///
/// Pure and idempotent: the same documents always give the same edges in
/// the same order. Rules:
/// - Particular Conditions override General Conditions (`partial`);
/// - every Addendum overrides every Conditions document and every
///   chronologically earlier Addendum (`clause_specific`);
/// - an Acceptance Letter overrides the Agreement (`partial`);
/// - a declared `supersedes_document_id` overrides its target (`full`).
pub fn determine_override_relationships(documents: &[ContractDocument]) -> Vec<DocumentOverride> {
    let mut docs: Vec<&ContractDocument> = documents.iter().collect();
    docs.sort_by(|a, b| {
        a.group
            .cmp(&b.group)
            .then(a.sequence_number.cmp(&b.sequence_number))
            .then(a.id.cmp(&b.id))
    });

    let mut edges = Vec::new();
    let mut edge = |over: &ContractDocument,
                    under: &ContractDocument,
                    scope: &str,
                    kind: OverrideType,
                    reason: &str| {
        if over.id != under.id {
            edges.push(DocumentOverride {
                contract_id: over.contract_id.clone(),
                overriding_document_id: over.id.clone(),
                overridden_document_id: under.id.clone(),
                override_scope: scope.to_string(),
                override_type: kind,
                affected_clauses: None,
                reason: reason.to_string(),
                effective_date: over.effective_date,
            });
        }
    };

    for &over in &docs {
        for &under in &docs {
            match (over.group, under.group) {
                (DocumentGroup::Conditions, DocumentGroup::Conditions) => {
                    if over.conditions_kind() == Some(ConditionsKind::Particular)
                        && under.conditions_kind() == Some(ConditionsKind::General)
                    {
                        edge(
                            over,
                            under,
                            "conditions",
                            OverrideType::Partial,
                            "Particular Conditions amend the General Conditions",
                        );
                    }
                }
                (DocumentGroup::Addendum, DocumentGroup::Conditions) => edge(
                    over,
                    under,
                    "conditions",
                    OverrideType::ClauseSpecific,
                    "Addendum amends the Conditions of Contract",
                ),
                (DocumentGroup::Addendum, DocumentGroup::Addendum) => {
                    if addendum_precedes(under, over) {
                        edge(
                            over,
                            under,
                            "addendum",
                            OverrideType::ClauseSpecific,
                            "Later addendum amends an earlier addendum",
                        );
                    }
                }
                (DocumentGroup::AcceptanceLetter, DocumentGroup::Agreement) => edge(
                    over,
                    under,
                    "agreement",
                    OverrideType::Partial,
                    "Acceptance Letter qualifies the Agreement",
                ),
                _ => {}
            }
        }
    }

    for &over in &docs {
        let Some(target) = over.supersedes_document_id.as_deref() else {
            continue;
        };
        if let Some(&under) = docs.iter().find(|d| d.id == target) {
            edge(
                over,
                under,
                "declared",
                OverrideType::Full,
                "Declared supersession",
            );
        }
    }

    edges
}

/// Fill `affected_clauses` of clause-specific edges with the clause numbers
/// the overriding document actually contains. Edges of documents without
/// numbered clauses stay contract-wide.
pub fn scope_overrides_to_clauses(
    overrides: Vec<DocumentOverride>,
    chunks: &[DocumentChunk],
) -> Vec<DocumentOverride> {
    let mut clauses_by_doc: HashMap<&str, BTreeSet<String>> = HashMap::new();
    for chunk in chunks {
        if let Some(key) = chunk.normalized_clause() {
            if key != PREAMBLE_CLAUSE_NUMBER {
                clauses_by_doc
                    .entry(chunk.document_id.as_str())
                    .or_default()
                    .insert(key);
            }
        }
    }

    overrides
        .into_iter()
        .map(|mut o| {
            if o.override_type == OverrideType::ClauseSpecific {
                if let Some(clauses) = clauses_by_doc.get(o.overriding_document_id.as_str()) {
                    o.affected_clauses = Some(clauses.iter().cloned().collect());
                }
            }
            o
        })
        .collect()
}

/// Document pairs that override each other, as `(a, b)` with `a < b`.
pub fn find_contradictions(overrides: &[DocumentOverride]) -> Vec<(String, String)> {
    let mut pairs = BTreeSet::new();
    for o in overrides {
        let reverse = overrides.iter().any(|r| {
            r.overriding_document_id == o.overridden_document_id
                && r.overridden_document_id == o.overriding_document_id
        });
        if reverse {
            let (a, b) = if o.overriding_document_id < o.overridden_document_id {
                (&o.overriding_document_id, &o.overridden_document_id)
            } else {
                (&o.overridden_document_id, &o.overriding_document_id)
            };
            pairs.insert((a.clone(), b.clone()));
        }
    }
    pairs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentType;
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn doc(group: DocumentGroup, name: &str, seq: u32) -> ContractDocument {
        let mut d = ContractDocument::new("c1", group, name, seq);
        d.id = format!("{}-{}", name.to_lowercase().replace(' ', "-"), seq);
        d
    }

    fn chunk(doc: &ContractDocument, index: i64, clause: &str, content: &str) -> DocumentChunk {
        DocumentChunk {
            id: format!("{}-{}", doc.id, index),
            document_id: doc.id.clone(),
            contract_id: doc.contract_id.clone(),
            chunk_index: index,
            content: content.to_string(),
            content_hash: String::new(),
            content_type: ContentType::Text,
            clause_number: Some(clause.to_string()),
            clause_title: None,
            token_count: 0,
            extraction_confidence: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_default_weights_valid() {
        PriorityWeights::default().validate().unwrap();
    }

    #[test]
    fn test_weights_crossing_rejected() {
        let w = PriorityWeights {
            addendum_date_span: 150.0,
            ..Default::default()
        };
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_group_order_respected_regardless_of_dates_and_sequence() {
        let resolver = PriorityResolver::default();
        let mut lows = Vec::new();
        let mut highs = Vec::new();
        for group in DocumentGroup::ALL {
            let name = match group {
                DocumentGroup::Conditions => "Particular Conditions",
                _ => "Doc",
            };
            let high = doc(group, name, u32::MAX).with_effective_date(date(2099, 12, 31));
            let general = match group {
                DocumentGroup::Conditions => "General Conditions",
                _ => "Doc",
            };
            let low = doc(group, general, 0).with_effective_date(date(1990, 1, 1));
            highs.push((group, resolver.compute_priority(&high)));
            lows.push((group, resolver.compute_priority(&low)));
        }
        let order = [
            DocumentGroup::Agreement,
            DocumentGroup::AcceptanceLetter,
            DocumentGroup::Addendum,
            DocumentGroup::Conditions,
            DocumentGroup::Boq,
            DocumentGroup::Schedule,
        ];
        for pair in order.windows(2) {
            let low_of_upper = lows.iter().find(|(g, _)| *g == pair[0]).unwrap().1;
            let high_of_lower = highs.iter().find(|(g, _)| *g == pair[1]).unwrap().1;
            assert!(
                low_of_upper > high_of_lower,
                "{:?} must outrank {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_particular_outranks_general_and_later_addendum_outranks_earlier() {
        let r = PriorityResolver::default();
        let general = doc(DocumentGroup::Conditions, "General Conditions", 5);
        let particular = doc(DocumentGroup::Conditions, "Particular Conditions", 1);
        assert!(r.compute_priority(&particular) > r.compute_priority(&general));

        let early = doc(DocumentGroup::Addendum, "Addendum", 2).with_effective_date(date(2023, 1, 1));
        let late = doc(DocumentGroup::Addendum, "Addendum", 1).with_effective_date(date(2024, 1, 1));
        assert!(r.compute_priority(&late) > r.compute_priority(&early));
    }

    #[test]
    fn test_rank_orders_by_priority_and_keeps_ties_in_input_order() {
        let r = PriorityResolver::default();
        let boq = doc(DocumentGroup::Boq, "Bill", 1);
        let agreement = doc(DocumentGroup::Agreement, "Agreement", 1);
        let first = doc(DocumentGroup::Schedule, "Schedule", 3);
        let mut second = doc(DocumentGroup::Schedule, "Schedule", 3);
        second.id = "schedule-copy".into();

        let docs = vec![boq, first, agreement, second];
        let ranked: Vec<&str> = r.rank(&docs).into_iter().map(|(d, _)| d.id.as_str()).collect();
        assert_eq!(ranked, vec!["agreement-1", "bill-1", "schedule-3", "schedule-copy"]);
    }

    #[test]
    fn test_general_particular_scenario() {
        let a = doc(DocumentGroup::Conditions, "General Conditions", 1);
        let b = doc(DocumentGroup::Conditions, "Particular Conditions", 1);
        let r = PriorityResolver::default();
        assert!(r.compute_priority(&b) > r.compute_priority(&a));

        let mut snapshot = ContractSnapshot::new("c1");
        snapshot.chunks = vec![chunk(&a, 0, "9.1", "X"), chunk(&b, 0, "9.1", "Y")];
        snapshot.documents = vec![a.clone(), b.clone()];
        snapshot.overrides = determine_override_relationships(&snapshot.documents);

        let effective = r.effective_clause_content(&snapshot, "9.1").unwrap();
        assert_eq!(effective.content, "Y");
        assert_eq!(effective.effective_document_id, b.id);
        assert!(effective.is_composite);
        assert_eq!(effective.chain.len(), 2);
        assert_eq!(effective.chain[1].relationship, ChainRelationship::Overridden);
        assert_eq!(effective.chain[1].override_type, Some(OverrideType::Partial));
        assert!(effective.tied_document_ids.is_empty());
    }

    #[test]
    fn test_single_contributor_not_composite() {
        let a = doc(DocumentGroup::Agreement, "Agreement", 1);
        let mut snapshot = ContractSnapshot::new("c1");
        snapshot.chunks = vec![chunk(&a, 0, "3", "Only text. "), chunk(&a, 1, "3", "More.")];
        snapshot.documents = vec![a];
        let effective = PriorityResolver::default()
            .effective_clause_content(&snapshot, " 03 ")
            .unwrap();
        assert!(!effective.is_composite);
        assert_eq!(effective.content, "Only text. More.");
        assert!(PriorityResolver::default()
            .effective_clause_content(&snapshot, "4")
            .is_none());
    }

    #[test]
    fn test_ties_surface() {
        let a = doc(DocumentGroup::Schedule, "Schedule A", 1);
        let b = doc(DocumentGroup::Schedule, "Schedule B", 1);
        let mut snapshot = ContractSnapshot::new("c1");
        snapshot.chunks = vec![chunk(&a, 0, "1", "A"), chunk(&b, 0, "1", "B")];
        snapshot.documents = vec![a, b];
        let effective = PriorityResolver::default()
            .effective_clause_content(&snapshot, "1")
            .unwrap();
        assert_eq!(effective.tied_document_ids.len(), 1);
        assert_eq!(effective.chain[1].relationship, ChainRelationship::Tied);
    }

    #[test]
    fn test_override_relationships() {
        let agreement = doc(DocumentGroup::Agreement, "Agreement", 1);
        let loa = doc(DocumentGroup::AcceptanceLetter, "Letter", 1);
        let general = doc(DocumentGroup::Conditions, "General Conditions", 1);
        let particular = doc(DocumentGroup::Conditions, "Particular Conditions", 2);
        let add1 = doc(DocumentGroup::Addendum, "Addendum", 1).with_effective_date(date(2024, 1, 1));
        let add2 = doc(DocumentGroup::Addendum, "Addendum", 2).with_effective_date(date(2024, 3, 1));
        let docs = vec![agreement.clone(), loa.clone(), general.clone(), particular.clone(), add1.clone(), add2.clone()];

        let edges = determine_override_relationships(&docs);
        let has = |over: &ContractDocument, under: &ContractDocument, kind: OverrideType| {
            edges.iter().any(|e| {
                e.overriding_document_id == over.id
                    && e.overridden_document_id == under.id
                    && e.override_type == kind
            })
        };
        assert!(has(&particular, &general, OverrideType::Partial));
        assert!(has(&add1, &general, OverrideType::ClauseSpecific));
        assert!(has(&add2, &particular, OverrideType::ClauseSpecific));
        assert!(has(&add2, &add1, OverrideType::ClauseSpecific));
        assert!(!has(&add1, &add2, OverrideType::ClauseSpecific));
        assert!(has(&loa, &agreement, OverrideType::Partial));
        assert_eq!(edges.len(), 7);

        // Idempotent.
        assert_eq!(edges, determine_override_relationships(&docs));
        assert!(find_contradictions(&edges).is_empty());
    }

    #[test]
    fn test_contradictory_declarations_reported() {
        let add1 = doc(DocumentGroup::Addendum, "Addendum", 1).with_effective_date(date(2024, 1, 1));
        let add2 = doc(DocumentGroup::Addendum, "Addendum", 2).with_effective_date(date(2024, 3, 1));
        let add1 = add1.with_supersedes(add2.id.clone());
        let edges = determine_override_relationships(&[add1.clone(), add2.clone()]);
        let pairs = find_contradictions(&edges);
        assert_eq!(pairs.len(), 1);
        assert!(is_clause_overridden(&edges, "1.1", &add1.id));
        assert!(is_clause_overridden(&edges, "1.1", &add2.id));
    }

    #[test]
    fn test_scope_and_is_clause_overridden() {
        let general = doc(DocumentGroup::Conditions, "General Conditions", 1);
        let add = doc(DocumentGroup::Addendum, "Addendum", 1);
        let chunks = vec![
            chunk(&add, 0, "0", "Intro"),
            chunk(&add, 1, "19.3", "New text"),
            chunk(&general, 0, "19.3", "Old text"),
            chunk(&general, 1, "20.1", "Untouched"),
        ];
        let edges = scope_overrides_to_clauses(
            determine_override_relationships(&[general.clone(), add.clone()]),
            &chunks,
        );
        assert_eq!(edges[0].affected_clauses, Some(vec!["19.3".to_string()]));
        assert!(is_clause_overridden(&edges, "19.3", &general.id));
        assert!(!is_clause_overridden(&edges, "20.1", &general.id));
        assert!(!is_clause_overridden(&edges, "19.3", &add.id));
    }
}
