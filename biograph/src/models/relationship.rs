use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::entity::{EntityType, NodeRef, Provenance};

/// Typed, directed relationships of the biomarker graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    AssociatedWith,
    MeasuredIn,
    DetectedIn,
    Measures,
    UsesMethod,
}

impl RelationType {
    pub const ALL: [RelationType; 5] = [
        RelationType::AssociatedWith,
        RelationType::MeasuredIn,
        RelationType::DetectedIn,
        RelationType::Measures,
        RelationType::UsesMethod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::AssociatedWith => "associated_with",
            RelationType::MeasuredIn => "measured_in",
            RelationType::DetectedIn => "detected_in",
            RelationType::Measures => "measures",
            RelationType::UsesMethod => "uses_method",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(&['-', ' '][..], "_");
        RelationType::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
    }

    /// Relationship type name in the graph store (SCREAMING_SNAKE_CASE)
    pub fn cypher_type(&self) -> &'static str {
        match self {
            RelationType::AssociatedWith => "ASSOCIATED_WITH",
            RelationType::MeasuredIn => "MEASURED_IN",
            RelationType::DetectedIn => "DETECTED_IN",
            RelationType::Measures => "MEASURES",
            RelationType::UsesMethod => "USES_METHOD",
        }
    }

    pub fn from_cypher_type(s: &str) -> Option<Self> {
        RelationType::ALL.into_iter().find(|r| r.cypher_type() == s)
    }

    /// (source type, target type) every edge of this relation must have
    pub fn endpoints(&self) -> (EntityType, EntityType) {
        match self {
            RelationType::AssociatedWith => (EntityType::Biomarker, EntityType::Disease),
            RelationType::MeasuredIn => (EntityType::Biomarker, EntityType::Specimen),
            RelationType::DetectedIn => (EntityType::Disease, EntityType::Specimen),
            RelationType::Measures => (EntityType::Device, EntityType::Biomarker),
            RelationType::UsesMethod => (EntityType::Device, EntityType::Method),
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cypher_type())
    }
}

/// Identity of an edge: exactly one edge instance exists per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub from: NodeRef,
    pub relation: RelationType,
    pub to: NodeRef,
}

impl EdgeKey {
    pub fn new(from: NodeRef, relation: RelationType, to: NodeRef) -> Self {
        Self { from, relation, to }
    }

    pub fn touches(&self, node: &NodeRef) -> bool {
        &self.from == node || &self.to == node
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.from, self.relation, self.to)
    }
}

/// Observation order inside one pipeline run: source ordinal, then row.
/// Values loaded back from storage carry the zero sequence, so anything
/// observed in the current run counts as later.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sequence {
    pub source_ordinal: u32,
    pub row: u32,
}

impl Sequence {
    pub const STORED: Sequence = Sequence {
        source_ordinal: 0,
        row: 0,
    };

    pub fn new(source_ordinal: u32, row: usize) -> Self {
        Self {
            source_ordinal,
            row: row.min(u32::MAX as usize) as u32,
        }
    }
}

/// A scalar evidence value together with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Observed<T> {
    pub value: T,
    pub provenance: Provenance,
    #[serde(skip)]
    pub seq: Sequence,
}

impl<T> Observed<T> {
    pub fn new(value: T, provenance: Provenance, seq: Sequence) -> Self {
        Self {
            value,
            provenance,
            seq,
        }
    }
}

/// How the co-mention count of an edge came about.
/// Declaration order gives `Observed > LookupFailed > NotQueried`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    #[default]
    NotQueried,
    LookupFailed,
    Observed,
}

impl EvidenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceStatus::NotQueried => "not_queried",
            EvidenceStatus::LookupFailed => "lookup_failed",
            EvidenceStatus::Observed => "observed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "not_queried" => Some(EvidenceStatus::NotQueried),
            "lookup_failed" => Some(EvidenceStatus::LookupFailed),
            "observed" => Some(EvidenceStatus::Observed),
            _ => None,
        }
    }
}

/// Evidence accumulated on one edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EdgeEvidence {
    pub comention_count: Option<Observed<u64>>,
    pub literature_query: Option<Observed<String>>,
    pub strength: Option<Observed<String>>,
    pub evidence_source: Option<Observed<String>>,
    pub status: EvidenceStatus,
    /// Strongest provenance among the observations merged so far
    pub provenance: Provenance,
    pub sources: BTreeSet<String>,
    /// Free-form list-valued evidence (rule ids, specimens, ...)
    pub lists: BTreeMap<String, BTreeSet<String>>,
}

impl EdgeEvidence {
    /// Fresh evidence from one source observation
    pub fn from_source(source: &str, provenance: Provenance) -> Self {
        Self {
            provenance,
            sources: BTreeSet::from([source.to_string()]),
            ..Default::default()
        }
    }

    /// Co-mention count as presented downstream: a missing count reads as 0.
    pub fn count(&self) -> u64 {
        self.comention_count.as_ref().map(|c| c.value).unwrap_or(0)
    }

    pub fn strength_label(&self) -> Option<&str> {
        self.strength.as_ref().map(|s| s.value.as_str())
    }
}

/// The aggregated edge handed to the graph store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergedEdge {
    pub key: EdgeKey,
    pub evidence: EdgeEvidence,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_parsing() {
        assert_eq!(RelationType::from_str("associated-with"), Some(RelationType::AssociatedWith));
        assert_eq!(RelationType::from_str("USES_METHOD"), Some(RelationType::UsesMethod));
        assert_eq!(RelationType::from_cypher_type("MEASURED_IN"), Some(RelationType::MeasuredIn));
        assert_eq!(RelationType::from_str("cites"), None);
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            RelationType::Measures.endpoints(),
            (EntityType::Device, EntityType::Biomarker)
        );
    }

    #[test]
    fn test_evidence_status_ordering() {
        assert!(EvidenceStatus::Observed > EvidenceStatus::LookupFailed);
        assert!(EvidenceStatus::LookupFailed > EvidenceStatus::NotQueried);
    }

    #[test]
    fn test_missing_count_reads_as_zero() {
        let evidence = EdgeEvidence::from_source("pubmed", Provenance::Heuristic);
        assert_eq!(evidence.count(), 0);
    }
}
