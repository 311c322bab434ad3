use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::entity::{EntityType, Provenance};
use super::relationship::{EdgeEvidence, RelationType, Sequence};

/// Identifies one candidate within a run: the role it plays in a row of a
/// source. A row can yield several candidates (biomarker, disease, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey {
    pub source: String,
    pub role: String,
    pub row: usize,
}

impl fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.source, self.role, self.row)
    }
}

/// Canonical candidate-entity record produced by the source normalizer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateEntity {
    pub key: CandidateKey,
    pub entity_type: EntityType,
    /// Source-local identifier (the id column, or "row-N" when absent)
    pub source_id: String,
    pub raw_name: String,
    /// Ontology or registry code supplied by the source or by enrichment
    pub code: Option<String>,
    pub aliases: BTreeSet<String>,
    pub raw_attributes: BTreeMap<String, String>,
    /// Attributes supplied by a collaborator rather than read from the
    /// source row; always recorded as heuristic
    #[serde(default)]
    pub derived_attributes: BTreeMap<String, String>,
    pub list_attributes: BTreeMap<String, BTreeSet<String>>,
    pub provenance: Provenance,
    /// True when the id or name column came from the fallback heuristic
    pub inferred_mapping: bool,
}

/// Literature terms still to be counted for an associated-with edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiteratureTerms {
    pub biomarker: String,
    pub disease: String,
}

/// Canonical candidate-edge record: endpoints are still candidate keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateEdge {
    pub relation: RelationType,
    pub from: CandidateKey,
    pub to: CandidateKey,
    pub evidence: EdgeEvidence,
    #[serde(skip)]
    pub seq: Sequence,
    pub pending_terms: Option<LiteratureTerms>,
}

/// Per-source counters reported by the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceStats {
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub inferred_mappings: usize,
    pub candidates: usize,
    pub edges: usize,
}

/// Everything one source contributes to a run
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub source: String,
    pub ordinal: u32,
    pub candidates: Vec<CandidateEntity>,
    pub edges: Vec<CandidateEdge>,
    pub stats: SourceStats,
}

impl NormalizedBatch {
    pub fn candidate(&self, key: &CandidateKey) -> Option<&CandidateEntity> {
        self.candidates.iter().find(|c| &c.key == key)
    }
}
