use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::entity::{CanonicalEntity, EntityType, NodeRef, Provenance};
use super::relationship::{EdgeEvidence, EdgeKey, EvidenceStatus, RelationType};

/// Which provenance a search row must carry to survive filtering
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceMode {
    #[default]
    All,
    ExcludeHeuristic,
    HeuristicOnly,
}

impl ProvenanceMode {
    pub fn admits(&self, provenance: Provenance) -> bool {
        match self {
            ProvenanceMode::All => true,
            ProvenanceMode::ExcludeHeuristic => provenance != Provenance::Heuristic,
            ProvenanceMode::HeuristicOnly => provenance == Provenance::Heuristic,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "" | "all" => Some(ProvenanceMode::All),
            "exclude_heuristic" | "curated" => Some(ProvenanceMode::ExcludeHeuristic),
            "heuristic_only" | "heuristic" => Some(ProvenanceMode::HeuristicOnly),
            _ => None,
        }
    }
}

/// Post-ranking filters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilters {
    /// Case-insensitive substring of a linked specimen name
    pub specimen: Option<String>,
    /// Case-insensitive substring of a reachable detection method name
    pub method: Option<String>,
    #[serde(default)]
    pub provenance: ProvenanceMode,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.specimen.is_none() && self.method.is_none() && self.provenance == ProvenanceMode::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub term: String,
    #[serde(default)]
    pub filters: SearchFilters,
    pub limit: Option<usize>,
    /// Restrict matching to these entity types (all types when empty)
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
}

impl SearchRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            filters: SearchFilters::default(),
            limit: None,
            entity_types: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn of_types(mut self, types: &[EntityType]) -> Self {
        self.entity_types = types.to_vec();
        self
    }
}

/// Presentation-agnostic view of a canonical entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySummary {
    pub id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub aliases: BTreeSet<String>,
    pub provenance: Provenance,
    pub attributes: BTreeMap<String, String>,
    pub list_attributes: BTreeMap<String, BTreeSet<String>>,
}

impl From<&CanonicalEntity> for EntitySummary {
    fn from(entity: &CanonicalEntity) -> Self {
        Self {
            id: entity.id.clone(),
            entity_type: entity.entity_type,
            name: entity.name.clone(),
            aliases: entity.aliases.clone(),
            provenance: entity.provenance,
            attributes: entity
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.value.clone()))
                .collect(),
            list_attributes: entity.list_attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Evidence fields worth showing next to a link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceSummary {
    pub comention_count: u64,
    pub literature_query: Option<String>,
    pub strength: Option<String>,
    pub evidence_source: Option<String>,
    pub status: EvidenceStatus,
    pub provenance: Provenance,
}

impl From<&EdgeEvidence> for EvidenceSummary {
    fn from(evidence: &EdgeEvidence) -> Self {
        Self {
            comention_count: evidence.count(),
            literature_query: evidence.literature_query.as_ref().map(|q| q.value.clone()),
            strength: evidence.strength.as_ref().map(|s| s.value.clone()),
            evidence_source: evidence.evidence_source.as_ref().map(|s| s.value.clone()),
            status: evidence.status,
            provenance: evidence.provenance,
        }
    }
}

/// One direct edge of a search row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub relation: RelationType,
    pub direction: Direction,
    pub other: EntitySummary,
    pub evidence: EvidenceSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRow {
    pub entity: EntitySummary,
    pub score: f64,
    /// Number of edges per relation type touching the entity
    pub related_counts: BTreeMap<RelationType, usize>,
    pub specimens: BTreeSet<String>,
    pub methods: BTreeSet<String>,
    pub links: Vec<Link>,
}

/// Search results. "Nothing matched" and "everything matched was filtered
/// out" are different answers, not errors.
///
/// `matched` counts stored entities among the text hits, which are fetched
/// at most `candidate_pool` per entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Matches { rows: Vec<SearchRow>, matched: usize },
    NoMatches,
    AllFiltered { matched: usize },
}

impl SearchOutcome {
    pub fn rows(&self) -> &[SearchRow] {
        match self {
            SearchOutcome::Matches { rows, .. } => rows,
            _ => &[],
        }
    }
}

/// One edge reached by neighborhood expansion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpandedEdge {
    pub key: EdgeKey,
    pub evidence: EvidenceSummary,
    /// Hop at which the edge was traversed (1-based)
    pub hop: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReachedNode {
    pub node: EntitySummary,
    /// 0 for seeds
    pub hop: usize,
}

/// Output of `expand`: the edge set plus what was learned about its nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expansion {
    pub seeds: Vec<NodeRef>,
    pub edges: Vec<ExpandedEdge>,
    pub nodes: BTreeMap<NodeRef, ReachedNode>,
    /// Some node had more neighbors for a relation than the cap allowed
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubgraphNode {
    pub id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub hop: usize,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubgraphEdge {
    pub from: String,
    pub to: String,
    pub relation: RelationType,
    pub evidence: EvidenceSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
    /// Nodes were dropped to honour the node cap or a neighbor cap
    pub truncated: bool,
}

/// Subgraph request: either a search term or explicit seed nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphRequest {
    pub term: Option<String>,
    #[serde(default)]
    pub seeds: Vec<NodeRef>,
    pub max_nodes: Option<usize>,
    #[serde(default)]
    pub relation_types: Vec<RelationType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodSummary {
    pub method: String,
    pub device_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSummary {
    pub device: EntitySummary,
    pub method: String,
    pub biomarkers: Vec<String>,
}
