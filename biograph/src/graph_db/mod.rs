pub mod memory_store;
pub mod neo4j_client;

pub use memory_store::MemoryGraphStore;
pub use neo4j_client::Neo4jGraphStore;

use async_trait::async_trait;
use biograph_config::StoreConfig;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::GraphResult;
use crate::models::{CanonicalEntity, Direction, EdgeEvidence, EntityType, MergedEdge, NodeRef, RelationType};
use crate::query::relevance::SearchField;

/// One text-search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextHit {
    pub key: String,
    pub name: String,
    pub score: f64,
}

/// An edge touching a node, together with the node at its other end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub edge: MergedEdge,
    pub node: CanonicalEntity,
    /// Direction of the edge as seen from the queried node
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Nodes and edges written together
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub nodes: Vec<CanonicalEntity>,
    pub edges: Vec<MergedEdge>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchWriteReport {
    pub nodes_written: usize,
    pub edges_written: usize,
    pub unchanged: usize,
    /// Write attempts repeated after a conflicting concurrent write
    pub conflicts: usize,
    /// Records that could not be written at all
    pub failed: usize,
}

impl BatchWriteReport {
    pub fn absorb(&mut self, other: &BatchWriteReport) {
        self.nodes_written += other.nodes_written;
        self.edges_written += other.edges_written;
        self.unchanged += other.unchanged;
        self.conflicts += other.conflicts;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub nodes_by_type: BTreeMap<EntityType, usize>,
    pub edges_by_relation: BTreeMap<RelationType, usize>,
}

/// Full, ordered content of a store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphSnapshot {
    pub nodes: Vec<CanonicalEntity>,
    pub edges: Vec<MergedEdge>,
}

impl GraphSnapshot {
    pub fn sort(&mut self) {
        self.nodes.sort_by(|a, b| a.node_ref().cmp(&b.node_ref()));
        self.edges.sort_by(|a, b| a.key.cmp(&b.key));
    }

    /// SHA-256 over the canonical JSON form
    pub fn digest(&self) -> GraphResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Persistence boundary of the graph.
///
/// Upserts are idempotent by node `(type, key)` and edge key, and merge with
/// what is already stored using the same rules as the build pipeline.
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Create constraints and indexes
    async fn initialize(&self) -> GraphResult<()>;

    async fn upsert_node(&self, entity: &CanonicalEntity) -> GraphResult<UpsertOutcome>;

    async fn upsert_edge(&self, edge: &MergedEdge) -> GraphResult<UpsertOutcome>;

    /// Write nodes then edges as one unit. Failures are counted in the
    /// report rather than returned.
    async fn write_batch(&self, batch: &WriteBatch) -> GraphResult<BatchWriteReport>;

    async fn get_node(&self, node: &NodeRef) -> GraphResult<Option<CanonicalEntity>>;

    async fn nodes_of_type(&self, entity_type: EntityType) -> GraphResult<Vec<CanonicalEntity>>;

    /// Nodes of one type matching `query`, best first (score desc, name asc,
    /// key asc), at most `limit`.
    async fn text_search(
        &self,
        entity_type: EntityType,
        field: SearchField,
        query: &str,
        limit: usize,
    ) -> GraphResult<Vec<TextHit>>;

    /// Edges of the given relation types touching `node`, in both
    /// directions, ordered by the other node's name then key, at most
    /// `max_neighbors`.
    async fn neighbors(
        &self,
        node: &NodeRef,
        relation_types: &[RelationType],
        max_neighbors: usize,
    ) -> GraphResult<Vec<Neighbor>>;

    /// Number of edges per relation type touching `node`
    async fn relation_counts(&self, node: &NodeRef) -> GraphResult<BTreeMap<RelationType, usize>>;

    async fn statistics(&self) -> GraphResult<GraphStatistics>;

    async fn export(&self) -> GraphResult<GraphSnapshot>;

    async fn content_digest(&self) -> GraphResult<String> {
        self.export().await?.digest()
    }
}

/// Merge an incoming node onto its stored version
pub fn merge_node(stored: Option<&CanonicalEntity>, incoming: &CanonicalEntity) -> (CanonicalEntity, UpsertOutcome) {
    match stored {
        None => (incoming.clone(), UpsertOutcome::Created),
        Some(stored) => {
            let mut merged = stored.clone();
            merged.absorb(incoming);
            merged.join_key = incoming.join_key.clone();
            let outcome = if &merged == stored {
                UpsertOutcome::Unchanged
            } else {
                UpsertOutcome::Updated
            };
            (merged, outcome)
        }
    }
}

/// Merge an incoming edge onto its stored evidence
pub fn merge_edge(stored: Option<&EdgeEvidence>, incoming: &MergedEdge) -> (MergedEdge, UpsertOutcome) {
    let merged = EdgeEvidence::merged_onto(stored.cloned(), &incoming.evidence);
    let outcome = match stored {
        None => UpsertOutcome::Created,
        Some(stored) if stored == &merged => UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    };
    (
        MergedEdge {
            key: incoming.key.clone(),
            evidence: merged,
        },
        outcome,
    )
}

/// Endpoint of `edge` that is not a known node. Both stores refuse such an
/// edge and count it as failed.
pub fn missing_endpoint<F>(edge: &MergedEdge, exists: F) -> Option<&NodeRef>
where
    F: Fn(&NodeRef) -> bool,
{
    [&edge.key.from, &edge.key.to].into_iter().find(|node| !exists(node))
}

/// Build the configured store. The connection handle is created once here
/// and shared by every pipeline stage or request handler.
pub async fn connect(config: &StoreConfig) -> GraphResult<Arc<dyn GraphStore>> {
    match config {
        StoreConfig::Neo4j(neo4j) => Ok(Arc::new(Neo4jGraphStore::connect(neo4j).await?)),
        StoreConfig::Memory => Ok(Arc::new(MemoryGraphStore::new())),
    }
}
