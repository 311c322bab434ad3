use async_trait::async_trait;
use biograph_observability::log_db;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::errors::{GraphError, GraphResult};
use crate::models::{
    CanonicalEntity, Direction, EdgeEvidence, EdgeKey, EntityType, MergedEdge, NodeRef, RelationType,
};
use crate::query::relevance::{score_match, SearchField};

use super::{
    merge_edge, merge_node, missing_endpoint, BatchWriteReport, GraphSnapshot, GraphStatistics, GraphStore, Neighbor,
    TextHit, UpsertOutcome, WriteBatch,
};

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<NodeRef, CanonicalEntity>,
    edges: BTreeMap<EdgeKey, EdgeEvidence>,
    adjacency: HashMap<NodeRef, BTreeSet<EdgeKey>>,
}

impl Inner {
    fn put_node(&mut self, entity: &CanonicalEntity) -> UpsertOutcome {
        let node = entity.node_ref();
        let (merged, outcome) = merge_node(self.nodes.get(&node), entity);
        if outcome != UpsertOutcome::Unchanged {
            self.nodes.insert(node, merged);
        }
        outcome
    }

    fn put_edge(&mut self, edge: &MergedEdge) -> GraphResult<UpsertOutcome> {
        if let Some(missing) = missing_endpoint(edge, |node| self.nodes.contains_key(node)) {
            return Err(GraphError::EntityNotFound(missing.to_string()));
        }

        let (merged, outcome) = merge_edge(self.edges.get(&edge.key), edge);
        if outcome == UpsertOutcome::Created {
            self.adjacency
                .entry(edge.key.from.clone())
                .or_default()
                .insert(edge.key.clone());
            self.adjacency
                .entry(edge.key.to.clone())
                .or_default()
                .insert(edge.key.clone());
        }
        if outcome != UpsertOutcome::Unchanged {
            self.edges.insert(merged.key, merged.evidence);
        }
        Ok(outcome)
    }
}

/// Graph store held in process memory. Readers never block each other.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    inner: RwLock<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding exactly the given content
    pub fn from_snapshot(snapshot: GraphSnapshot) -> GraphResult<Self> {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for node in &snapshot.nodes {
                inner.put_node(node);
            }
            for edge in &snapshot.edges {
                inner.put_edge(edge)?;
            }
        }
        debug!(
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "[Memory Store] Loaded snapshot"
        );
        Ok(store)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn initialize(&self) -> GraphResult<()> {
        Ok(())
    }

    async fn upsert_node(&self, entity: &CanonicalEntity) -> GraphResult<UpsertOutcome> {
        let outcome = self.inner.write().put_node(entity);
        log_db!("MERGE", entity.entity_type.label(), &entity.id);
        Ok(outcome)
    }

    async fn upsert_edge(&self, edge: &MergedEdge) -> GraphResult<UpsertOutcome> {
        let outcome = self.inner.write().put_edge(edge)?;
        log_db!("MERGE", edge.key.relation.cypher_type(), edge.key.to_string());
        Ok(outcome)
    }

    async fn write_batch(&self, batch: &WriteBatch) -> GraphResult<BatchWriteReport> {
        let mut report = BatchWriteReport::default();
        let mut inner = self.inner.write();

        for node in &batch.nodes {
            match inner.put_node(node) {
                UpsertOutcome::Unchanged => report.unchanged += 1,
                _ => report.nodes_written += 1,
            }
        }
        for edge in &batch.edges {
            match inner.put_edge(edge) {
                Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
                Ok(_) => report.edges_written += 1,
                Err(e) => {
                    warn!(edge = %edge.key, error = %e, "⚠️ [Memory Store] Edge not written");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn get_node(&self, node: &NodeRef) -> GraphResult<Option<CanonicalEntity>> {
        Ok(self.inner.read().nodes.get(node).cloned())
    }

    async fn nodes_of_type(&self, entity_type: EntityType) -> GraphResult<Vec<CanonicalEntity>> {
        Ok(self
            .inner
            .read()
            .nodes
            .values()
            .filter(|n| n.entity_type == entity_type)
            .cloned()
            .collect())
    }

    async fn text_search(
        &self,
        entity_type: EntityType,
        field: SearchField,
        query: &str,
        limit: usize,
    ) -> GraphResult<Vec<TextHit>> {
        let inner = self.inner.read();
        let mut hits: Vec<TextHit> = inner
            .nodes
            .values()
            .filter(|n| n.entity_type == entity_type)
            .filter_map(|n| {
                score_match(query, field, &n.name, &n.aliases).map(|score| TextHit {
                    key: n.id.clone(),
                    name: n.name.clone(),
                    score,
                })
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn neighbors(
        &self,
        node: &NodeRef,
        relation_types: &[RelationType],
        max_neighbors: usize,
    ) -> GraphResult<Vec<Neighbor>> {
        let inner = self.inner.read();
        let Some(keys) = inner.adjacency.get(node) else {
            return Ok(Vec::new());
        };

        let mut found: Vec<Neighbor> = keys
            .iter()
            .filter(|k| relation_types.contains(&k.relation))
            .filter_map(|key| {
                let (other, direction) = if &key.from == node {
                    (&key.to, Direction::Outgoing)
                } else {
                    (&key.from, Direction::Incoming)
                };
                let other = inner.nodes.get(other)?;
                let evidence = inner.edges.get(key)?;
                Some(Neighbor {
                    edge: MergedEdge {
                        key: key.clone(),
                        evidence: evidence.clone(),
                    },
                    node: other.clone(),
                    direction,
                })
            })
            .collect();

        sort_neighbors(&mut found);
        found.truncate(max_neighbors);
        Ok(found)
    }

    async fn relation_counts(&self, node: &NodeRef) -> GraphResult<BTreeMap<RelationType, usize>> {
        let inner = self.inner.read();
        let mut counts = BTreeMap::new();
        for key in inner.adjacency.get(node).into_iter().flatten() {
            *counts.entry(key.relation).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn statistics(&self) -> GraphResult<GraphStatistics> {
        let inner = self.inner.read();
        let mut stats = GraphStatistics {
            total_nodes: inner.nodes.len(),
            total_edges: inner.edges.len(),
            ..Default::default()
        };
        for node in inner.nodes.keys() {
            *stats.nodes_by_type.entry(node.entity_type).or_insert(0) += 1;
        }
        for key in inner.edges.keys() {
            *stats.edges_by_relation.entry(key.relation).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn export(&self) -> GraphResult<GraphSnapshot> {
        let inner = self.inner.read();
        Ok(GraphSnapshot {
            nodes: inner.nodes.values().cloned().collect(),
            edges: inner
                .edges
                .iter()
                .map(|(key, evidence)| MergedEdge {
                    key: key.clone(),
                    evidence: evidence.clone(),
                })
                .collect(),
        })
    }
}

/// Score descending, then name, then key
pub(crate) fn sort_hits(hits: &mut [TextHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Other node's name, then key, then the edge itself
pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        a.node
            .name
            .cmp(&b.node.name)
            .then_with(|| a.node.id.cmp(&b.node.id))
            .then_with(|| a.edge.key.cmp(&b.edge.key))
    });
}
