use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::errors::GraphResult;
use crate::graph_db::GraphStore;
use crate::models::{
    EdgeKey, EntitySummary, EntityType, EvidenceSummary, ExpandedEdge, Expansion, NodeRef,
    ReachedNode, RelationType,
};

/// Relation types of `allowed` that can touch a node of `entity_type`
pub(crate) fn relations_touching(entity_type: EntityType, allowed: &[RelationType]) -> Vec<RelationType> {
    allowed
        .iter()
        .copied()
        .filter(|r| {
            let (from, to) = r.endpoints();
            from == entity_type || to == entity_type
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Breadth-first neighborhood expansion.
///
/// At most `max_hops` hops from the seeds and at most
/// `max_neighbors_per_relation` neighbors per node and relation type. The
/// kept subset of a high-degree node is the store's neighbor order (other
/// node's name, then key), so repeated calls return identical results.
/// Seeds that do not exist in the store are skipped.
pub async fn expand(
    store: &dyn GraphStore,
    seeds: &[NodeRef],
    relation_types: &[RelationType],
    max_hops: usize,
    max_neighbors_per_relation: usize,
) -> GraphResult<Expansion> {
    let mut expansion = Expansion::default();
    let mut frontier: BTreeSet<NodeRef> = BTreeSet::new();

    for seed in seeds {
        if expansion.nodes.contains_key(seed) {
            continue;
        }
        match store.get_node(seed).await? {
            Some(entity) => {
                expansion.seeds.push(seed.clone());
                expansion.nodes.insert(
                    seed.clone(),
                    ReachedNode {
                        node: EntitySummary::from(&entity),
                        hop: 0,
                    },
                );
                frontier.insert(seed.clone());
            }
            None => debug!(seed = %seed, "[Expansion] Unknown seed skipped"),
        }
    }

    let mut edges: BTreeMap<EdgeKey, ExpandedEdge> = BTreeMap::new();

    for hop in 1..=max_hops {
        if frontier.is_empty() || max_neighbors_per_relation == 0 {
            break;
        }
        let mut next = BTreeSet::new();

        for node in &frontier {
            for relation in relations_touching(node.entity_type, relation_types) {
                // one extra neighbor tells us whether the cap cut anything off
                let mut neighbors = store
                    .neighbors(node, &[relation], max_neighbors_per_relation + 1)
                    .await?;
                if neighbors.len() > max_neighbors_per_relation {
                    expansion.truncated = true;
                    neighbors.truncate(max_neighbors_per_relation);
                }

                for neighbor in neighbors {
                    let other = neighbor.node.node_ref();
                    edges.entry(neighbor.edge.key.clone()).or_insert_with(|| ExpandedEdge {
                        key: neighbor.edge.key.clone(),
                        evidence: EvidenceSummary::from(&neighbor.edge.evidence),
                        hop,
                    });
                    if !expansion.nodes.contains_key(&other) {
                        expansion.nodes.insert(
                            other.clone(),
                            ReachedNode {
                                node: EntitySummary::from(&neighbor.node),
                                hop,
                            },
                        );
                        next.insert(other);
                    }
                }
            }
        }

        frontier = next;
    }

    let mut edges: Vec<ExpandedEdge> = edges.into_values().collect();
    edges.sort_by(|a, b| a.hop.cmp(&b.hop).then_with(|| a.key.cmp(&b.key)));
    expansion.edges = edges;

    debug!(
        seeds = expansion.seeds.len(),
        nodes = expansion.nodes.len(),
        edges = expansion.edges.len(),
        truncated = expansion.truncated,
        "[Expansion] Neighborhood expanded"
    );
    Ok(expansion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_db::{MemoryGraphStore, WriteBatch};
    use crate::models::{CanonicalEntity, EdgeEvidence, MergedEdge, Provenance};
    use std::collections::BTreeMap;

    fn entity(entity_type: EntityType, id: &str, name: &str) -> CanonicalEntity {
        CanonicalEntity {
            id: id.to_string(),
            entity_type,
            join_key: name.to_lowercase(),
            name: name.to_string(),
            aliases: BTreeSet::new(),
            attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance: Provenance::Curated,
            sources: BTreeSet::from(["test".to_string()]),
            notes: BTreeSet::new(),
        }
    }

    fn edge(from: &CanonicalEntity, relation: RelationType, to: &CanonicalEntity) -> MergedEdge {
        MergedEdge {
            key: EdgeKey::new(from.node_ref(), relation, to.node_ref()),
            evidence: EdgeEvidence::from_source("test", Provenance::Curated),
        }
    }

    /// BRCA1 -> 4 diseases -> blood; device -> BRCA1
    async fn graph() -> (MemoryGraphStore, CanonicalEntity) {
        let store = MemoryGraphStore::new();
        let brca1 = entity(EntityType::Biomarker, "biomarker:brca1", "BRCA1");
        let blood = entity(EntityType::Specimen, "specimen:blood", "blood");
        let device = entity(EntityType::Device, "device:kit", "BRCA kit");

        let mut batch = WriteBatch {
            nodes: vec![brca1.clone(), blood.clone(), device.clone()],
            edges: vec![
                edge(&brca1, RelationType::MeasuredIn, &blood),
                edge(&device, RelationType::Measures, &brca1),
            ],
        };
        for (i, name) in ["Delta", "Alpha", "Charlie", "Bravo"].iter().enumerate() {
            let disease = entity(EntityType::Disease, &format!("DOID:{}", i), name);
            batch.edges.push(edge(&brca1, RelationType::AssociatedWith, &disease));
            batch.edges.push(edge(&disease, RelationType::DetectedIn, &blood));
            batch.nodes.push(disease);
        }
        store.write_batch(&batch).await.unwrap();
        (store, brca1)
    }

    #[tokio::test]
    async fn test_one_hop_respects_cap_deterministically() {
        let (store, brca1) = graph().await;
        let seeds = vec![brca1.node_ref()];

        let first = expand(&store, &seeds, &[RelationType::AssociatedWith], 1, 2).await.unwrap();
        let second = expand(&store, &seeds, &[RelationType::AssociatedWith], 1, 2).await.unwrap();

        assert!(first.truncated);
        assert_eq!(first, second);
        let names: Vec<_> = first
            .nodes
            .values()
            .filter(|n| n.hop == 1)
            .map(|n| n.node.name.clone())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Alpha".to_string()) && names.contains(&"Bravo".to_string()));
    }

    #[tokio::test]
    async fn test_hops_bound_traversal_and_nodes_are_unique() {
        let (store, brca1) = graph().await;
        let seeds = vec![brca1.node_ref()];

        let one = expand(&store, &seeds, &RelationType::ALL, 1, 10).await.unwrap();
        assert!(one.nodes.values().all(|n| n.hop <= 1));
        assert_eq!(one.nodes.len(), 7);

        let two = expand(&store, &seeds, &RelationType::ALL, 2, 10).await.unwrap();
        // blood is reached via measured_in and via four detected_in paths
        assert_eq!(two.nodes.len(), 7);
        assert_eq!(two.edges.len(), 10);
        assert!(!two.truncated);
    }

    #[tokio::test]
    async fn test_unknown_seed_skipped() {
        let (store, _) = graph().await;
        let seeds = vec![NodeRef::new(EntityType::Biomarker, "biomarker:nope")];
        let expansion = expand(&store, &seeds, &RelationType::ALL, 2, 10).await.unwrap();
        assert!(expansion.seeds.is_empty());
        assert!(expansion.edges.is_empty());
    }

    #[test]
    fn test_relations_touching() {
        let relations = relations_touching(EntityType::Specimen, &RelationType::ALL);
        assert_eq!(relations, vec![RelationType::MeasuredIn, RelationType::DetectedIn]);
    }
}
