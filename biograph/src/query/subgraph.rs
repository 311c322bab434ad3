use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{Expansion, NodeRef, Subgraph, SubgraphEdge, SubgraphNode};

/// Turns an expansion into a presentation-ready, deduplicated node and
/// edge list under an overall node cap.
#[derive(Debug, Clone, Copy)]
pub struct SubgraphExtractor {
    max_nodes: usize,
}

impl SubgraphExtractor {
    pub fn new(max_nodes: usize) -> Self {
        Self { max_nodes }
    }

    /// Seeds are admitted first, then the remaining nodes by hop, type, name
    /// and id until the cap is reached. An edge is kept only when both of its
    /// endpoints were admitted.
    pub fn extract(&self, expansion: &Expansion) -> Subgraph {
        let mut ordered: Vec<(&NodeRef, usize, bool)> = expansion
            .nodes
            .iter()
            .map(|(node, reached)| (node, reached.hop, expansion.seeds.contains(node)))
            .collect();
        ordered.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.0.entity_type.cmp(&b.0.entity_type))
                .then_with(|| expansion.nodes[a.0].node.name.cmp(&expansion.nodes[b.0].node.name))
                .then_with(|| a.0.key.cmp(&b.0.key))
        });

        let mut graph: DiGraph<SubgraphNode, SubgraphEdge> = DiGraph::new();
        let mut index: HashMap<&NodeRef, NodeIndex> = HashMap::new();

        for (node, hop, _) in ordered.iter().take(self.max_nodes) {
            let reached = &expansion.nodes[*node];
            let idx = graph.add_node(SubgraphNode {
                id: node.key.clone(),
                entity_type: node.entity_type,
                name: reached.node.name.clone(),
                hop: *hop,
                attributes: reached.node.attributes.clone(),
            });
            index.insert(*node, idx);
        }

        for edge in &expansion.edges {
            let (Some(&from), Some(&to)) = (index.get(&edge.key.from), index.get(&edge.key.to)) else {
                continue;
            };
            let duplicate = graph
                .edges_connecting(from, to)
                .any(|e| e.weight().relation == edge.key.relation);
            if duplicate {
                continue;
            }
            graph.add_edge(
                from,
                to,
                SubgraphEdge {
                    from: edge.key.from.key.clone(),
                    to: edge.key.to.key.clone(),
                    relation: edge.key.relation,
                    evidence: edge.evidence.clone(),
                },
            );
        }

        let dropped = ordered.len().saturating_sub(self.max_nodes);
        let (nodes, edges) = graph.into_nodes_edges();
        let mut edges: Vec<SubgraphEdge> = edges.into_iter().map(|e| e.weight).collect();
        edges.sort_by(|a, b| {
            (a.from.as_str(), a.relation, a.to.as_str()).cmp(&(b.from.as_str(), b.relation, b.to.as_str()))
        });

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            dropped,
            "[Subgraph Extractor] Subgraph extracted"
        );

        Subgraph {
            nodes: nodes.into_iter().map(|n| n.weight).collect(),
            edges,
            truncated: expansion.truncated || dropped > 0,
        }
    }
}

/// Graphviz rendering of a subgraph for diagnostics
pub fn to_dot(subgraph: &Subgraph) -> String {
    let mut graph: DiGraph<String, String> = DiGraph::new();
    let mut index = HashMap::new();
    for node in &subgraph.nodes {
        let idx = graph.add_node(format!("{}: {}", node.entity_type, node.name));
        index.insert(node.id.as_str(), idx);
    }
    for edge in &subgraph.edges {
        if let (Some(&from), Some(&to)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str())) {
            graph.add_edge(from, to, edge.relation.cypher_type().to_string());
        }
    }
    format!("{}", Dot::new(&graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EdgeEvidence, EdgeKey, EntitySummary, EntityType, EvidenceSummary, ExpandedEdge, Provenance,
        ReachedNode, RelationType,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn reached(entity_type: EntityType, id: &str, name: &str, hop: usize) -> (NodeRef, ReachedNode) {
        (
            NodeRef::new(entity_type, id),
            ReachedNode {
                node: EntitySummary {
                    id: id.to_string(),
                    entity_type,
                    name: name.to_string(),
                    aliases: BTreeSet::new(),
                    provenance: Provenance::Curated,
                    attributes: BTreeMap::new(),
                    list_attributes: BTreeMap::new(),
                },
                hop,
            },
        )
    }

    fn expanded(from: &NodeRef, relation: RelationType, to: &NodeRef, hop: usize) -> ExpandedEdge {
        ExpandedEdge {
            key: EdgeKey::new(from.clone(), relation, to.clone()),
            evidence: EvidenceSummary::from(&EdgeEvidence::from_source("test", Provenance::Curated)),
            hop,
        }
    }

    fn expansion() -> Expansion {
        let nodes: BTreeMap<_, _> = [
            reached(EntityType::Biomarker, "biomarker:brca1", "BRCA1", 0),
            reached(EntityType::Disease, "DOID:3458", "Breast adenocarcinoma", 1),
            reached(EntityType::Specimen, "specimen:blood", "blood", 1),
            reached(EntityType::Disease, "DOID:1612", "Breast cancer", 1),
        ]
        .into_iter()
        .collect();
        let brca1 = NodeRef::new(EntityType::Biomarker, "biomarker:brca1");
        let adeno = NodeRef::new(EntityType::Disease, "DOID:3458");
        let cancer = NodeRef::new(EntityType::Disease, "DOID:1612");
        let blood = NodeRef::new(EntityType::Specimen, "specimen:blood");

        Expansion {
            seeds: vec![brca1.clone()],
            edges: vec![
                expanded(&brca1, RelationType::AssociatedWith, &adeno, 1),
                expanded(&brca1, RelationType::AssociatedWith, &cancer, 1),
                expanded(&brca1, RelationType::MeasuredIn, &blood, 1),
                expanded(&adeno, RelationType::DetectedIn, &blood, 2),
            ],
            nodes,
            truncated: false,
        }
    }

    #[test]
    fn test_each_node_appears_once() {
        let subgraph = SubgraphExtractor::new(10).extract(&expansion());
        assert_eq!(subgraph.nodes.len(), 4);
        assert_eq!(subgraph.edges.len(), 4);
        assert!(!subgraph.truncated);

        let ids: BTreeSet<_> = subgraph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), subgraph.nodes.len());
        assert_eq!(subgraph.nodes[0].id, "biomarker:brca1");
    }

    #[test]
    fn test_node_cap_drops_edges_to_missing_nodes() {
        let subgraph = SubgraphExtractor::new(2).extract(&expansion());
        assert!(subgraph.truncated);
        assert_eq!(subgraph.nodes.len(), 2);
        // seed first, then the alphabetically first disease
        assert_eq!(subgraph.nodes[1].name, "Breast adenocarcinoma");
        assert_eq!(subgraph.edges.len(), 1);
        assert_eq!(subgraph.edges[0].relation, RelationType::AssociatedWith);
    }

    #[test]
    fn test_dot_output() {
        let subgraph = SubgraphExtractor::new(10).extract(&expansion());
        let dot = to_dot(&subgraph);
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("Biomarker: BRCA1"));
        assert!(dot.contains("MEASURED_IN"));
    }
}
