use biograph_config::QueryLimits;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::{GraphError, GraphResult};
use crate::graph_db::{GraphStore, Neighbor};
use crate::models::{
    CanonicalEntity, DeviceSummary, EntitySummary, EntityType, EvidenceSummary, Link, MethodSummary,
    NodeRef, RelationType, SearchOutcome, SearchRequest, SearchRow, Subgraph, SubgraphRequest,
};

use super::expansion::{expand, relations_touching};
use super::relevance::SearchField;
use super::subgraph::SubgraphExtractor;

/// A text hit of any type, before filtering
#[derive(Debug, Clone)]
struct RankedHit {
    node: NodeRef,
    name: String,
    score: f64,
}

fn rank(a: &RankedHit, b: &RankedHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.node.cmp(&b.node))
}

fn contains_ci<'a>(values: impl IntoIterator<Item = &'a String>, needle: &str) -> bool {
    let needle = needle.trim().to_lowercase();
    values.into_iter().any(|v| v.to_lowercase().contains(&needle))
}

/// Read-only search, expansion and subgraph queries over a graph store.
/// Holds no per-request state; one engine serves all concurrent requests.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
    limits: QueryLimits,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn GraphStore>, limits: QueryLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Ranked search over names and aliases.
    ///
    /// Rows are ranked by score, then name, then id. Filters run after
    /// ranking and before the limit is applied, so the returned rows are the
    /// best `limit` survivors.
    pub async fn search(&self, request: &SearchRequest) -> GraphResult<SearchOutcome> {
        let term = request.term.trim();
        if term.is_empty() {
            return Err(GraphError::InvalidQuery("search term is empty".to_string()));
        }
        let limit = request
            .limit
            .unwrap_or(self.limits.default_limit)
            .clamp(1, self.limits.max_limit.max(1));

        let types: Vec<EntityType> = if request.entity_types.is_empty() {
            EntityType::ALL.to_vec()
        } else {
            request.entity_types.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
        };

        let mut hits = Vec::new();
        for entity_type in types {
            let found = self
                .store
                .text_search(entity_type, SearchField::NameOrAliases, term, self.limits.candidate_pool)
                .await?;
            hits.extend(found.into_iter().map(|hit| RankedHit {
                node: NodeRef::new(entity_type, hit.key),
                name: hit.name,
                score: hit.score,
            }));
        }
        hits.sort_by(rank);

        // hits whose node cannot be read back are not matches
        let mut matched = hits.len();
        let filters = &request.filters;
        let mut rows = Vec::new();
        for hit in hits {
            if rows.len() >= limit {
                break;
            }
            let Some(entity) = self.store.get_node(&hit.node).await? else {
                warn!(node = %hit.node, term, "⚠️ [Query Engine] Search hit has no stored node, skipped");
                matched -= 1;
                continue;
            };
            if !filters.provenance.admits(entity.provenance) {
                continue;
            }

            let row = self.build_row(&entity, hit.score).await?;
            if let Some(specimen) = &filters.specimen {
                if !contains_ci(&row.specimens, specimen) {
                    continue;
                }
            }
            if let Some(method) = &filters.method {
                if !contains_ci(&row.methods, method) {
                    continue;
                }
            }
            rows.push(row);
        }

        info!(
            term,
            matched,
            returned = rows.len(),
            filtered = !filters.is_empty(),
            "🔎 [Query Engine] Search served"
        );

        // every hit was visited when no row survived, so `matched` is exact
        if matched == 0 {
            debug!(term, "[Query Engine] No matches");
            Ok(SearchOutcome::NoMatches)
        } else if rows.is_empty() {
            Ok(SearchOutcome::AllFiltered { matched })
        } else {
            Ok(SearchOutcome::Matches { rows, matched })
        }
    }

    /// Bounded neighborhood of the top search hits (or explicit seeds),
    /// deduplicated and capped at `max_nodes`.
    pub async fn subgraph(&self, request: &SubgraphRequest) -> GraphResult<Subgraph> {
        let seeds: Vec<NodeRef> = if !request.seeds.is_empty() {
            request.seeds.clone()
        } else if let Some(term) = request.term.as_deref().filter(|t| !t.trim().is_empty()) {
            let outcome = self
                .search(&SearchRequest::new(term).with_limit(self.limits.seed_limit))
                .await?;
            outcome
                .rows()
                .iter()
                .map(|row| NodeRef::new(row.entity.entity_type, row.entity.id.clone()))
                .collect()
        } else {
            return Err(GraphError::InvalidQuery(
                "subgraph needs a search term or seed ids".to_string(),
            ));
        };

        let relations = if request.relation_types.is_empty() {
            RelationType::ALL.to_vec()
        } else {
            request.relation_types.clone()
        };
        let max_nodes = request
            .max_nodes
            .unwrap_or(self.limits.max_nodes)
            .clamp(1, self.limits.max_nodes.max(1));

        let expansion = expand(
            self.store.as_ref(),
            &seeds,
            &relations,
            self.limits.max_hops,
            self.limits.max_neighbors_per_relation,
        )
        .await?;
        let subgraph = SubgraphExtractor::new(max_nodes).extract(&expansion);

        info!(
            seeds = expansion.seeds.len(),
            nodes = subgraph.nodes.len(),
            edges = subgraph.edges.len(),
            truncated = subgraph.truncated,
            "🕸️ [Query Engine] Subgraph served"
        );
        Ok(subgraph)
    }

    /// Detection methods with the number of devices using each, most used
    /// first.
    pub async fn method_summary(&self) -> GraphResult<Vec<MethodSummary>> {
        let mut summary = Vec::new();
        for method in self.store.nodes_of_type(EntityType::Method).await? {
            let counts = self.store.relation_counts(&method.node_ref()).await?;
            summary.push(MethodSummary {
                method: method.name,
                device_count: counts.get(&RelationType::UsesMethod).copied().unwrap_or(0),
            });
        }
        summary.sort_by(|a, b| b.device_count.cmp(&a.device_count).then_with(|| a.method.cmp(&b.method)));
        Ok(summary)
    }

    /// Devices whose detection method name contains `term`
    pub async fn devices_by_method(&self, term: &str, limit: Option<usize>) -> GraphResult<Vec<DeviceSummary>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Err(GraphError::InvalidQuery("method term is empty".to_string()));
        }
        let limit = limit
            .unwrap_or(self.limits.default_limit)
            .clamp(1, self.limits.max_limit.max(1));

        let mut devices = Vec::new();
        for method in self.store.nodes_of_type(EntityType::Method).await? {
            if !method.name.to_lowercase().contains(&needle) {
                continue;
            }
            let users = self
                .store
                .neighbors(&method.node_ref(), &[RelationType::UsesMethod], self.limits.max_limit)
                .await?;
            for user in users {
                let measured = self
                    .store
                    .neighbors(
                        &user.node.node_ref(),
                        &[RelationType::Measures],
                        self.limits.max_neighbors_per_relation,
                    )
                    .await?;
                devices.push(DeviceSummary {
                    device: EntitySummary::from(&user.node),
                    method: method.name.clone(),
                    biomarkers: measured.into_iter().map(|n| n.node.name).collect(),
                });
            }
        }

        devices.sort_by(|a, b| {
            a.device
                .name
                .cmp(&b.device.name)
                .then_with(|| a.device.id.cmp(&b.device.id))
                .then_with(|| a.method.cmp(&b.method))
        });
        devices.truncate(limit);
        Ok(devices)
    }

    async fn build_row(&self, entity: &CanonicalEntity, score: f64) -> GraphResult<SearchRow> {
        let node = entity.node_ref();
        let cap = self.limits.max_neighbors_per_relation;

        let mut neighbors: Vec<Neighbor> = Vec::new();
        for relation in relations_touching(entity.entity_type, &RelationType::ALL) {
            neighbors.extend(self.store.neighbors(&node, &[relation], cap).await?);
        }

        let mut specimens = entity.specimens();
        let mut methods = BTreeSet::new();
        match entity.entity_type {
            EntityType::Specimen => {
                specimens.insert(entity.name.clone());
            }
            EntityType::Method => {
                methods.insert(entity.name.clone());
            }
            _ => {}
        }

        for neighbor in &neighbors {
            match (neighbor.edge.key.relation, neighbor.node.entity_type) {
                (RelationType::MeasuredIn | RelationType::DetectedIn, EntityType::Specimen) => {
                    specimens.insert(neighbor.node.name.clone());
                }
                (RelationType::UsesMethod, EntityType::Method) => {
                    methods.insert(neighbor.node.name.clone());
                }
                // methods of the devices measuring a biomarker
                (RelationType::Measures, EntityType::Device) => {
                    let used = self
                        .store
                        .neighbors(&neighbor.node.node_ref(), &[RelationType::UsesMethod], cap)
                        .await?;
                    methods.extend(used.into_iter().map(|m| m.node.name));
                }
                _ => {}
            }
        }

        Ok(SearchRow {
            entity: EntitySummary::from(entity),
            score,
            related_counts: self.store.relation_counts(&node).await?,
            specimens,
            methods,
            links: neighbors
                .iter()
                .map(|n| Link {
                    relation: n.edge.key.relation,
                    direction: n.direction,
                    other: EntitySummary::from(&n.node),
                    evidence: EvidenceSummary::from(&n.edge.evidence),
                })
                .collect(),
        })
    }
}
