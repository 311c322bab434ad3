use async_trait::async_trait;
use biograph_config::Neo4jConfig;
use biograph_observability::log_db;
use neo4rs::{query, ConfigBuilder, Graph, Node, Query};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::errors::{GraphError, GraphResult};
use crate::models::{
    CanonicalEntity, Direction, EdgeEvidence, EdgeKey, EntityType, MergedEdge, NodeRef, Provenance,
    RelationType,
};
use crate::query::relevance::{cypher_tier, score_match, SearchField};

use super::memory_store::{sort_hits, sort_neighbors};
use super::{
    merge_edge, merge_node, missing_endpoint, BatchWriteReport, GraphSnapshot, GraphStatistics, GraphStore, Neighbor,
    TextHit, UpsertOutcome, WriteBatch,
};

const MAX_WRITE_ATTEMPTS: usize = 3;

/// Neo4j-backed graph store.
///
/// Nodes are `(:Label {key})`, edges `(a)-[:REL]->(b)`; structured
/// attributes and evidence travel as JSON strings next to the flat
/// properties Cypher queries filter on.
pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
    uri: String,
}

impl Neo4jGraphStore {
    pub async fn connect(config: &Neo4jConfig) -> GraphResult<Self> {
        info!("🔷 Connecting to Neo4j at: {}", config.uri);

        let neo4j_config = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str())
            .db(config.database.as_str())
            .fetch_size(config.fetch_size)
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| GraphError::Neo4j(format!("Failed to build Neo4j config: {}", e)))?;

        let graph = Graph::connect(neo4j_config)
            .await
            .map_err(|e| GraphError::Neo4j(format!("Failed to connect to Neo4j: {}", e)))?;

        let mut result = graph
            .execute(query("RETURN 1 as test"))
            .await
            .map_err(|e| GraphError::Neo4j(format!("Connection test failed: {}", e)))?;
        if result.next().await?.is_some() {
            info!("✅ Neo4j connection established successfully");
        }

        Ok(Self {
            graph: Arc::new(graph),
            uri: config.uri.clone(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    async fn fetch_nodes(&self, cypher: Query) -> GraphResult<Vec<CanonicalEntity>> {
        let mut result = self.graph.execute(cypher).await?;
        let mut nodes = Vec::new();
        while let Some(row) = result.next().await? {
            let node: Node = row.get("n").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let label: String = row.get("label").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let entity_type = EntityType::from_label(&label)
                .ok_or_else(|| GraphError::InvalidEntityType(label.clone()))?;
            nodes.push(node_to_entity(entity_type, &node)?);
        }
        Ok(nodes)
    }

    async fn stored_nodes(&self, nodes: &[CanonicalEntity]) -> GraphResult<HashMap<NodeRef, CanonicalEntity>> {
        let mut keys_by_type: BTreeMap<EntityType, Vec<String>> = BTreeMap::new();
        for node in nodes {
            keys_by_type.entry(node.entity_type).or_default().push(node.id.clone());
        }

        let mut stored = HashMap::new();
        for (entity_type, keys) in keys_by_type {
            let cypher = format!(
                "MATCH (n:{}) WHERE n.key IN $keys RETURN n, '{}' AS label",
                entity_type.label(),
                entity_type.label()
            );
            for entity in self.fetch_nodes(query(&cypher).param("keys", keys)).await? {
                stored.insert(entity.node_ref(), entity);
            }
        }
        Ok(stored)
    }

    /// Which of `nodes` are already stored
    async fn existing_nodes(&self, nodes: BTreeSet<NodeRef>) -> GraphResult<BTreeSet<NodeRef>> {
        let mut keys_by_type: BTreeMap<EntityType, Vec<String>> = BTreeMap::new();
        for node in nodes {
            keys_by_type.entry(node.entity_type).or_default().push(node.key);
        }

        let mut existing = BTreeSet::new();
        for (entity_type, keys) in keys_by_type {
            let cypher = format!("MATCH (n:{}) WHERE n.key IN $keys RETURN n.key AS key", entity_type.label());
            let mut result = self.graph.execute(query(&cypher).param("keys", keys)).await?;
            while let Some(row) = result.next().await? {
                let key: String = row.get("key").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                existing.insert(NodeRef::new(entity_type, key));
            }
        }
        Ok(existing)
    }

    async fn stored_edges(&self, edges: &[MergedEdge]) -> GraphResult<HashMap<EdgeKey, EdgeEvidence>> {
        let mut sources_by_relation: BTreeMap<RelationType, BTreeSet<String>> = BTreeMap::new();
        for edge in edges {
            sources_by_relation
                .entry(edge.key.relation)
                .or_default()
                .insert(edge.key.from.key.clone());
        }

        let mut stored = HashMap::new();
        for (relation, sources) in sources_by_relation {
            let (from_type, to_type) = relation.endpoints();
            let cypher = format!(
                "MATCH (a:{})-[r:{}]->(b:{}) WHERE a.key IN $keys \
                 RETURN a.key AS from_key, b.key AS to_key, r.evidence_json AS evidence",
                from_type.label(),
                relation.cypher_type(),
                to_type.label()
            );
            let mut result = self
                .graph
                .execute(query(&cypher).param("keys", sources.into_iter().collect::<Vec<_>>()))
                .await?;
            while let Some(row) = result.next().await? {
                let from: String = row.get("from_key").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                let to: String = row.get("to_key").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                let evidence: String = row.get("evidence").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                stored.insert(
                    EdgeKey::new(NodeRef::new(from_type, from), relation, NodeRef::new(to_type, to)),
                    serde_json::from_str(&evidence)?,
                );
            }
        }
        Ok(stored)
    }

    /// Read current state, merge in Rust, write everything in one
    /// transaction.
    async fn write_once(&self, batch: &WriteBatch) -> GraphResult<BatchWriteReport> {
        let stored_nodes = self.stored_nodes(&batch.nodes).await?;
        let stored_edges = self.stored_edges(&batch.edges).await?;

        // MATCH on an absent endpoint makes the edge MERGE a silent no-op
        let mut known: BTreeSet<NodeRef> = batch.nodes.iter().map(CanonicalEntity::node_ref).collect();
        let unseen: BTreeSet<NodeRef> = batch
            .edges
            .iter()
            .flat_map(|e| [e.key.from.clone(), e.key.to.clone()])
            .filter(|node| !known.contains(node))
            .collect();
        known.extend(self.existing_nodes(unseen).await?);

        let mut report = BatchWriteReport::default();
        let mut queries = Vec::with_capacity(batch.nodes.len() + batch.edges.len());

        for node in &batch.nodes {
            let (merged, outcome) = merge_node(stored_nodes.get(&node.node_ref()), node);
            if outcome == UpsertOutcome::Unchanged {
                report.unchanged += 1;
                continue;
            }
            queries.push(node_query(&merged)?);
            report.nodes_written += 1;
        }

        for edge in &batch.edges {
            if let Some(missing) = missing_endpoint(edge, |node| known.contains(node)) {
                warn!(edge = %edge.key, missing = %missing, "⚠️ [Neo4j] Edge not written, endpoint missing");
                report.failed += 1;
                continue;
            }
            let (merged, outcome) = merge_edge(stored_edges.get(&edge.key), edge);
            if outcome == UpsertOutcome::Unchanged {
                report.unchanged += 1;
                continue;
            }
            queries.push(edge_query(&merged)?);
            report.edges_written += 1;
        }

        if queries.is_empty() {
            return Ok(report);
        }

        let mut txn = self.graph.start_txn().await?;
        match txn.run_queries(queries).await {
            Ok(()) => txn.commit().await?,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "⚠️ [Neo4j] Rollback failed");
                }
                return Err(GraphError::GraphWriteConflict(e.to_string()));
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn initialize(&self) -> GraphResult<()> {
        for entity_type in EntityType::ALL {
            let label = entity_type.label();
            let constraint = format!(
                "CREATE CONSTRAINT {}_key IF NOT EXISTS FOR (n:{}) REQUIRE n.key IS UNIQUE",
                entity_type.as_str(),
                label
            );
            self.graph.run(query(&constraint)).await?;
            let index = format!(
                "CREATE INDEX {}_name IF NOT EXISTS FOR (n:{}) ON (n.name)",
                entity_type.as_str(),
                label
            );
            self.graph.run(query(&index)).await?;
        }
        info!("✅ [Neo4j] Constraints and indexes ensured");
        Ok(())
    }

    async fn upsert_node(&self, entity: &CanonicalEntity) -> GraphResult<UpsertOutcome> {
        let node = entity.node_ref();
        let stored = self.get_node(&node).await?;
        let (merged, outcome) = merge_node(stored.as_ref(), entity);
        if outcome != UpsertOutcome::Unchanged {
            self.graph.run(node_query(&merged)?).await?;
        }
        log_db!("MERGE", entity.entity_type.label(), &entity.id);
        Ok(outcome)
    }

    async fn upsert_edge(&self, edge: &MergedEdge) -> GraphResult<UpsertOutcome> {
        let endpoints = BTreeSet::from([edge.key.from.clone(), edge.key.to.clone()]);
        let existing = self.existing_nodes(endpoints).await?;
        if let Some(missing) = missing_endpoint(edge, |node| existing.contains(node)) {
            return Err(GraphError::EntityNotFound(missing.to_string()));
        }
        let stored = self.stored_edges(std::slice::from_ref(edge)).await?;
        let (merged, outcome) = merge_edge(stored.get(&edge.key), edge);
        if outcome != UpsertOutcome::Unchanged {
            self.graph.run(edge_query(&merged)?).await?;
        }
        log_db!("MERGE", edge.key.relation.cypher_type(), edge.key.to_string());
        Ok(outcome)
    }

    async fn write_batch(&self, batch: &WriteBatch) -> GraphResult<BatchWriteReport> {
        if batch.is_empty() {
            return Ok(BatchWriteReport::default());
        }

        let started = Instant::now();
        let mut conflicts = 0;
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            match self.write_once(batch).await {
                Ok(mut report) => {
                    report.conflicts = conflicts;
                    log_db!(
                        "WRITE_BATCH",
                        "batch",
                        format!("{} nodes, {} edges", batch.nodes.len(), batch.edges.len()),
                        started.elapsed().as_millis() as u64
                    );
                    return Ok(report);
                }
                Err(e @ GraphError::GraphWriteConflict(_)) => {
                    conflicts += 1;
                    warn!(attempt, error = %e, "⚠️ [Neo4j] Write conflict, re-reading and retrying batch");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "⚠️ [Neo4j] Batch write failed");
                    break;
                }
            }
        }

        Ok(BatchWriteReport {
            conflicts,
            failed: batch.nodes.len() + batch.edges.len(),
            ..Default::default()
        })
    }

    async fn get_node(&self, node: &NodeRef) -> GraphResult<Option<CanonicalEntity>> {
        let cypher = format!(
            "MATCH (n:{} {{key: $key}}) RETURN n, '{}' AS label",
            node.entity_type.label(),
            node.entity_type.label()
        );
        Ok(self
            .fetch_nodes(query(&cypher).param("key", node.key.clone()))
            .await?
            .into_iter()
            .next())
    }

    async fn nodes_of_type(&self, entity_type: EntityType) -> GraphResult<Vec<CanonicalEntity>> {
        let cypher = format!(
            "MATCH (n:{}) RETURN n, '{}' AS label ORDER BY n.key",
            entity_type.label(),
            entity_type.label()
        );
        self.fetch_nodes(query(&cypher)).await
    }

    async fn text_search(
        &self,
        entity_type: EntityType,
        field: SearchField,
        text: &str,
        limit: usize,
    ) -> GraphResult<Vec<TextHit>> {
        let needle = crate::entity_resolution::normalize_name(text);
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let condition = match field {
            SearchField::Name => "toLower(n.name) CONTAINS $q",
            SearchField::Aliases => "any(a IN coalesce(n.aliases, []) WHERE toLower(a) CONTAINS $q)",
            SearchField::NameOrAliases => {
                "toLower(n.name) CONTAINS $q OR any(a IN coalesce(n.aliases, []) WHERE toLower(a) CONTAINS $q)"
            }
        };
        let cypher = format!(
            "MATCH (n:{}) WHERE {} \
             RETURN n.key AS key, n.name AS name, coalesce(n.aliases, []) AS aliases \
             ORDER BY {}, size(n.name), n.name, n.key \
             LIMIT $pool",
            entity_type.label(),
            condition,
            cypher_tier(field)
        );

        // over-fetch so Rust-side scoring sees the whole candidate pool
        let pool = (limit.saturating_mul(4)).max(limit) as i64;
        let mut result = self
            .graph
            .execute(query(&cypher).param("q", needle).param("pool", pool))
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = result.next().await? {
            let key: String = row.get("key").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let name: String = row.get("name").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let aliases: Vec<String> = row.get("aliases").unwrap_or_default();
            if let Some(score) = score_match(text, field, &name, &aliases) {
                hits.push(TextHit { key, name, score });
            }
        }

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
        if relation_types.is_empty() || max_neighbors == 0 {
            return Ok(Vec::new());
        }
        let types = relation_types
            .iter()
            .map(|r| r.cypher_type())
            .collect::<Vec<_>>()
            .join("|");
        let cypher = format!(
            "MATCH (a:{} {{key: $key}})-[r:{}]-(n) \
             RETURN n, labels(n)[0] AS label, type(r) AS rel, startNode(r) = a AS outgoing, \
                    r.evidence_json AS evidence \
             ORDER BY n.name, n.key, type(r) \
             LIMIT $max",
            node.entity_type.label(),
            types
        );

        let mut result = self
            .graph
            .execute(
                query(&cypher)
                    .param("key", node.key.clone())
                    .param("max", max_neighbors as i64),
            )
            .await?;

        let mut found = Vec::new();
        while let Some(row) = result.next().await? {
            let other: Node = row.get("n").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let label: String = row.get("label").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let rel: String = row.get("rel").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let outgoing: bool = row.get("outgoing").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let evidence: String = row.get("evidence").map_err(|e| GraphError::Neo4j(e.to_string()))?;

            let entity_type =
                EntityType::from_label(&label).ok_or_else(|| GraphError::InvalidEntityType(label.clone()))?;
            let relation =
                RelationType::from_cypher_type(&rel).ok_or_else(|| GraphError::InvalidRelationType(rel.clone()))?;
            let other = node_to_entity(entity_type, &other)?;

            let (key, direction) = if outgoing {
                (EdgeKey::new(node.clone(), relation, other.node_ref()), Direction::Outgoing)
            } else {
                (EdgeKey::new(other.node_ref(), relation, node.clone()), Direction::Incoming)
            };
            found.push(Neighbor {
                edge: MergedEdge {
                    key,
                    evidence: serde_json::from_str(&evidence)?,
                },
                node: other,
                direction,
            });
        }

        sort_neighbors(&mut found);
        Ok(found)
    }

    async fn relation_counts(&self, node: &NodeRef) -> GraphResult<BTreeMap<RelationType, usize>> {
        let cypher = format!(
            "MATCH (a:{} {{key: $key}})-[r]-() RETURN type(r) AS rel, count(r) AS count",
            node.entity_type.label()
        );
        let mut result = self
            .graph
            .execute(query(&cypher).param("key", node.key.clone()))
            .await?;

        let mut counts = BTreeMap::new();
        while let Some(row) = result.next().await? {
            let rel: String = row.get("rel").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            let count: i64 = row.get("count").map_err(|e| GraphError::Neo4j(e.to_string()))?;
            if let Some(relation) = RelationType::from_cypher_type(&rel) {
                counts.insert(relation, count.max(0) as usize);
            }
        }
        Ok(counts)
    }

    async fn statistics(&self) -> GraphResult<GraphStatistics> {
        let mut stats = GraphStatistics::default();

        for entity_type in EntityType::ALL {
            let cypher = format!("MATCH (n:{}) RETURN count(n) AS count", entity_type.label());
            let mut result = self.graph.execute(query(&cypher)).await?;
            if let Some(row) = result.next().await? {
                let count: i64 = row.get("count").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                if count > 0 {
                    stats.nodes_by_type.insert(entity_type, count as usize);
                    stats.total_nodes += count as usize;
                }
            }
        }

        for relation in RelationType::ALL {
            let cypher = format!("MATCH ()-[r:{}]->() RETURN count(r) AS count", relation.cypher_type());
            let mut result = self.graph.execute(query(&cypher)).await?;
            if let Some(row) = result.next().await? {
                let count: i64 = row.get("count").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                if count > 0 {
                    stats.edges_by_relation.insert(relation, count as usize);
                    stats.total_edges += count as usize;
                }
            }
        }

        Ok(stats)
    }

    async fn export(&self) -> GraphResult<GraphSnapshot> {
        let mut snapshot = GraphSnapshot::default();
        for entity_type in EntityType::ALL {
            snapshot.nodes.extend(self.nodes_of_type(entity_type).await?);
        }

        for relation in RelationType::ALL {
            let (from_type, to_type) = relation.endpoints();
            let cypher = format!(
                "MATCH (a:{})-[r:{}]->(b:{}) \
                 RETURN a.key AS from_key, b.key AS to_key, r.evidence_json AS evidence",
                from_type.label(),
                relation.cypher_type(),
                to_type.label()
            );
            let mut result = self.graph.execute(query(&cypher)).await?;
            while let Some(row) = result.next().await? {
                let from: String = row.get("from_key").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                let to: String = row.get("to_key").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                let evidence: String = row.get("evidence").map_err(|e| GraphError::Neo4j(e.to_string()))?;
                snapshot.edges.push(MergedEdge {
                    key: EdgeKey::new(NodeRef::new(from_type, from), relation, NodeRef::new(to_type, to)),
                    evidence: serde_json::from_str(&evidence)?,
                });
            }
        }

        snapshot.sort();
        Ok(snapshot)
    }
}

fn node_query(entity: &CanonicalEntity) -> GraphResult<Query> {
    let cypher = format!(
        "MERGE (n:{} {{key: $key}}) \
         SET n.name = $name, n.join_key = $join_key, n.aliases = $aliases, \
             n.provenance = $provenance, n.sources = $sources, n.notes = $notes, \
             n.attributes_json = $attributes_json, n.list_attributes_json = $list_attributes_json",
        entity.entity_type.label()
    );
    Ok(query(&cypher)
        .param("key", entity.id.clone())
        .param("name", entity.name.clone())
        .param("join_key", entity.join_key.clone())
        .param("aliases", entity.aliases.iter().cloned().collect::<Vec<_>>())
        .param("provenance", entity.provenance.as_str())
        .param("sources", entity.sources.iter().cloned().collect::<Vec<_>>())
        .param("notes", entity.notes.iter().cloned().collect::<Vec<_>>())
        .param("attributes_json", serde_json::to_string(&entity.attributes)?)
        .param("list_attributes_json", serde_json::to_string(&entity.list_attributes)?))
}

fn edge_query(edge: &MergedEdge) -> GraphResult<Query> {
    let key = &edge.key;
    let evidence = &edge.evidence;
    let cypher = format!(
        "MATCH (a:{} {{key: $from}}), (b:{} {{key: $to}}) \
         MERGE (a)-[r:{}]->(b) \
         SET r.evidence_json = $evidence_json, r.comention_count = $comention_count, \
             r.strength = $strength, r.evidence_source = $evidence_source, \
             r.literature_query = $literature_query, r.provenance = $provenance, \
             r.evidence_status = $status",
        key.from.entity_type.label(),
        key.to.entity_type.label(),
        key.relation.cypher_type()
    );
    let label = |value: &Option<crate::models::Observed<String>>| {
        value.as_ref().map(|v| v.value.clone()).unwrap_or_default()
    };

    Ok(query(&cypher)
        .param("from", key.from.key.clone())
        .param("to", key.to.key.clone())
        .param("evidence_json", serde_json::to_string(evidence)?)
        .param("comention_count", evidence.count() as i64)
        .param("strength", label(&evidence.strength))
        .param("evidence_source", label(&evidence.evidence_source))
        .param("literature_query", label(&evidence.literature_query))
        .param("provenance", evidence.provenance.as_str())
        .param("status", evidence.status.as_str()))
}

fn node_to_entity(entity_type: EntityType, node: &Node) -> GraphResult<CanonicalEntity> {
    let text = |field: &str| -> GraphResult<String> {
        node.get::<String>(field)
            .map_err(|e| GraphError::Neo4j(format!("node property '{}': {}", field, e)))
    };
    let list = |field: &str| -> BTreeSet<String> {
        node.get::<Vec<String>>(field)
            .map(|v| v.into_iter().collect())
            .unwrap_or_default()
    };
    let json_or_empty = |field: &str| node.get::<String>(field).unwrap_or_else(|_| "{}".to_string());

    let id = text("key")?;
    Ok(CanonicalEntity {
        join_key: node.get::<String>("join_key").unwrap_or_else(|_| id.clone()),
        name: text("name")?,
        aliases: list("aliases"),
        attributes: serde_json::from_str(&json_or_empty("attributes_json"))?,
        list_attributes: serde_json::from_str(&json_or_empty("list_attributes_json"))?,
        provenance: node
            .get::<String>("provenance")
            .ok()
            .and_then(|p| Provenance::from_str(&p))
            .unwrap_or_default(),
        sources: list("sources"),
        notes: list("notes"),
        entity_type,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_config() -> Option<Neo4jConfig> {
        Neo4jConfig::from_env().ok()
    }

    #[tokio::test]
    #[ignore = "needs a running Neo4j (NEO4J_URI / NEO4J_USER / NEO4J_PASSWORD)"]
    async fn test_round_trip_against_live_database() {
        let Some(config) = live_config() else {
            return;
        };
        let store = Neo4jGraphStore::connect(&config).await.unwrap();
        store.initialize().await.unwrap();

        let entity = CanonicalEntity {
            id: "biomarker:integration-test".to_string(),
            entity_type: EntityType::Biomarker,
            join_key: "integration-test".to_string(),
            name: "integration-test".to_string(),
            aliases: BTreeSet::from(["it".to_string()]),
            attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance: Provenance::Curated,
            sources: BTreeSet::from(["test".to_string()]),
            notes: BTreeSet::new(),
        };
        store.upsert_node(&entity).await.unwrap();
        assert_eq!(store.upsert_node(&entity).await.unwrap(), UpsertOutcome::Unchanged);

        let fetched = store.get_node(&entity.node_ref()).await.unwrap().unwrap();
        assert_eq!(fetched, entity);
    }

    #[tokio::test]
    #[ignore = "needs a running Neo4j (NEO4J_URI / NEO4J_USER / NEO4J_PASSWORD)"]
    async fn test_edge_without_endpoint_counted_as_failed() {
        let Some(config) = live_config() else {
            return;
        };
        let store = Neo4jGraphStore::connect(&config).await.unwrap();
        store.initialize().await.unwrap();

        let edge = MergedEdge {
            key: EdgeKey::new(
                NodeRef::new(EntityType::Biomarker, "biomarker:integration-orphan"),
                RelationType::MeasuredIn,
                NodeRef::new(EntityType::Specimen, "specimen:integration-nowhere"),
            ),
            evidence: EdgeEvidence::from_source("test", Provenance::Curated),
        };
        let report = store
            .write_batch(&WriteBatch {
                nodes: Vec::new(),
                edges: vec![edge.clone()],
            })
            .await
            .unwrap();
        assert_eq!(report.edges_written, 0);
        assert_eq!(report.failed, 1);
        assert!(matches!(store.upsert_edge(&edge).await, Err(GraphError::EntityNotFound(_))));
    }
}
