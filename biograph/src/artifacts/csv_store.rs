use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{GraphError, GraphResult};
use crate::graph_db::{merge_edge, merge_node, GraphSnapshot};
use crate::models::{
    AmbiguityRecord, CandidateEntity, CanonicalEntity, EdgeEvidence, EdgeKey, EntityType,
    EvidenceStatus, MergedEdge, NodeRef, Provenance, RelationType,
};

use super::{join_set, split_set};

pub const CANDIDATES_FILE: &str = "normalized_candidates.csv";
pub const ENTITIES_FILE: &str = "resolved_entities.csv";
pub const EDGES_FILE: &str = "merged_edges.csv";
pub const REVIEW_FILE: &str = "review_queue.csv";
pub const REPORT_FILE: &str = "pipeline_report.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CandidateRecord {
    source: String,
    source_id: String,
    role: String,
    row: usize,
    entity_type: EntityType,
    raw_name: String,
    code: Option<String>,
    aliases: String,
    attributes_json: String,
    #[serde(default)]
    derived_attributes_json: String,
    list_attributes_json: String,
    provenance: Provenance,
    inferred_mapping: bool,
}

impl CandidateRecord {
    fn key(&self) -> (String, String, String) {
        (self.source.clone(), self.source_id.clone(), self.role.clone())
    }

    fn from_candidate(candidate: &CandidateEntity) -> GraphResult<Self> {
        Ok(Self {
            source: candidate.key.source.clone(),
            source_id: candidate.source_id.clone(),
            role: candidate.key.role.clone(),
            row: candidate.key.row,
            entity_type: candidate.entity_type,
            raw_name: candidate.raw_name.clone(),
            code: candidate.code.clone(),
            aliases: join_set(&candidate.aliases),
            attributes_json: serde_json::to_string(&candidate.raw_attributes)?,
            derived_attributes_json: serde_json::to_string(&candidate.derived_attributes)?,
            list_attributes_json: serde_json::to_string(&candidate.list_attributes)?,
            provenance: candidate.provenance,
            inferred_mapping: candidate.inferred_mapping,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct EntityRecord {
    entity_type: EntityType,
    canonical_id: String,
    join_key: String,
    name: String,
    aliases: String,
    provenance: Provenance,
    sources: String,
    notes: String,
    attributes_json: String,
    list_attributes_json: String,
}

impl EntityRecord {
    fn from_entity(entity: &CanonicalEntity) -> GraphResult<Self> {
        Ok(Self {
            entity_type: entity.entity_type,
            canonical_id: entity.id.clone(),
            join_key: entity.join_key.clone(),
            name: entity.name.clone(),
            aliases: join_set(&entity.aliases),
            provenance: entity.provenance,
            sources: join_set(&entity.sources),
            notes: join_set(&entity.notes),
            attributes_json: serde_json::to_string(&entity.attributes)?,
            list_attributes_json: serde_json::to_string(&entity.list_attributes)?,
        })
    }

    fn into_entity(self) -> GraphResult<CanonicalEntity> {
        Ok(CanonicalEntity {
            id: self.canonical_id,
            entity_type: self.entity_type,
            join_key: self.join_key,
            name: self.name,
            aliases: split_set(&self.aliases),
            attributes: serde_json::from_str(&self.attributes_json)?,
            list_attributes: serde_json::from_str(&self.list_attributes_json)?,
            provenance: self.provenance,
            sources: split_set(&self.sources),
            notes: split_set(&self.notes),
        })
    }
}

/// Flat evidence columns for reading, `evidence_json` for reloading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct EdgeRecord {
    from_type: EntityType,
    from_id: String,
    relation: RelationType,
    to_type: EntityType,
    to_id: String,
    comention_count: u64,
    literature_query: Option<String>,
    strength: Option<String>,
    evidence_source: Option<String>,
    evidence_status: EvidenceStatus,
    provenance: Provenance,
    sources: String,
    evidence_json: String,
}

impl EdgeRecord {
    fn from_edge(edge: &MergedEdge) -> GraphResult<Self> {
        let evidence = &edge.evidence;
        Ok(Self {
            from_type: edge.key.from.entity_type,
            from_id: edge.key.from.key.clone(),
            relation: edge.key.relation,
            to_type: edge.key.to.entity_type,
            to_id: edge.key.to.key.clone(),
            comention_count: evidence.count(),
            literature_query: evidence.literature_query.as_ref().map(|q| q.value.clone()),
            strength: evidence.strength.as_ref().map(|s| s.value.clone()),
            evidence_source: evidence.evidence_source.as_ref().map(|s| s.value.clone()),
            evidence_status: evidence.status,
            provenance: evidence.provenance,
            sources: join_set(&evidence.sources),
            evidence_json: serde_json::to_string(evidence)?,
        })
    }

    fn into_edge(self) -> GraphResult<MergedEdge> {
        let evidence: EdgeEvidence = serde_json::from_str(&self.evidence_json)?;
        Ok(MergedEdge {
            key: EdgeKey::new(
                NodeRef::new(self.from_type, self.from_id),
                self.relation,
                NodeRef::new(self.to_type, self.to_id),
            ),
            evidence,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ReviewRecord {
    entity_type: EntityType,
    source: String,
    source_id: String,
    join_key: String,
    role: String,
    row: usize,
    raw_name: String,
    matches: String,
}

impl ReviewRecord {
    fn key(&self) -> (EntityType, String, String, String) {
        (self.entity_type, self.source.clone(), self.source_id.clone(), self.join_key.clone())
    }
}

impl From<&AmbiguityRecord> for ReviewRecord {
    fn from(record: &AmbiguityRecord) -> Self {
        Self {
            entity_type: record.entity_type,
            source: record.candidate.source.clone(),
            source_id: record.source_id.clone(),
            join_key: record.join_key.clone(),
            role: record.candidate.role.clone(),
            row: record.candidate.row,
            raw_name: record.raw_name.clone(),
            matches: join_set(&record.matches.iter().cloned().collect()),
        }
    }
}

/// CSV artifacts under one directory. Every write merges with the
/// existing file, sorts by the record key and replaces the file atomically,
/// so a file never loses records it already had.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn open(dir: impl Into<PathBuf>) -> GraphResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            GraphError::Config(format!("cannot create artifacts dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn write_candidates(&self, candidates: &[CandidateEntity]) -> GraphResult<usize> {
        let mut records: BTreeMap<_, CandidateRecord> = self
            .read_records::<CandidateRecord>(CANDIDATES_FILE)?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();
        for candidate in candidates {
            let record = CandidateRecord::from_candidate(candidate)?;
            records.insert(record.key(), record);
        }
        self.write_records(CANDIDATES_FILE, records.values())
    }

    /// Entities already in the file are merged with the incoming version
    pub fn write_entities(&self, entities: &[CanonicalEntity]) -> GraphResult<usize> {
        let mut by_node: BTreeMap<NodeRef, CanonicalEntity> = self
            .load_entities()?
            .into_iter()
            .map(|e| (e.node_ref(), e))
            .collect();
        for entity in entities {
            let (merged, _) = merge_node(by_node.get(&entity.node_ref()), entity);
            by_node.insert(entity.node_ref(), merged);
        }

        let records = by_node
            .values()
            .map(EntityRecord::from_entity)
            .collect::<GraphResult<Vec<_>>>()?;
        self.write_records(ENTITIES_FILE, records.iter())
    }

    pub fn load_entities(&self) -> GraphResult<Vec<CanonicalEntity>> {
        self.read_records::<EntityRecord>(ENTITIES_FILE)?
            .into_iter()
            .map(EntityRecord::into_entity)
            .collect()
    }

    /// Stored evidence is merged with incoming evidence by the edge rules
    pub fn write_edges(&self, edges: &[MergedEdge]) -> GraphResult<usize> {
        let mut by_key: BTreeMap<EdgeKey, EdgeEvidence> = self
            .load_edges()?
            .into_iter()
            .map(|e| (e.key, e.evidence))
            .collect();
        for edge in edges {
            let (merged, _) = merge_edge(by_key.get(&edge.key), edge);
            by_key.insert(merged.key, merged.evidence);
        }

        let records = by_key
            .into_iter()
            .map(|(key, evidence)| EdgeRecord::from_edge(&MergedEdge { key, evidence }))
            .collect::<GraphResult<Vec<_>>>()?;
        self.write_records(EDGES_FILE, records.iter())
    }

    pub fn load_edges(&self) -> GraphResult<Vec<MergedEdge>> {
        self.read_records::<EdgeRecord>(EDGES_FILE)?
            .into_iter()
            .map(EdgeRecord::into_edge)
            .collect()
    }

    pub fn write_review_queue(&self, ambiguities: &[AmbiguityRecord]) -> GraphResult<usize> {
        let mut records: BTreeMap<_, ReviewRecord> = self
            .read_records::<ReviewRecord>(REVIEW_FILE)?
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();
        for ambiguity in ambiguities {
            let record = ReviewRecord::from(ambiguity);
            records.insert(record.key(), record);
        }
        self.write_records(REVIEW_FILE, records.values())
    }

    /// Resolved entities plus merged edges, the content of the memory store
    pub fn load_snapshot(&self) -> GraphResult<GraphSnapshot> {
        let mut snapshot = GraphSnapshot {
            nodes: self.load_entities()?,
            edges: self.load_edges()?,
        };
        snapshot.sort();
        Ok(snapshot)
    }

    pub fn write_report<T: Serialize>(&self, report: &T) -> GraphResult<()> {
        let path = self.path(REPORT_FILE);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(report)?)?;
        std::fs::rename(&tmp, &path)?;
        info!(path = %path.display(), "📝 [Artifacts] Run report written");
        Ok(())
    }

    fn read_records<T: DeserializeOwned>(&self, file: &str) -> GraphResult<Vec<T>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path)?;
        let records = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
        debug!(file, records = records.len(), "[Artifacts] Loaded existing records");
        Ok(records)
    }

    fn write_records<'a, T, I>(&self, file: &str, records: I) -> GraphResult<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let path = self.path(file);
        let tmp = path.with_extension("csv.tmp");

        let mut writer = csv::Writer::from_path(&tmp)?;
        let mut written = 0;
        for record in records {
            writer.serialize(record)?;
            written += 1;
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, &path)?;

        info!(file, records = written, "📝 [Artifacts] Stage artifact written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateKey, Observed, Sequence};
    use std::collections::BTreeSet;

    fn entity(id: &str, name: &str, alias: Option<&str>) -> CanonicalEntity {
        CanonicalEntity {
            id: id.to_string(),
            entity_type: EntityType::Biomarker,
            join_key: name.to_lowercase(),
            name: name.to_string(),
            aliases: alias.map(|a| BTreeSet::from([a.to_string()])).unwrap_or_default(),
            attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance: Provenance::Curated,
            sources: BTreeSet::from(["pairs".to_string()]),
            notes: BTreeSet::new(),
        }
    }

    fn edge(count: u64) -> MergedEdge {
        let mut evidence = EdgeEvidence::from_source("pairs", Provenance::Curated);
        evidence.comention_count = Some(Observed::new(count, Provenance::Curated, Sequence::new(1, 1)));
        evidence.strength = Some(Observed::new("strong".to_string(), Provenance::Curated, Sequence::new(1, 1)));
        evidence.status = EvidenceStatus::Observed;
        MergedEdge {
            key: EdgeKey::new(
                NodeRef::new(EntityType::Biomarker, "biomarker:brca1"),
                RelationType::AssociatedWith,
                NodeRef::new(EntityType::Disease, "DOID:3458"),
            ),
            evidence,
        }
    }

    #[test]
    fn test_entities_merge_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        store.write_entities(&[entity("biomarker:brca1", "BRCA1", Some("BRCC1"))]).unwrap();
        store.write_entities(&[
            entity("biomarker:brca1", "BRCA1", Some("breast cancer gene 1")),
            entity("biomarker:erbb2", "ERBB2", None),
        ])
        .unwrap();

        let loaded = store.load_entities().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "biomarker:brca1");
        assert_eq!(loaded[0].aliases.len(), 2);

        let text = std::fs::read_to_string(store.path(ENTITIES_FILE)).unwrap();
        assert!(text.contains("BRCC1; breast cancer gene 1"));
    }

    #[test]
    fn test_edges_rewrite_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        store.write_edges(&[edge(42)]).unwrap();
        let first = std::fs::read_to_string(store.path(EDGES_FILE)).unwrap();
        store.write_edges(&[edge(42)]).unwrap();
        let second = std::fs::read_to_string(store.path(EDGES_FILE)).unwrap();
        assert_eq!(first, second);

        // a refreshed count overwrites, it does not accumulate
        store.write_edges(&[edge(50)]).unwrap();
        let edges = store.load_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].evidence.count(), 50);
    }

    #[test]
    fn test_candidates_keyed_by_source_id_and_role() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let candidate = CandidateEntity {
            key: CandidateKey {
                source: "pairs".to_string(),
                role: "biomarker".to_string(),
                row: 1,
            },
            entity_type: EntityType::Biomarker,
            source_id: "7".to_string(),
            raw_name: "BRCA1".to_string(),
            code: None,
            aliases: BTreeSet::new(),
            raw_attributes: BTreeMap::new(),
            derived_attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance: Provenance::Curated,
            inferred_mapping: false,
        };
        assert_eq!(store.write_candidates(&[candidate.clone()]).unwrap(), 1);
        assert_eq!(store.write_candidates(&[candidate]).unwrap(), 1);
    }

    #[test]
    fn test_review_queue_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let record = AmbiguityRecord {
            candidate: CandidateKey {
                source: "panel".to_string(),
                role: "biomarker".to_string(),
                row: 3,
            },
            entity_type: EntityType::Biomarker,
            source_id: "row-3".to_string(),
            raw_name: "HER2".to_string(),
            join_key: "name:her2".to_string(),
            matches: vec!["biomarker:erbb2".to_string(), "biomarker:her2 protein".to_string()],
        };
        assert_eq!(store.write_review_queue(&[record]).unwrap(), 1);

        store.write_report(&serde_json::json!({"run": 1})).unwrap();
        assert!(store.path(REPORT_FILE).exists());
    }

    #[test]
    fn test_snapshot_of_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path().join("nested")).unwrap();
        let snapshot = store.load_snapshot().unwrap();
        assert!(snapshot.nodes.is_empty() && snapshot.edges.is_empty());
    }
}
