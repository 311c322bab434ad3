use biograph_config::AppConfig;
use biograph_observability::{build_run_span, log_timed, Instrument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::collaborators::{
    DeviceLinkRule, KeywordDeviceRegistry, LiteratureSource, OntologyResolver, OntologyTable, PubmedClient,
};
use crate::entity_resolution::EntityResolver;
use crate::errors::GraphResult;
use crate::graph_db::{BatchWriteReport, GraphStore, WriteBatch};
use crate::knowledge_fusion::EdgeAggregator;
use crate::models::{attrs, CandidateEntity, MergedEdge, NormalizedBatch, RelationType, SourceStats};
use crate::normalization::{normalize_sources, SourcesFile};

use super::enrichment::{Collaborators, Enricher, EnrichmentReport};

/// Records per store write unit
const WRITE_CHUNK: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReport {
    pub name: String,
    #[serde(flatten)]
    pub stats: SourceStats,
    /// Set when the source could not be read at all
    pub error: Option<String>,
}

/// Everything a build run did, written next to the artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub candidates: usize,
    pub entities_created: usize,
    pub entities_merged: usize,
    pub entities_rekeyed: usize,
    pub ambiguous: usize,
    pub edges_merged: usize,
    pub edges_unresolved: usize,
    pub edge_type_mismatches: usize,
    pub enrichment: EnrichmentReport,
    pub writes: BatchWriteReport,
    pub content_digest: String,
}

impl PipelineReport {
    pub fn rows_dropped(&self) -> usize {
        self.sources.iter().map(|s| s.stats.rows_dropped).sum()
    }
}

/// Wire the collaborators named by the configuration. The keyword registry
/// needs no setup and is always present.
pub fn collaborators_from_config(config: &AppConfig) -> GraphResult<Collaborators> {
    let ontology: Option<Arc<dyn OntologyResolver>> = match &config.pipeline.ontology_table {
        Some(path) => Some(Arc::new(OntologyTable::from_path(path)?)),
        None => {
            warn!("⚠️ [Build Pipeline] No ontology table configured, disease names are used as keys");
            None
        }
    };
    let literature: Option<Arc<dyn LiteratureSource>> = if config.literature.enabled {
        Some(Arc::new(PubmedClient::new(&config.literature)?))
    } else {
        info!("[Build Pipeline] Literature lookups disabled");
        None
    };
    let device_rules = match &config.pipeline.device_rules {
        Some(path) => DeviceLinkRule::load(path)?,
        None => Vec::new(),
    };

    Ok(Collaborators {
        ontology,
        registry: Some(Arc::new(KeywordDeviceRegistry)),
        literature,
        device_rules,
    })
}

/// The batch build: normalize, enrich, resolve, aggregate, persist.
///
/// Every stage boundary is written to the artifacts directory. Row, lookup
/// and write failures are counted in the report; only an unusable artifacts
/// directory or store aborts the run.
pub struct BuildPipeline {
    sources: SourcesFile,
    artifacts: ArtifactStore,
    store: Arc<dyn GraphStore>,
    enricher: Enricher,
}

impl BuildPipeline {
    pub fn new(sources: SourcesFile, artifacts: ArtifactStore, store: Arc<dyn GraphStore>, enricher: Enricher) -> Self {
        Self {
            sources,
            artifacts,
            store,
            enricher,
        }
    }

    pub async fn run(&self) -> GraphResult<PipelineReport> {
        let run_id = Uuid::new_v4();
        self.execute(run_id).instrument(build_run_span(&run_id)).await
    }

    async fn execute(&self, run_id: Uuid) -> GraphResult<PipelineReport> {
        let started_at = Utc::now();
        info!(
            sources = self.sources.sources.len(),
            store = self.store.backend(),
            "🏗️ [Build Pipeline] Run started"
        );

        let (mut batches, sources) = log_timed!("normalize", self.normalize());

        let enrichment = log_timed!(
            "enrich",
            self.enricher.enrich(&mut batches, &self.sources.comention).await
        );

        let candidates: Vec<CandidateEntity> = batches.iter().flat_map(|b| b.candidates.iter().cloned()).collect();
        self.artifacts.write_candidates(&candidates)?;

        let mut resolver = EntityResolver::with_existing(self.artifacts.load_entities()?);
        let resolution = log_timed!("resolve", resolver.resolve(&candidates));
        self.artifacts.write_review_queue(&resolution.ambiguities)?;

        let aggregator = EdgeAggregator::new();
        log_timed!("aggregate", {
            for batch in &batches {
                aggregator.observe_batch(&batch.edges, &resolution);
            }
        });
        let edges_unresolved = aggregator.unresolved();
        let edge_type_mismatches = aggregator.type_mismatches();
        let edges = aggregator.into_merged();

        annotate_specimens(&mut resolver, &edges);
        debug!(
            touched = resolver.touched_entities().len(),
            total = resolver.len(),
            "🧬 [Entity Resolver] Entities changed this run"
        );

        let entities: Vec<_> = resolver.entities().cloned().collect();
        self.artifacts.write_entities(&entities)?;
        self.artifacts.write_edges(&edges)?;

        let writes = log_timed!("persist", self.persist(WriteBatch { nodes: entities, edges: edges.clone() }).await?);
        let content_digest = self.store.content_digest().await?;

        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources,
            candidates: candidates.len(),
            entities_created: resolution.created,
            entities_merged: resolution.merged,
            entities_rekeyed: resolution.rekeyed,
            ambiguous: resolution.ambiguities.len(),
            edges_merged: edges.len(),
            edges_unresolved,
            edge_type_mismatches,
            enrichment,
            writes,
            content_digest,
        };
        self.artifacts.write_report(&report)?;

        info!(
            candidates = report.candidates,
            rows_dropped = report.rows_dropped(),
            created = report.entities_created,
            merged = report.entities_merged,
            ambiguous = report.ambiguous,
            edges = report.edges_merged,
            failed_writes = report.writes.failed,
            digest = %report.content_digest,
            "✅ [Build Pipeline] Run finished"
        );
        Ok(report)
    }

    /// A source that cannot be read is reported and left out of the run
    fn normalize(&self) -> (Vec<NormalizedBatch>, Vec<SourceReport>) {
        let mut batches = Vec::new();
        let mut reports = Vec::new();

        for (name, result) in normalize_sources(&self.sources.sources) {
            match result {
                Ok(batch) => {
                    reports.push(SourceReport {
                        name,
                        stats: batch.stats.clone(),
                        error: None,
                    });
                    batches.push(batch);
                }
                Err(e) => {
                    error!(source = %name, error = %e, "❌ [Build Pipeline] Source skipped");
                    reports.push(SourceReport {
                        name,
                        stats: SourceStats::default(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        (batches, reports)
    }

    /// Nodes first so every edge finds its endpoints
    async fn persist(&self, batch: WriteBatch) -> GraphResult<BatchWriteReport> {
        self.store.initialize().await?;

        let mut report = BatchWriteReport::default();
        for nodes in batch.nodes.chunks(WRITE_CHUNK) {
            let chunk = WriteBatch {
                nodes: nodes.to_vec(),
                edges: Vec::new(),
            };
            report.absorb(&self.store.write_batch(&chunk).await?);
        }
        for edges in batch.edges.chunks(WRITE_CHUNK) {
            let chunk = WriteBatch {
                nodes: Vec::new(),
                edges: edges.to_vec(),
            };
            report.absorb(&self.store.write_batch(&chunk).await?);
        }

        if report.failed > 0 {
            warn!(failed = report.failed, "⚠️ [Build Pipeline] Some records could not be written");
        }
        Ok(report)
    }
}

/// Biomarkers list the specimens they are measured in
fn annotate_specimens(resolver: &mut EntityResolver, edges: &[MergedEdge]) {
    let mut specimens: BTreeMap<_, Vec<String>> = BTreeMap::new();
    for edge in edges.iter().filter(|e| e.key.relation == RelationType::MeasuredIn) {
        if let Some(specimen) = resolver.get(&edge.key.to) {
            specimens.entry(edge.key.from.clone()).or_default().push(specimen.name.clone());
        }
    }
    for (node, names) in specimens {
        if let Some(biomarker) = resolver.entity_mut(&node) {
            biomarker.extend_list(attrs::SPECIMENS, names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_db::MemoryGraphStore;
    use crate::models::{EntityType, NodeRef};
    use biograph_config::LookupConfig;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn sources(dir: &Path) -> SourcesFile {
        let markers = write(
            dir,
            "markers.csv",
            "marker_id,marker_name,specimen\n1,BRCA1,Blood\n2,,Saliva\n3,TP53,blood\n",
        );
        let config = serde_json::json!({
            "sources": [{
                "name": "markers",
                "path": markers,
                "provenance": "curated",
                "roles": [
                    {"role": "biomarker", "entity_type": "biomarker", "id_field": "marker_id", "name_field": "marker_name", "required": true},
                    {"role": "specimen", "entity_type": "specimen", "name_field": "specimen"}
                ],
                "edges": [{"relation": "measured_in", "from": "biomarker", "to": "specimen"}]
            }, {
                "name": "missing",
                "path": dir.join("does_not_exist.csv"),
                "provenance": "heuristic",
                "roles": [{"role": "biomarker", "entity_type": "biomarker"}]
            }]
        });
        serde_json::from_value(config).unwrap()
    }

    fn pipeline(dir: &Path, store: Arc<dyn GraphStore>) -> BuildPipeline {
        let artifacts = ArtifactStore::open(dir.join("artifacts")).unwrap();
        let enricher = Enricher::new(
            Collaborators::default(),
            LookupConfig {
                max_attempts: 1,
                backoff_ms: 1,
                concurrency: 1,
            },
        );
        BuildPipeline::new(sources(dir), artifacts, store, enricher)
    }

    #[tokio::test]
    async fn test_run_reports_drops_and_unreadable_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());
        let report = pipeline(dir.path(), store.clone()).run().await.unwrap();

        assert_eq!(report.rows_dropped(), 1);
        assert!(report.sources[1].error.is_some());
        // BRCA1, TP53, blood
        assert_eq!(report.entities_created, 3);
        assert_eq!(report.edges_merged, 2);

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.nodes_by_type[&EntityType::Specimen], 1);

        let brca1 = store
            .nodes_of_type(EntityType::Biomarker)
            .await
            .unwrap()
            .into_iter()
            .find(|b| b.name == "BRCA1")
            .unwrap();
        assert!(brca1.specimens().contains("blood"));
        assert!(dir.path().join("artifacts").join(crate::artifacts::REPORT_FILE).exists());
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn GraphStore> = Arc::new(MemoryGraphStore::new());

        let first = pipeline(dir.path(), store.clone()).run().await.unwrap();
        let second = pipeline(dir.path(), store.clone()).run().await.unwrap();

        assert_eq!(first.content_digest, second.content_digest);
        assert_eq!(second.entities_created, 0);
        assert_eq!(second.writes.nodes_written + second.writes.edges_written, 0);

        let ids: Vec<NodeRef> = store
            .nodes_of_type(EntityType::Biomarker)
            .await
            .unwrap()
            .iter()
            .map(|b| b.node_ref())
            .collect();
        assert_eq!(ids.len(), 2);
    }
}
