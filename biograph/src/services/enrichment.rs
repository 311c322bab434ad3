use biograph_config::LookupConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::collaborators::{
    BatchLookup, DeviceLinkRule, DeviceRegistry, LiteratureSource, LookupOutcome, OntologyResolver,
};
use crate::entity_resolution::{is_ontology_code, normalize_name};
use crate::models::{
    attrs, CandidateEdge, CandidateEntity, CandidateKey, EdgeEvidence, EntityType, EvidenceStatus,
    LiteratureTerms, NormalizedBatch, Observed, Provenance, RelationType, Sequence,
};
use crate::normalization::{literature_query, ComentionPlan};

pub const REGISTRY_EVIDENCE: &str = "registry_keyword";
pub const DEVICE_RULE_EVIDENCE: &str = "device_name_rule";
pub const COMENTION_EVIDENCE: &str = "pubmed_comention";
pub const COMENTION_STRENGTH: &str = "weak";
/// Evidence list holding the ids of the device rules behind a link
pub const RULE_IDS: &str = "rule_ids";

/// External evidence sources wired into a build. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub ontology: Option<Arc<dyn OntologyResolver>>,
    pub registry: Option<Arc<dyn DeviceRegistry>>,
    pub literature: Option<Arc<dyn LiteratureSource>>,
    pub device_rules: Vec<DeviceLinkRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub diseases_resolved: usize,
    pub methods_inferred: usize,
    pub device_links: usize,
    pub counts_observed: usize,
    pub comention_edges: usize,
    /// Lookups that still failed after the last retry pass, per collaborator
    pub lookup_failures: BTreeMap<String, usize>,
}

impl EnrichmentReport {
    fn failed(&mut self, service: &str, count: usize) {
        if count > 0 {
            *self.lookup_failures.entry(service.to_string()).or_default() += count;
        }
    }
}

/// Adds collaborator evidence to normalized batches before resolution
pub struct Enricher {
    collaborators: Collaborators,
    lookup: BatchLookup,
}

impl Enricher {
    pub fn new(collaborators: Collaborators, lookup: LookupConfig) -> Self {
        Self {
            collaborators,
            lookup: BatchLookup::new(lookup),
        }
    }

    pub async fn enrich(&self, batches: &mut [NormalizedBatch], plans: &[ComentionPlan]) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();

        self.resolve_diseases(batches, &mut report).await;
        self.classify_devices(batches, &mut report).await;
        self.link_devices(batches, &mut report);
        self.count_pending(batches, &mut report).await;
        for plan in plans {
            self.build_comentions(batches, plan, &mut report).await;
        }

        info!(
            diseases_resolved = report.diseases_resolved,
            methods_inferred = report.methods_inferred,
            device_links = report.device_links,
            counts_observed = report.counts_observed,
            comention_edges = report.comention_edges,
            lookup_failures = report.lookup_failures.values().sum::<usize>(),
            "🧪 [Enrichment] Collaborator evidence attached"
        );
        report
    }

    /// Well-formed source codes are trusted; anything else that sat in the
    /// code column is kept as `source_code` and the name is resolved instead.
    async fn resolve_diseases(&self, batches: &mut [NormalizedBatch], report: &mut EnrichmentReport) {
        let mut keys = BTreeSet::new();
        for candidate in diseases_mut(batches) {
            if let Some(code) = candidate.code.take() {
                if is_ontology_code(&code) {
                    candidate.code = Some(code.trim().to_string());
                } else {
                    candidate.raw_attributes.insert(attrs::SOURCE_CODE.to_string(), code);
                }
            }
            keys.insert(ontology_key(candidate));
        }

        let Some(ontology) = self.collaborators.ontology.clone() else {
            return;
        };
        let outcomes = self
            .lookup
            .run(ontology.name(), keys, |key: String| {
                let ontology = ontology.clone();
                async move { ontology.resolve(&key).await }
            })
            .await;
        report.failed(ontology.name(), outcomes.values().filter(|o| o.is_failed()).count());

        for candidate in diseases_mut(batches) {
            let Some(found) = outcomes.get(&ontology_key(candidate)).and_then(LookupOutcome::found) else {
                continue;
            };
            let Some(id) = &found.canonical_id else {
                continue;
            };
            candidate.code = Some(id.clone());
            let name = candidate.raw_name.clone();
            candidate
                .aliases
                .extend(found.synonyms.iter().filter(|s| !s.eq_ignore_ascii_case(&name)).cloned());
            if let Some(term_name) = &found.name {
                if !term_name.eq_ignore_ascii_case(&name) {
                    candidate.aliases.insert(term_name.clone());
                }
            }
            if !found.parent_ids.is_empty() {
                candidate
                    .list_attributes
                    .entry(attrs::PARENT_IDS.to_string())
                    .or_default()
                    .extend(found.parent_ids.iter().cloned());
            }
            if let Some(flag) = found.category_flag {
                candidate
                    .derived_attributes
                    .insert(attrs::CANCER_LIKE.to_string(), flag.to_string());
            }
            report.diseases_resolved += 1;
        }
    }

    /// Registry record fields become device attributes; the inferred method
    /// becomes a Method candidate linked by a heuristic uses-method edge.
    async fn classify_devices(&self, batches: &mut [NormalizedBatch], report: &mut EnrichmentReport) {
        let Some(registry) = self.collaborators.registry.clone() else {
            return;
        };

        let names: BTreeSet<String> = batches
            .iter()
            .flat_map(|b| b.candidates.iter())
            .filter(|c| c.entity_type == EntityType::Device)
            .map(|c| c.raw_name.clone())
            .collect();
        let outcomes = self
            .lookup
            .run(registry.name(), names, |name: String| {
                let registry = registry.clone();
                async move { registry.lookup(&name).await }
            })
            .await;
        report.failed(registry.name(), outcomes.values().filter(|o| o.is_failed()).count());

        for batch in batches.iter_mut() {
            let linked: BTreeSet<CandidateKey> = batch
                .edges
                .iter()
                .filter(|e| e.relation == RelationType::UsesMethod)
                .map(|e| e.from.clone())
                .collect();

            let mut methods = Vec::new();
            let mut edges = Vec::new();
            for device in batch.candidates.iter_mut().filter(|c| c.entity_type == EntityType::Device) {
                let Some(record) = outcomes.get(&device.raw_name).and_then(LookupOutcome::found) else {
                    continue;
                };
                for (field, value) in &record.structured {
                    device.derived_attributes.insert(field.clone(), value.clone());
                }
                let Some(method) = record.method.as_deref().filter(|m| !m.trim().is_empty()) else {
                    continue;
                };
                if linked.contains(&device.key) {
                    continue;
                }

                let seq = Sequence::new(batch.ordinal, device.key.row);
                let method_candidate = derived_candidate(
                    device,
                    format!("{}#method", device.key.role),
                    EntityType::Method,
                    format!("{}#method", device.source_id),
                    method,
                );
                let mut evidence = EdgeEvidence::from_source(registry.name(), Provenance::Heuristic);
                evidence.evidence_source =
                    Some(Observed::new(REGISTRY_EVIDENCE.to_string(), Provenance::Heuristic, seq));
                edges.push(CandidateEdge {
                    relation: RelationType::UsesMethod,
                    from: device.key.clone(),
                    to: method_candidate.key.clone(),
                    evidence,
                    seq,
                    pending_terms: None,
                });
                methods.push(method_candidate);
            }

            report.methods_inferred += methods.len();
            batch.candidates.extend(methods);
            batch.edges.extend(edges);
        }
    }

    /// Device name rules: a device whose name holds every token of a rule
    /// measures the rule's biomarker.
    fn link_devices(&self, batches: &mut [NormalizedBatch], report: &mut EnrichmentReport) {
        let rules = &self.collaborators.device_rules;
        if rules.is_empty() {
            return;
        }

        for batch in batches.iter_mut() {
            let mut biomarkers = Vec::new();
            let mut edges = Vec::new();
            for device in batch.candidates.iter().filter(|c| c.entity_type == EntityType::Device) {
                for rule in rules.iter().filter(|r| r.matches(&device.raw_name)) {
                    let seq = Sequence::new(batch.ordinal, device.key.row);
                    let biomarker = derived_candidate(
                        device,
                        format!("{}#rule{}", device.key.role, rule.rule_id),
                        EntityType::Biomarker,
                        format!("rule-{}", rule.rule_id),
                        &rule.biomarker_name,
                    );

                    let mut evidence = EdgeEvidence::from_source(DEVICE_RULE_EVIDENCE, Provenance::Heuristic);
                    evidence.evidence_source =
                        Some(Observed::new(DEVICE_RULE_EVIDENCE.to_string(), Provenance::Heuristic, seq));
                    evidence
                        .lists
                        .insert(RULE_IDS.to_string(), BTreeSet::from([rule.rule_id.to_string()]));

                    debug!(device = %device.raw_name, biomarker = %rule.biomarker_name, rule = rule.rule_id, "[Enrichment] Device rule matched");
                    edges.push(CandidateEdge {
                        relation: RelationType::Measures,
                        from: device.key.clone(),
                        to: biomarker.key.clone(),
                        evidence,
                        seq,
                        pending_terms: None,
                    });
                    biomarkers.push(biomarker);
                }
            }

            report.device_links += edges.len();
            batch.candidates.extend(biomarkers);
            batch.edges.extend(edges);
        }
    }

    /// Literature counts for associated-with edges that arrived without one.
    /// A lookup that keeps failing leaves the count absent and marks the
    /// edge; the edge itself is kept.
    async fn count_pending(&self, batches: &mut [NormalizedBatch], report: &mut EnrichmentReport) {
        let terms: BTreeSet<LiteratureTerms> = batches
            .iter()
            .flat_map(|b| b.edges.iter())
            .filter_map(|e| e.pending_terms.clone())
            .collect();
        if terms.is_empty() {
            return;
        }
        let Some(literature) = self.collaborators.literature.clone() else {
            debug!(pending = terms.len(), "[Enrichment] No literature source, counts left unqueried");
            return;
        };

        let outcomes = self.count_terms(&literature, terms).await;
        report.failed(literature.name(), outcomes.values().filter(|o| o.is_failed()).count());

        for edge in batches.iter_mut().flat_map(|b| b.edges.iter_mut()) {
            let Some(terms) = edge.pending_terms.take() else {
                continue;
            };
            match outcomes.get(&terms) {
                Some(LookupOutcome::Found(count)) => {
                    edge.evidence.comention_count =
                        Some(Observed::new(*count, edge.evidence.provenance, edge.seq));
                    edge.evidence.status = EvidenceStatus::Observed;
                    report.counts_observed += 1;
                }
                Some(LookupOutcome::Failed { .. }) => {
                    edge.evidence.status = edge.evidence.status.max(EvidenceStatus::LookupFailed);
                }
                None => {}
            }
        }
    }

    /// Cross the biomarkers of one source with the diseases of another and
    /// keep the pairs the literature supports, as weak heuristic edges.
    async fn build_comentions(
        &self,
        batches: &mut [NormalizedBatch],
        plan: &ComentionPlan,
        report: &mut EnrichmentReport,
    ) {
        let Some(literature) = self.collaborators.literature.clone() else {
            debug!(plan = %plan.name, "[Enrichment] No literature source, co-mention plan skipped");
            return;
        };

        let biomarkers = distinct_by_name(batches, &plan.biomarker_source, &plan.biomarker_role);
        let diseases = distinct_by_name(batches, &plan.disease_source, &plan.disease_role);
        let strategy = plan.term_strategy.strategy();

        let mut pairs: Vec<(&CandidateEntity, &CandidateEntity, LiteratureTerms)> = Vec::new();
        'outer: for biomarker in &biomarkers {
            for disease in &diseases {
                if plan.max_pairs.is_some_and(|max| pairs.len() >= max) {
                    break 'outer;
                }
                let terms = LiteratureTerms {
                    biomarker: strategy.biomarker_term(&biomarker.raw_name),
                    disease: strategy.disease_term(&disease.raw_name),
                };
                pairs.push((biomarker, disease, terms));
            }
        }
        if pairs.is_empty() {
            return;
        }

        let outcomes = self
            .count_terms(&literature, pairs.iter().map(|(_, _, t)| t.clone()))
            .await;
        report.failed(literature.name(), outcomes.values().filter(|o| o.is_failed()).count());

        let source = format!("comention:{}", plan.name);
        let mut edges = Vec::new();
        for (biomarker, disease, terms) in &pairs {
            let seq = Sequence::new(
                batches
                    .iter()
                    .find(|b| b.source == plan.biomarker_source)
                    .map(|b| b.ordinal)
                    .unwrap_or_default(),
                biomarker.key.row,
            );
            let observed = |value: &str| Observed::new(value.to_string(), Provenance::Heuristic, seq);

            let mut evidence = EdgeEvidence::from_source(&source, Provenance::Heuristic);
            evidence.strength = Some(observed(COMENTION_STRENGTH));
            evidence.evidence_source = Some(observed(COMENTION_EVIDENCE));
            evidence.literature_query = Some(observed(&literature_query(&terms.biomarker, &terms.disease)));

            match outcomes.get(terms) {
                Some(LookupOutcome::Found(count)) if *count >= plan.min_count => {
                    evidence.comention_count = Some(Observed::new(*count, Provenance::Heuristic, seq));
                    evidence.status = EvidenceStatus::Observed;
                }
                Some(LookupOutcome::Failed { .. }) => evidence.status = EvidenceStatus::LookupFailed,
                _ => continue,
            }

            edges.push(CandidateEdge {
                relation: RelationType::AssociatedWith,
                from: biomarker.key.clone(),
                to: disease.key.clone(),
                evidence,
                seq,
                pending_terms: None,
            });
        }

        info!(
            plan = %plan.name,
            pairs = pairs.len(),
            edges = edges.len(),
            "🔗 [Enrichment] Co-mention edges built"
        );
        report.comention_edges += edges.len();
        if let Some(batch) = batches.iter_mut().find(|b| b.source == plan.biomarker_source) {
            batch.edges.extend(edges);
        }
    }

    async fn count_terms(
        &self,
        literature: &Arc<dyn LiteratureSource>,
        terms: impl IntoIterator<Item = LiteratureTerms>,
    ) -> BTreeMap<LiteratureTerms, LookupOutcome<u64>> {
        self.lookup
            .run(literature.name(), terms, |terms: LiteratureTerms| {
                let literature = literature.clone();
                async move { literature.count(&terms.biomarker, &terms.disease).await }
            })
            .await
    }
}

fn diseases_mut(batches: &mut [NormalizedBatch]) -> impl Iterator<Item = &mut CandidateEntity> {
    batches
        .iter_mut()
        .flat_map(|b| b.candidates.iter_mut())
        .filter(|c| c.entity_type == EntityType::Disease)
}

fn ontology_key(candidate: &CandidateEntity) -> String {
    candidate.code.clone().unwrap_or_else(|| candidate.raw_name.trim().to_string())
}

/// A candidate implied by another one (method of a device, biomarker of a
/// device rule). It shares the row of its origin under a derived role.
fn derived_candidate(
    origin: &CandidateEntity,
    role: String,
    entity_type: EntityType,
    source_id: String,
    name: &str,
) -> CandidateEntity {
    CandidateEntity {
        key: CandidateKey {
            source: origin.key.source.clone(),
            role,
            row: origin.key.row,
        },
        entity_type,
        source_id,
        raw_name: name.trim().to_string(),
        code: None,
        aliases: BTreeSet::new(),
        raw_attributes: BTreeMap::new(),
        derived_attributes: BTreeMap::new(),
        list_attributes: BTreeMap::new(),
        provenance: Provenance::Heuristic,
        inferred_mapping: false,
    }
}

/// Candidates of one role, first occurrence per normalized name
fn distinct_by_name(batches: &[NormalizedBatch], source: &str, role: &str) -> Vec<CandidateEntity> {
    let mut seen = BTreeSet::new();
    let mut out: Vec<CandidateEntity> = batches
        .iter()
        .filter(|b| b.source == source)
        .flat_map(|b| b.candidates.iter())
        .filter(|c| c.key.role == role)
        .filter(|c| seen.insert(normalize_name(&c.raw_name)))
        .cloned()
        .collect();
    out.sort_by(|a, b| normalize_name(&a.raw_name).cmp(&normalize_name(&b.raw_name)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{KeywordDeviceRegistry, OntologyTable};
    use crate::errors::{GraphError, GraphResult};
    use async_trait::async_trait;

    struct FixedLiterature {
        fail: bool,
    }

    #[async_trait]
    impl LiteratureSource for FixedLiterature {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn count(&self, term_a: &str, term_b: &str) -> GraphResult<u64> {
            if self.fail {
                Err(GraphError::external("fixed", term_a, "timeout"))
            } else {
                Ok((term_a.len() + term_b.len()) as u64)
            }
        }
    }

    fn candidate(source: &str, role: &str, row: usize, entity_type: EntityType, name: &str) -> CandidateEntity {
        CandidateEntity {
            key: CandidateKey {
                source: source.to_string(),
                role: role.to_string(),
                row,
            },
            entity_type,
            source_id: format!("row-{}", row),
            raw_name: name.to_string(),
            code: None,
            aliases: BTreeSet::new(),
            raw_attributes: BTreeMap::new(),
            derived_attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance: Provenance::Curated,
            inferred_mapping: false,
        }
    }

    fn lookup_config() -> LookupConfig {
        LookupConfig {
            max_attempts: 2,
            backoff_ms: 1,
            concurrency: 2,
        }
    }

    const ONTOLOGY: &str = "doid,name,synonyms,parent_doids,is_cancer_like\n\
        DOID:3458,breast adenocarcinoma,breast adenocarcinoma nos,DOID:1612,\n";

    #[tokio::test]
    async fn test_disease_codes_and_ontology() {
        let mut named = candidate("pairs", "disease", 1, EntityType::Disease, "Breast adenocarcinoma");
        named.code = Some("C50.9".to_string());
        let mut coded = candidate("pairs", "disease", 2, EntityType::Disease, "whatever");
        coded.code = Some("DOID:9999".to_string());
        let mut batches = vec![NormalizedBatch {
            source: "pairs".to_string(),
            ordinal: 1,
            candidates: vec![named, coded],
            ..Default::default()
        }];

        let enricher = Enricher::new(
            Collaborators {
                ontology: Some(Arc::new(OntologyTable::from_reader(ONTOLOGY.as_bytes()).unwrap())),
                ..Default::default()
            },
            lookup_config(),
        );
        let report = enricher.enrich(&mut batches, &[]).await;

        let named = &batches[0].candidates[0];
        assert_eq!(named.code.as_deref(), Some("DOID:3458"));
        assert_eq!(named.raw_attributes[attrs::SOURCE_CODE], "C50.9");
        assert_eq!(named.derived_attributes[attrs::CANCER_LIKE], "true");
        assert!(!named.raw_attributes.contains_key(attrs::CANCER_LIKE));
        assert!(named.aliases.contains("breast adenocarcinoma nos"));
        // unknown but well-formed codes are trusted as they are
        assert_eq!(batches[0].candidates[1].code.as_deref(), Some("DOID:9999"));
        assert_eq!(report.diseases_resolved, 1);
    }

    #[tokio::test]
    async fn test_registry_and_device_rules() {
        let device = candidate("devices", "device", 1, EntityType::Device, "HER2 IHC assay");
        let mut batches = vec![NormalizedBatch {
            source: "devices".to_string(),
            ordinal: 2,
            candidates: vec![device],
            ..Default::default()
        }];
        let rules = DeviceLinkRule::from_reader("biomarker_name,match_tokens\nERBB2,her2\n".as_bytes()).unwrap();

        let enricher = Enricher::new(
            Collaborators {
                registry: Some(Arc::new(KeywordDeviceRegistry)),
                device_rules: rules,
                ..Default::default()
            },
            lookup_config(),
        );
        let report = enricher.enrich(&mut batches, &[]).await;
        assert_eq!(report.methods_inferred, 1);
        assert_eq!(report.device_links, 1);

        let batch = &batches[0];
        let method = batch.candidates.iter().find(|c| c.entity_type == EntityType::Method).unwrap();
        assert_eq!(method.raw_name, "Immunoassay");
        let biomarker = batch.candidates.iter().find(|c| c.entity_type == EntityType::Biomarker).unwrap();
        assert_eq!(biomarker.raw_name, "ERBB2");

        let measures = batch.edges.iter().find(|e| e.relation == RelationType::Measures).unwrap();
        assert_eq!(measures.evidence.provenance, Provenance::Heuristic);
        assert_eq!(measures.evidence.lists[RULE_IDS], BTreeSet::from(["1".to_string()]));
    }

    fn comention_batches() -> Vec<NormalizedBatch> {
        vec![
            NormalizedBatch {
                source: "markers".to_string(),
                ordinal: 1,
                candidates: vec![
                    candidate("markers", "biomarker", 1, EntityType::Biomarker, "BRCA1"),
                    candidate("markers", "biomarker", 2, EntityType::Biomarker, "brca1"),
                ],
                ..Default::default()
            },
            NormalizedBatch {
                source: "diseases".to_string(),
                ordinal: 2,
                candidates: vec![candidate("diseases", "disease", 1, EntityType::Disease, "Gastric cancer")],
                ..Default::default()
            },
        ]
    }

    fn plan() -> ComentionPlan {
        ComentionPlan {
            name: "markers_x_diseases".to_string(),
            biomarker_source: "markers".to_string(),
            biomarker_role: "biomarker".to_string(),
            disease_source: "diseases".to_string(),
            disease_role: "disease".to_string(),
            min_count: 1,
            max_pairs: None,
            term_strategy: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_comention_edges_are_weak_heuristic() {
        let mut batches = comention_batches();
        let enricher = Enricher::new(
            Collaborators {
                literature: Some(Arc::new(FixedLiterature { fail: false })),
                ..Default::default()
            },
            lookup_config(),
        );
        let report = enricher.enrich(&mut batches, &[plan()]).await;

        assert_eq!(report.comention_edges, 1);
        let edge = &batches[0].edges[0];
        assert_eq!(edge.evidence.strength_label(), Some(COMENTION_STRENGTH));
        assert_eq!(edge.evidence.provenance, Provenance::Heuristic);
        assert_eq!(edge.evidence.count(), ("BRCA1".len() + "Gastric cancer".len()) as u64);
    }

    #[tokio::test]
    async fn test_failed_lookup_keeps_edge_with_zero_count() {
        let mut batches = comention_batches();
        let enricher = Enricher::new(
            Collaborators {
                literature: Some(Arc::new(FixedLiterature { fail: true })),
                ..Default::default()
            },
            lookup_config(),
        );
        let report = enricher.enrich(&mut batches, &[plan()]).await;

        assert_eq!(report.lookup_failures["fixed"], 1);
        let edge = &batches[0].edges[0];
        assert_eq!(edge.evidence.count(), 0);
        assert_eq!(edge.evidence.status, EvidenceStatus::LookupFailed);
    }
}
