use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use tracing::{debug, info, warn};

use crate::errors::{GraphError, GraphResult};
use crate::models::{
    CandidateEdge, CandidateEntity, CandidateKey, EdgeEvidence, EvidenceStatus, LiteratureTerms,
    NormalizedBatch, Observed, RelationType, Sequence, SourceStats,
};

use super::column_roles::{resolve_columns, ResolvedColumns};
use super::source_config::{EdgeTemplate, RoleMapping, SourceConfig, ALIASES_FIELD};
use super::terms::literature_query;

/// One data row of a source, keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub values: BTreeMap<String, String>,
}

impl RawRow {
    /// Trimmed, non-empty value of a column
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// A source as read from disk, before any mapping is applied
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub source: String,
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Records the CSV reader could not decode
    pub unreadable: usize,
}

/// Read a source table from its configured path
pub fn read_batch(config: &SourceConfig) -> GraphResult<RawBatch> {
    let file = std::fs::File::open(&config.path).map_err(|e| {
        GraphError::Config(format!(
            "cannot open source '{}' at {}: {}",
            config.name,
            config.path.display(),
            e
        ))
    })?;
    parse_batch(&config.name, config.delimiter, file)
}

/// Parse delimited text into a raw batch. Short rows are padded with empty
/// values; undecodable records are counted and skipped.
pub fn parse_batch<R: Read>(source: &str, delimiter: char, input: R) -> GraphResult<RawBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut batch = RawBatch {
        source: source.to_string(),
        columns: columns.clone(),
        ..Default::default()
    };

    for (index, record) in reader.records().enumerate() {
        let row = index + 1;
        match record {
            Ok(record) => {
                let values = columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.clone(), record.get(i).unwrap_or_default().to_string()))
                    .collect();
                batch.rows.push(RawRow { row, values });
            }
            Err(e) => {
                warn!(source, row, error = %e, "⚠️ [Normalizer] Unreadable record skipped");
                batch.unreadable += 1;
            }
        }
    }

    Ok(batch)
}

/// Map one raw batch onto candidate entities and candidate edges.
pub fn normalize(config: &SourceConfig, ordinal: u32, batch: &RawBatch) -> NormalizedBatch {
    let mut out = NormalizedBatch {
        source: config.name.clone(),
        ordinal,
        stats: SourceStats {
            rows_read: batch.rows.len() + batch.unreadable,
            rows_dropped: batch.unreadable,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut roles: Vec<(&RoleMapping, ResolvedColumns)> = Vec::with_capacity(config.roles.len());
    for mapping in &config.roles {
        match resolve_columns(mapping, &batch.columns) {
            Some(columns) => roles.push((mapping, columns)),
            None => {
                warn!(source = %config.name, "⚠️ [Normalizer] Source has no columns");
                out.stats.rows_dropped += batch.rows.len();
                return out;
            }
        }
    }

    for row in &batch.rows {
        match normalize_row(config, &roles, row) {
            Ok(candidates) => {
                let seq = Sequence::new(ordinal, row.row);
                for template in &config.edges {
                    if let Some(edge) = build_edge(config, template, &candidates, row, seq) {
                        out.edges.push(edge);
                    }
                }
                out.stats.inferred_mappings += candidates.values().filter(|c| c.inferred_mapping).count();
                out.candidates.extend(candidates.into_values());
            }
            Err(e) => {
                debug!(error = %e, "[Normalizer] Row dropped");
                out.stats.rows_dropped += 1;
            }
        }
    }

    out.stats.candidates = out.candidates.len();
    out.stats.edges = out.edges.len();

    if out.stats.rows_dropped > 0 {
        warn!(
            source = %config.name,
            rows_dropped = out.stats.rows_dropped,
            rows_read = out.stats.rows_read,
            "⚠️ [Normalizer] Rows dropped for missing mandatory fields"
        );
    }
    info!(
        source = %config.name,
        candidates = out.stats.candidates,
        edges = out.stats.edges,
        inferred_mappings = out.stats.inferred_mappings,
        "📥 [Normalizer] Source normalized"
    );

    out
}

/// Read and normalize every source in parallel. Ordinals start at 1 in
/// configuration order; 0 is reserved for stored values.
pub fn normalize_sources(configs: &[SourceConfig]) -> Vec<(String, GraphResult<NormalizedBatch>)> {
    configs
        .par_iter()
        .enumerate()
        .map(|(index, config)| {
            let result = read_batch(config).map(|raw| normalize(config, index as u32 + 1, &raw));
            (config.name.clone(), result)
        })
        .collect()
}

fn normalize_row(
    config: &SourceConfig,
    roles: &[(&RoleMapping, ResolvedColumns)],
    row: &RawRow,
) -> GraphResult<BTreeMap<String, CandidateEntity>> {
    let mut candidates = BTreeMap::new();

    for (mapping, columns) in roles {
        let name = match row.value(&columns.name) {
            Some(name) => name,
            None if mapping.required => {
                return Err(GraphError::SourceFormat {
                    source_name: config.name.clone(),
                    row: row.row,
                    reason: format!("role '{}' has no value in column '{}'", mapping.role, columns.name),
                });
            }
            None => continue,
        };

        let source_id = columns
            .id
            .as_deref()
            .and_then(|c| row.value(c))
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{}", row.row));

        let mut aliases = BTreeSet::new();
        let mut list_attributes = BTreeMap::new();
        for (attribute, column) in &mapping.list_fields {
            let values = split_list(row.value(column), &config.list_delimiter);
            if attribute == ALIASES_FIELD {
                aliases.extend(values);
            } else if !values.is_empty() {
                list_attributes.insert(attribute.clone(), values);
            }
        }
        aliases.retain(|a: &String| !a.eq_ignore_ascii_case(name));

        let raw_attributes = mapping
            .attribute_fields
            .iter()
            .filter_map(|(attribute, column)| row.value(column).map(|v| (attribute.clone(), v.to_string())))
            .collect();

        candidates.insert(
            mapping.role.clone(),
            CandidateEntity {
                key: CandidateKey {
                    source: config.name.clone(),
                    role: mapping.role.clone(),
                    row: row.row,
                },
                entity_type: mapping.entity_type,
                source_id,
                raw_name: name.to_string(),
                code: mapping.code_field.as_deref().and_then(|c| row.value(c)).map(str::to_string),
                aliases,
                raw_attributes,
                derived_attributes: BTreeMap::new(),
                list_attributes,
                provenance: config.provenance,
                inferred_mapping: columns.inferred,
            },
        );
    }

    Ok(candidates)
}

fn build_edge(
    config: &SourceConfig,
    template: &EdgeTemplate,
    candidates: &BTreeMap<String, CandidateEntity>,
    row: &RawRow,
    seq: Sequence,
) -> Option<CandidateEdge> {
    let from = candidates.get(&template.from)?;
    let to = candidates.get(&template.to)?;
    let provenance = config.provenance;
    let observed = |value: String| Observed::new(value, provenance, seq);

    let mut evidence = EdgeEvidence::from_source(&config.name, provenance);

    if let Some(raw) = template.count_field.as_deref().and_then(|c| row.value(c)) {
        match parse_count(raw) {
            Some(count) => {
                evidence.comention_count = Some(Observed::new(count, provenance, seq));
                evidence.status = EvidenceStatus::Observed;
            }
            None => debug!(
                source = %config.name,
                row = row.row,
                value = raw,
                "[Normalizer] Unparseable count ignored"
            ),
        }
    }

    evidence.literature_query = template
        .query_field
        .as_deref()
        .and_then(|c| row.value(c))
        .map(|q| observed(q.to_string()));

    evidence.strength = template
        .strength_field
        .as_deref()
        .and_then(|c| row.value(c))
        .or(template.strength.as_deref())
        .map(|s| observed(s.trim().to_lowercase()));

    evidence.evidence_source = template
        .evidence_source_field
        .as_deref()
        .and_then(|c| row.value(c))
        .or(template.evidence_source.as_deref())
        .map(|s| observed(s.trim().to_string()));

    for (list, column) in &template.list_fields {
        let values = split_list(row.value(column), &config.list_delimiter);
        if !values.is_empty() {
            evidence.lists.insert(list.clone(), values);
        }
    }

    let mut pending_terms = None;
    if template.count_missing
        && template.relation == RelationType::AssociatedWith
        && evidence.comention_count.is_none()
    {
        let strategy = config.term_strategy.strategy();
        let terms = LiteratureTerms {
            biomarker: strategy.biomarker_term(&from.raw_name),
            disease: strategy.disease_term(&to.raw_name),
        };
        if evidence.literature_query.is_none() {
            evidence.literature_query = Some(observed(literature_query(&terms.biomarker, &terms.disease)));
        }
        pending_terms = Some(terms);
    }

    Some(CandidateEdge {
        relation: template.relation,
        from: from.key.clone(),
        to: to.key.clone(),
        evidence,
        seq,
        pending_terms,
    })
}

/// Split a delimited multi-value cell into a set
pub fn split_list(raw: Option<&str>, delimiter: &str) -> BTreeSet<String> {
    raw.map(|value| {
        value
            .split(delimiter)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Counts may arrive as "12", "12.0" or with thousands separators
fn parse_count(raw: &str) -> Option<u64> {
    let cleaned = raw.replace(',', "");
    cleaned
        .parse::<u64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().filter(|f| *f >= 0.0 && f.is_finite()).map(|f| f as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityType, Provenance};
    use crate::normalization::terms::TermStrategyKind;
    use std::path::PathBuf;

    fn role(role: &str, entity_type: EntityType, name_field: Option<&str>) -> RoleMapping {
        RoleMapping {
            role: role.to_string(),
            entity_type,
            id_field: None,
            name_field: name_field.map(String::from),
            code_field: None,
            list_fields: BTreeMap::new(),
            attribute_fields: BTreeMap::new(),
            required: true,
        }
    }

    fn pairs_config(provenance: Provenance) -> SourceConfig {
        let mut biomarker = role("biomarker", EntityType::Biomarker, Some("biomarker"));
        biomarker.id_field = Some("biomarker_id".to_string());
        biomarker
            .list_fields
            .insert(ALIASES_FIELD.to_string(), "aliases".to_string());
        let mut disease = role("disease", EntityType::Disease, Some("disease"));
        disease.code_field = Some("doid".to_string());

        SourceConfig {
            name: "pairs".to_string(),
            path: PathBuf::from("pairs.csv"),
            provenance,
            delimiter: ',',
            list_delimiter: ";".to_string(),
            term_strategy: TermStrategyKind::GeneSymbol,
            roles: vec![biomarker, disease],
            edges: vec![EdgeTemplate {
                relation: RelationType::AssociatedWith,
                from: "biomarker".to_string(),
                to: "disease".to_string(),
                count_field: Some("count".to_string()),
                query_field: None,
                strength_field: Some("strength".to_string()),
                evidence_source_field: None,
                strength: None,
                evidence_source: Some("curated_table".to_string()),
                list_fields: BTreeMap::new(),
                count_missing: true,
            }],
        }
    }

    const PAIRS: &str = "biomarker_id,biomarker,aliases,disease,doid,count,strength\n\
        1,BRCA1,breast cancer gene 1; BRCC1,Breast adenocarcinoma,DOID:3458,42,Strong\n\
        2,ERBB2 amplification,,Gastric cancer,,,\n\
        3,,,Lung cancer,,,\n";

    #[test]
    fn test_parse_batch_pads_short_rows() {
        let batch = parse_batch("t", ',', "a,b,c\n1,2\n".as_bytes()).unwrap();
        assert_eq!(batch.columns, vec!["a", "b", "c"]);
        assert_eq!(batch.rows[0].row, 1);
        assert_eq!(batch.rows[0].value("c"), None);
        assert_eq!(batch.rows[0].value("b"), Some("2"));
    }

    #[test]
    fn test_normalize_pairs_source() {
        let config = pairs_config(Provenance::Curated);
        let raw = parse_batch("pairs", ',', PAIRS.as_bytes()).unwrap();
        let batch = normalize(&config, 1, &raw);

        assert_eq!(batch.stats.rows_read, 3);
        assert_eq!(batch.stats.rows_dropped, 1);
        assert_eq!(batch.candidates.len(), 4);
        assert_eq!(batch.edges.len(), 2);

        let brca1 = &batch.candidates[0];
        assert_eq!(brca1.raw_name, "BRCA1");
        assert_eq!(brca1.source_id, "1");
        assert!(brca1.aliases.contains("breast cancer gene 1"));
        assert!(brca1.aliases.contains("BRCC1"));
        assert!(!brca1.inferred_mapping);

        let disease = batch
            .candidates
            .iter()
            .find(|c| c.raw_name == "Breast adenocarcinoma")
            .unwrap();
        assert_eq!(disease.code.as_deref(), Some("DOID:3458"));
        // the disease role has no id column configured
        assert!(disease.inferred_mapping);

        let first = &batch.edges[0];
        assert_eq!(first.evidence.count(), 42);
        assert_eq!(first.evidence.status, EvidenceStatus::Observed);
        assert_eq!(first.evidence.strength_label(), Some("strong"));
        assert!(first.pending_terms.is_none());
    }

    #[test]
    fn test_missing_count_becomes_pending_lookup() {
        let config = pairs_config(Provenance::Heuristic);
        let raw = parse_batch("pairs", ',', PAIRS.as_bytes()).unwrap();
        let batch = normalize(&config, 1, &raw);

        let pending = &batch.edges[1];
        assert_eq!(pending.evidence.comention_count, None);
        assert_eq!(pending.evidence.status, EvidenceStatus::NotQueried);
        assert_eq!(
            pending.pending_terms,
            Some(LiteratureTerms {
                biomarker: "ERBB2".to_string(),
                disease: "Gastric cancer".to_string(),
            })
        );
        assert_eq!(
            pending.evidence.literature_query.as_ref().map(|q| q.value.as_str()),
            Some("ERBB2[Title/Abstract] AND Gastric cancer[Title/Abstract]")
        );
    }

    #[test]
    fn test_optional_role_without_name_yields_no_edge() {
        let mut config = pairs_config(Provenance::Curated);
        config.roles[1].required = false;
        let raw = parse_batch("pairs", ',', "biomarker,disease\nBRCA1,\n".as_bytes()).unwrap();
        let batch = normalize(&config, 1, &raw);

        assert_eq!(batch.stats.rows_dropped, 0);
        assert_eq!(batch.candidates.len(), 1);
        assert!(batch.edges.is_empty());
        // no id column: the source id falls back to the row number
        assert_eq!(batch.candidates[0].source_id, "row-1");
    }

    #[test]
    fn test_fallback_mapping_counted() {
        let config = SourceConfig {
            name: "specimens".to_string(),
            path: PathBuf::from("specimens.csv"),
            provenance: Provenance::Heuristic,
            delimiter: '\t',
            list_delimiter: ";".to_string(),
            term_strategy: TermStrategyKind::Verbatim,
            roles: vec![role("specimen", EntityType::Specimen, None)],
            edges: vec![],
        };
        let raw = parse_batch("specimens", '\t', "specimen_id\tspecimen_name\n7\tUrine\n".as_bytes()).unwrap();
        let batch = normalize(&config, 2, &raw);

        assert_eq!(batch.stats.inferred_mappings, 1);
        assert_eq!(batch.candidates[0].source_id, "7");
        assert_eq!(batch.candidates[0].raw_name, "Urine");
    }

    #[test]
    fn test_parse_count_variants() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count("1,204"), Some(1204));
        assert_eq!(parse_count("3.0"), Some(3));
        assert_eq!(parse_count("-1"), None);
        assert_eq!(parse_count("n/a"), None);
    }

    #[test]
    fn test_split_list() {
        let set = split_list(Some("b; a ;; b"), ";");
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(split_list(None, ";").is_empty());
    }
}
