use lazy_static::lazy_static;
use regex::Regex;

use crate::models::{attrs, CandidateEntity, CanonicalEntity, EntityType, JoinKey};

lazy_static! {
    static ref ONTOLOGY_CODE: Regex = Regex::new(r"^[A-Za-z]+:\d+$").unwrap();
}

/// Trim, lowercase and collapse internal whitespace
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// "DOID:3458", "MONDO:0007254" and the like
pub fn is_ontology_code(raw: &str) -> bool {
    ONTOLOGY_CODE.is_match(raw.trim())
}

/// Exact code when the candidate carries one, otherwise its normalized name
pub fn join_key(candidate: &CandidateEntity) -> JoinKey {
    match candidate.code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => JoinKey::Code(code.to_string()),
        None => JoinKey::Name(normalize_name(&candidate.raw_name)),
    }
}

/// Deterministic canonical id for a new entity
pub fn canonical_id(entity_type: EntityType, key: &JoinKey) -> String {
    match key {
        JoinKey::Code(code) => code.clone(),
        JoinKey::Name(name) => format!("{}:{}", entity_type.as_str(), name),
    }
}

/// Attribute under which an entity's join code is recorded
pub fn code_attribute(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Disease => attrs::ONTOLOGY_ID,
        EntityType::Device => attrs::REGISTRY_ID,
        _ => attrs::CODE,
    }
}

pub fn entity_code(entity: &CanonicalEntity) -> Option<&str> {
    entity.attribute(code_attribute(entity.entity_type))
}

/// Every key under which an entity can be found: its code, its name and
/// each alias.
pub fn index_keys(entity: &CanonicalEntity) -> Vec<JoinKey> {
    let mut keys = Vec::with_capacity(entity.aliases.len() + 2);
    if let Some(code) = entity_code(entity) {
        keys.push(JoinKey::Code(code.to_string()));
    }
    keys.push(JoinKey::Name(normalize_name(&entity.name)));
    keys.extend(entity.aliases.iter().map(|a| JoinKey::Name(normalize_name(a))));
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateKey, Provenance};
    use std::collections::{BTreeMap, BTreeSet};

    fn candidate(name: &str, code: Option<&str>) -> CandidateEntity {
        CandidateEntity {
            key: CandidateKey {
                source: "s".to_string(),
                role: "disease".to_string(),
                row: 1,
            },
            entity_type: EntityType::Disease,
            source_id: "1".to_string(),
            raw_name: name.to_string(),
            code: code.map(String::from),
            aliases: BTreeSet::new(),
            raw_attributes: BTreeMap::new(),
            derived_attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance: Provenance::Curated,
            inferred_mapping: false,
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Breast   Adenocarcinoma \t"), "breast adenocarcinoma");
        assert_eq!(normalize_name("BRCA1"), "brca1");
    }

    #[test]
    fn test_join_key_prefers_code() {
        assert_eq!(
            join_key(&candidate("Breast adenocarcinoma", Some(" DOID:3458 "))),
            JoinKey::Code("DOID:3458".to_string())
        );
        assert_eq!(
            join_key(&candidate("Breast  Adenocarcinoma", Some(""))),
            JoinKey::Name("breast adenocarcinoma".to_string())
        );
    }

    #[test]
    fn test_canonical_ids() {
        assert_eq!(canonical_id(EntityType::Disease, &JoinKey::Code("DOID:3458".into())), "DOID:3458");
        assert_eq!(canonical_id(EntityType::Biomarker, &JoinKey::Name("brca1".into())), "biomarker:brca1");
    }

    #[test]
    fn test_ontology_code_shape() {
        assert!(is_ontology_code("DOID:3458"));
        assert!(!is_ontology_code("3458"));
        assert!(!is_ontology_code("DOID 3458"));
    }
}
