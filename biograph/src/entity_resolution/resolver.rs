use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::errors::GraphError;
use crate::models::{
    AmbiguityRecord, Attribute, CandidateEntity, CanonicalEntity, EntityType, JoinKey, NodeRef,
    Provenance, ResolutionOutcome,
};

use super::matchers::{canonical_id, code_attribute, entity_code, index_keys, join_key, normalize_name};

/// What a join-key group resolved to
enum Decision {
    Create,
    Merge(String),
    Rekey(String),
    Ambiguous(Vec<String>),
}

/// Key-based entity resolution.
///
/// Candidates are grouped by `(type, join key)` and the groups are resolved
/// in key order, so the outcome does not depend on the order candidates
/// arrive in. The resolver is the single writer for canonical entities.
#[derive(Debug, Default)]
pub struct EntityResolver {
    entities: BTreeMap<NodeRef, CanonicalEntity>,
    index: HashMap<(EntityType, JoinKey), BTreeSet<String>>,
    touched: BTreeSet<NodeRef>,
}

impl EntityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with canonical entities of previous runs so ids stay stable
    pub fn with_existing<I>(entities: I) -> Self
    where
        I: IntoIterator<Item = CanonicalEntity>,
    {
        let mut resolver = Self::new();
        for entity in entities {
            resolver.register(&entity);
            resolver.entities.insert(entity.node_ref(), entity);
        }
        debug!(entities = resolver.entities.len(), "[Entity Resolver] Seeded from existing entities");
        resolver
    }

    pub fn get(&self, node: &NodeRef) -> Option<&CanonicalEntity> {
        self.entities.get(node)
    }

    /// Mutable access for post-resolution annotation. Marks the entity as
    /// touched; index keys are not refreshed.
    pub fn entity_mut(&mut self, node: &NodeRef) -> Option<&mut CanonicalEntity> {
        let entity = self.entities.get_mut(node)?;
        self.touched.insert(node.clone());
        Some(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &CanonicalEntity> {
        self.entities.values()
    }

    /// Entities created or changed since the resolver was built
    pub fn touched_entities(&self) -> Vec<CanonicalEntity> {
        self.touched
            .iter()
            .filter_map(|node| self.entities.get(node))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Resolve a run's candidates onto canonical entities.
    pub fn resolve(&mut self, candidates: &[CandidateEntity]) -> ResolutionOutcome {
        let mut groups: BTreeMap<(EntityType, JoinKey), Vec<&CandidateEntity>> = BTreeMap::new();
        for candidate in candidates {
            groups
                .entry((candidate.entity_type, join_key(candidate)))
                .or_default()
                .push(candidate);
        }

        let mut outcome = ResolutionOutcome::default();

        for ((entity_type, key), mut group) in groups {
            // strongest provenance first, then candidate key
            group.sort_by(|a, b| b.provenance.cmp(&a.provenance).then_with(|| a.key.cmp(&b.key)));

            match self.decide(entity_type, &key, &group) {
                Decision::Ambiguous(matches) => {
                    let err = GraphError::ResolutionAmbiguity {
                        entity_type,
                        join_key: key.to_string(),
                        candidates: matches.clone(),
                    };
                    warn!(
                        error = %err,
                        candidates = group.len(),
                        "⚠️ [Entity Resolver] Merge refused, flagged for review"
                    );
                    outcome.ambiguities.extend(group.iter().map(|c| AmbiguityRecord {
                        candidate: c.key.clone(),
                        entity_type,
                        source_id: c.source_id.clone(),
                        raw_name: c.raw_name.clone(),
                        join_key: key.to_string(),
                        matches: matches.clone(),
                    }));
                }
                Decision::Create => {
                    let id = canonical_id(entity_type, &key);
                    let node = NodeRef::new(entity_type, id.clone());
                    if self.entities.contains_key(&node) {
                        self.absorb_group(&node, &key, &group);
                        outcome.merged += group.len();
                    } else {
                        let mut entity = from_candidate(id, &key, group[0]);
                        for candidate in &group[1..] {
                            entity.absorb(&from_candidate(entity.id.clone(), &key, candidate));
                        }
                        self.register(&entity);
                        self.entities.insert(node.clone(), entity);
                        self.touched.insert(node.clone());
                        outcome.created += 1;
                        outcome.merged += group.len() - 1;
                    }
                    assign(&mut outcome, &group, &node);
                }
                Decision::Merge(id) => {
                    let node = NodeRef::new(entity_type, id);
                    self.absorb_group(&node, &key, &group);
                    outcome.merged += group.len();
                    assign(&mut outcome, &group, &node);
                }
                Decision::Rekey(id) => {
                    let node = NodeRef::new(entity_type, id);
                    self.rekey(&node, &key, group[0]);
                    self.absorb_group(&node, &key, &group);
                    outcome.rekeyed += 1;
                    outcome.merged += group.len();
                    assign(&mut outcome, &group, &node);
                }
            }
        }

        info!(
            created = outcome.created,
            merged = outcome.merged,
            rekeyed = outcome.rekeyed,
            ambiguous = outcome.ambiguities.len(),
            "🧬 [Entity Resolver] Resolution complete"
        );

        outcome
    }

    fn decide(&self, entity_type: EntityType, key: &JoinKey, group: &[&CandidateEntity]) -> Decision {
        let direct = self.lookup(entity_type, key);
        match direct.len() {
            0 => {}
            1 => return Decision::Merge(direct.into_iter().next().unwrap_or_default()),
            _ => {
                // an entity keyed by this exact key outranks alias hits
                return match self.owner_of(entity_type, key, &direct) {
                    Some(id) => Decision::Merge(id),
                    None => Decision::Ambiguous(direct.into_iter().collect()),
                };
            }
        }

        if !key.is_code() {
            return Decision::Create;
        }

        // A code seen for the first time may belong to an entity that was
        // keyed by name before the code was known.
        let mut by_name = BTreeSet::new();
        for candidate in group {
            let name_key = JoinKey::Name(normalize_name(&candidate.raw_name));
            for id in self.lookup(entity_type, &name_key) {
                let node = NodeRef::new(entity_type, id.clone());
                if self.entities.get(&node).is_some_and(|e| entity_code(e).is_none()) {
                    by_name.insert(id);
                }
            }
        }

        match by_name.len() {
            0 => Decision::Create,
            1 => Decision::Rekey(by_name.into_iter().next().unwrap_or_default()),
            _ => Decision::Ambiguous(by_name.into_iter().collect()),
        }
    }

    /// The single match whose own join key is `key`, if any
    fn owner_of(&self, entity_type: EntityType, key: &JoinKey, matches: &BTreeSet<String>) -> Option<String> {
        let mut owners = matches.iter().filter(|id| {
            self.entities
                .get(&NodeRef::new(entity_type, (*id).clone()))
                .is_some_and(|e| e.join_key == key.as_str())
        });
        let owner = owners.next()?;
        owners.next().is_none().then(|| owner.clone())
    }

    fn lookup(&self, entity_type: EntityType, key: &JoinKey) -> BTreeSet<String> {
        self.index
            .get(&(entity_type, key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn register(&mut self, entity: &CanonicalEntity) {
        for key in index_keys(entity) {
            self.index
                .entry((entity.entity_type, key))
                .or_default()
                .insert(entity.id.clone());
        }
    }

    fn absorb_group(&mut self, node: &NodeRef, key: &JoinKey, group: &[&CandidateEntity]) {
        let Some(mut entity) = self.entities.remove(node) else {
            return;
        };
        for candidate in group {
            entity.absorb(&from_candidate(entity.id.clone(), key, candidate));
        }
        self.register(&entity);
        self.entities.insert(node.clone(), entity);
        self.touched.insert(node.clone());
    }

    fn rekey(&mut self, node: &NodeRef, key: &JoinKey, candidate: &CandidateEntity) {
        let Some(entity) = self.entities.get_mut(node) else {
            return;
        };
        let previous = entity.join_key.clone();
        entity.join_key = key.as_str().to_string();
        entity.attributes.insert(
            code_attribute(entity.entity_type).to_string(),
            Attribute {
                value: key.as_str().to_string(),
                provenance: candidate.provenance,
            },
        );
        entity.notes.insert(format!(
            "rekeyed from name:{} to code:{} by {}",
            previous,
            key.as_str(),
            candidate.key.source
        ));
        info!(
            entity = %node,
            from = %previous,
            to = key.as_str(),
            "🔑 [Entity Resolver] Name-keyed entity re-keyed to code"
        );
    }
}

fn assign(outcome: &mut ResolutionOutcome, group: &[&CandidateEntity], node: &NodeRef) {
    for candidate in group {
        outcome.assignments.insert(candidate.key.clone(), node.clone());
    }
}

/// Canonical record carrying exactly what one candidate knows
fn from_candidate(id: String, key: &JoinKey, candidate: &CandidateEntity) -> CanonicalEntity {
    let name = match candidate.entity_type {
        EntityType::Specimen => normalize_name(&candidate.raw_name),
        _ => candidate.raw_name.split_whitespace().collect::<Vec<_>>().join(" "),
    };

    let mut entity = CanonicalEntity {
        id,
        entity_type: candidate.entity_type,
        join_key: key.as_str().to_string(),
        aliases: candidate
            .aliases
            .iter()
            .filter(|a| !a.eq_ignore_ascii_case(&name))
            .cloned()
            .collect(),
        name,
        attributes: BTreeMap::new(),
        list_attributes: BTreeMap::new(),
        provenance: candidate.provenance,
        sources: BTreeSet::from([candidate.key.source.clone()]),
        notes: BTreeSet::new(),
    };

    if let JoinKey::Code(code) = key {
        entity.set_attribute(code_attribute(entity.entity_type), code, candidate.provenance);
    }
    for (name, value) in &candidate.raw_attributes {
        entity.set_attribute(name, value, candidate.provenance);
    }
    // the row's own value stands over a derived one
    for (name, value) in &candidate.derived_attributes {
        if !candidate.raw_attributes.contains_key(name) {
            entity.set_attribute(name, value, Provenance::Heuristic);
        }
    }
    for (name, values) in &candidate.list_attributes {
        entity.extend_list(name, values);
    }
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{attrs, CandidateKey, Provenance};

    fn candidate(
        entity_type: EntityType,
        row: usize,
        name: &str,
        code: Option<&str>,
        provenance: Provenance,
    ) -> CandidateEntity {
        CandidateEntity {
            key: CandidateKey {
                source: "src".to_string(),
                role: entity_type.as_str().to_string(),
                row,
            },
            entity_type,
            source_id: row.to_string(),
            raw_name: name.to_string(),
            code: code.map(String::from),
            aliases: BTreeSet::new(),
            raw_attributes: BTreeMap::new(),
            derived_attributes: BTreeMap::new(),
            list_attributes: BTreeMap::new(),
            provenance,
            inferred_mapping: false,
        }
    }

    fn biomarker(row: usize, name: &str) -> CandidateEntity {
        candidate(EntityType::Biomarker, row, name, None, Provenance::Curated)
    }

    fn with_alias(mut c: CandidateEntity, alias: &str) -> CandidateEntity {
        c.aliases.insert(alias.to_string());
        c
    }

    #[test]
    fn test_same_normalized_name_merges() {
        let mut resolver = EntityResolver::new();
        let outcome = resolver.resolve(&[biomarker(1, "BRCA1"), biomarker(2, " brca1 ")]);

        assert_eq!(outcome.created, 1);
        assert_eq!(resolver.len(), 1);
        let node = NodeRef::new(EntityType::Biomarker, "biomarker:brca1");
        assert_eq!(outcome.assignments.values().collect::<BTreeSet<_>>(), BTreeSet::from([&node]));
    }

    #[test]
    fn test_ambiguous_name_is_flagged_not_merged() {
        let mut resolver = EntityResolver::with_existing(vec![
            from_candidate(
                "biomarker:her2".to_string(),
                &JoinKey::Name("her2".to_string()),
                &with_alias(biomarker(1, "HER2"), "neu"),
            ),
            from_candidate(
                "biomarker:neu protein".to_string(),
                &JoinKey::Name("neu protein".to_string()),
                &with_alias(biomarker(2, "NEU protein"), "neu"),
            ),
        ]);

        let incoming = biomarker(3, "NEU");
        let outcome = resolver.resolve(&[incoming.clone()]);

        assert_eq!(outcome.ambiguities.len(), 1);
        assert_eq!(outcome.ambiguities[0].candidate, incoming.key);
        assert_eq!(
            outcome.ambiguities[0].matches,
            vec!["biomarker:her2".to_string(), "biomarker:neu protein".to_string()]
        );
        assert!(outcome.canonical(&incoming.key).is_none());
        assert_eq!(resolver.len(), 2);
        assert!(resolver.touched_entities().is_empty());
    }

    #[test]
    fn test_resolution_is_order_independent() {
        let candidates = vec![
            with_alias(biomarker(1, "ERBB2"), "HER2"),
            biomarker(2, "her2"),
            biomarker(3, "BRCA1"),
            candidate(EntityType::Biomarker, 4, "Brca1", None, Provenance::Heuristic),
        ];
        let mut reversed = candidates.clone();
        reversed.reverse();

        let mut forward = EntityResolver::new();
        let a = forward.resolve(&candidates);
        let mut backward = EntityResolver::new();
        let b = backward.resolve(&reversed);

        assert_eq!(a.assignments, b.assignments);
        assert_eq!(
            forward.entities().cloned().collect::<Vec<_>>(),
            backward.entities().cloned().collect::<Vec<_>>()
        );
        // curated candidate names the entity
        let brca = forward.get(&NodeRef::new(EntityType::Biomarker, "biomarker:brca1")).unwrap();
        assert_eq!(brca.name, "BRCA1");
    }

    #[test]
    fn test_code_key_becomes_id() {
        let mut resolver = EntityResolver::new();
        let outcome = resolver.resolve(&[candidate(
            EntityType::Disease,
            1,
            "Breast adenocarcinoma",
            Some("DOID:3458"),
            Provenance::Curated,
        )]);

        let node = NodeRef::new(EntityType::Disease, "DOID:3458");
        assert_eq!(outcome.created, 1);
        let disease = resolver.get(&node).unwrap();
        assert_eq!(disease.ontology_id(), Some("DOID:3458"));
        assert_eq!(disease.join_key, "DOID:3458");
    }

    #[test]
    fn test_name_keyed_disease_rekeyed_with_note() {
        let mut resolver = EntityResolver::new();
        resolver.resolve(&[candidate(
            EntityType::Disease,
            1,
            "Breast adenocarcinoma",
            None,
            Provenance::Heuristic,
        )]);

        let outcome = resolver.resolve(&[candidate(
            EntityType::Disease,
            2,
            "breast adenocarcinoma",
            Some("DOID:3458"),
            Provenance::Curated,
        )]);

        assert_eq!(outcome.rekeyed, 1);
        assert_eq!(outcome.created, 0);
        let node = NodeRef::new(EntityType::Disease, "disease:breast adenocarcinoma");
        let disease = resolver.get(&node).unwrap();
        assert_eq!(disease.join_key, "DOID:3458");
        assert_eq!(disease.ontology_id(), Some("DOID:3458"));
        assert!(disease
            .notes
            .iter()
            .any(|n| n.contains("rekeyed from name:breast adenocarcinoma to code:DOID:3458")));

        // later candidates carrying the code land on the same entity
        let again = resolver.resolve(&[candidate(
            EntityType::Disease,
            3,
            "Adenocarcinoma of breast",
            Some("DOID:3458"),
            Provenance::Curated,
        )]);
        assert_eq!(again.canonical(&CandidateKey {
            source: "src".to_string(),
            role: "disease".to_string(),
            row: 3,
        }), Some(&node));
    }

    #[test]
    fn test_derived_category_flag_yields_to_curated_value() {
        let node = NodeRef::new(EntityType::Disease, "disease:gastric cancer");
        let mut ontology_only = candidate(EntityType::Disease, 1, "Gastric cancer", None, Provenance::Curated);
        ontology_only
            .derived_attributes
            .insert(attrs::CANCER_LIKE.to_string(), "false".to_string());
        let mut curated = candidate(EntityType::Disease, 2, "gastric cancer", None, Provenance::Curated);
        curated.raw_attributes.insert(attrs::CANCER_LIKE.to_string(), "true".to_string());

        let mut first = EntityResolver::new();
        first.resolve(&[ontology_only.clone()]);
        let disease = first.get(&node).unwrap();
        assert_eq!(disease.category_flag(), Some(false));
        assert_eq!(disease.attributes[attrs::CANCER_LIKE].provenance, Provenance::Heuristic);

        // a later curated value wins on precedence
        let mut second = EntityResolver::with_existing(first.entities().cloned().collect::<Vec<_>>());
        second.resolve(&[curated.clone()]);
        let disease = second.get(&node).unwrap();
        assert_eq!(disease.category_flag(), Some(true));
        assert_eq!(disease.attributes[attrs::CANCER_LIKE].provenance, Provenance::Curated);

        // and the derived value never displaces it
        let mut third = EntityResolver::with_existing(second.entities().cloned().collect::<Vec<_>>());
        third.resolve(&[ontology_only, curated]);
        assert_eq!(third.get(&node).unwrap().category_flag(), Some(true));
    }

    #[test]
    fn test_candidate_attributes_follow_provenance() {
        let mut curated = candidate(EntityType::Disease, 1, "Gastric cancer", None, Provenance::Curated);
        curated.raw_attributes.insert(attrs::CANCER_LIKE.to_string(), "true".to_string());
        let mut heuristic = candidate(EntityType::Disease, 2, "gastric cancer", None, Provenance::Heuristic);
        heuristic.raw_attributes.insert(attrs::CANCER_LIKE.to_string(), "false".to_string());

        let mut resolver = EntityResolver::new();
        resolver.resolve(&[heuristic, curated]);

        let disease = resolver
            .get(&NodeRef::new(EntityType::Disease, "disease:gastric cancer"))
            .unwrap();
        assert_eq!(disease.category_flag(), Some(true));
        assert_eq!(disease.name, "Gastric cancer");
    }

    #[test]
    fn test_specimen_names_lowercased() {
        let mut resolver = EntityResolver::new();
        resolver.resolve(&[candidate(EntityType::Specimen, 1, " Whole  Blood", None, Provenance::Curated)]);
        let specimen = resolver
            .get(&NodeRef::new(EntityType::Specimen, "specimen:whole blood"))
            .unwrap();
        assert_eq!(specimen.name, "whole blood");
    }

    #[test]
    fn test_seeded_ids_are_reused() {
        let mut first = EntityResolver::new();
        first.resolve(&[biomarker(1, "BRCA1")]);
        let stored: Vec<_> = first.entities().cloned().collect();

        let mut second = EntityResolver::with_existing(stored);
        let outcome = second.resolve(&[biomarker(9, "brca1")]);
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.merged, 1);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_alias_colliding_with_a_name_survives_rerun() {
        let candidates = vec![biomarker(1, "ERBB2"), with_alias(biomarker(2, "HER2"), "ERBB2")];

        let mut first = EntityResolver::new();
        let outcome = first.resolve(&candidates);
        assert_eq!(outcome.created, 2);
        assert!(outcome.ambiguities.is_empty());

        let mut second = EntityResolver::with_existing(first.entities().cloned().collect::<Vec<_>>());
        let rerun = second.resolve(&candidates);
        assert!(rerun.ambiguities.is_empty());
        assert_eq!(rerun.created, 0);
        assert_eq!(
            rerun.canonical(&candidates[0].key),
            Some(&NodeRef::new(EntityType::Biomarker, "biomarker:erbb2"))
        );
        assert_eq!(
            rerun.canonical(&candidates[1].key),
            Some(&NodeRef::new(EntityType::Biomarker, "biomarker:her2"))
        );
        assert_eq!(second.len(), 2);
    }
}
