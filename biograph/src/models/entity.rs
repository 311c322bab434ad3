use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The five node types of the biomarker graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Biomarker,
    Disease,
    Specimen,
    Device,
    Method,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Biomarker,
        EntityType::Disease,
        EntityType::Specimen,
        EntityType::Device,
        EntityType::Method,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Biomarker => "biomarker",
            EntityType::Disease => "disease",
            EntityType::Specimen => "specimen",
            EntityType::Device => "device",
            EntityType::Method => "method",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "biomarker" => Some(EntityType::Biomarker),
            "disease" => Some(EntityType::Disease),
            "specimen" => Some(EntityType::Specimen),
            "device" => Some(EntityType::Device),
            "method" | "detection_method" => Some(EntityType::Method),
            _ => None,
        }
    }

    /// Node label used by the graph store
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Biomarker => "Biomarker",
            EntityType::Disease => "Disease",
            EntityType::Specimen => "Specimen",
            EntityType::Device => "Device",
            EntityType::Method => "Method",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        EntityType::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Curated records are strong evidence; heuristic ones are inferred.
/// Declaration order gives `Curated > Heuristic`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Heuristic,
    Curated,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Heuristic => "heuristic",
            Provenance::Curated => "curated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => Some(Provenance::Heuristic),
            "curated" => Some(Provenance::Curated),
            _ => None,
        }
    }
}

/// Well-known attribute names carried on canonical entities.
pub mod attrs {
    /// Disease ontology code (e.g. DOID:3458)
    pub const ONTOLOGY_ID: &str = "ontology_id";
    /// Disease category flag, "true" / "false"
    pub const CANCER_LIKE: &str = "cancer_like";
    pub const REGISTRY_ID: &str = "registry_id";
    pub const PRODUCT_CODE: &str = "product_code";
    /// Join code of biomarkers, specimens and methods
    pub const CODE: &str = "code";
    /// Codes that did not look like ontology identifiers
    pub const SOURCE_CODE: &str = "source_code";

    /// List attribute: specimens a biomarker is measured in
    pub const SPECIMENS: &str = "specimens";
    /// List attribute: ontology parents of a disease
    pub const PARENT_IDS: &str = "parent_ids";
}

/// Typed address of a node in the graph store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub entity_type: EntityType,
    pub key: String,
}

impl NodeRef {
    pub fn new(entity_type: EntityType, key: impl Into<String>) -> Self {
        Self {
            entity_type,
            key: key.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type.as_str(), self.key)
    }
}

/// A scalar attribute and the provenance of the source that set it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub value: String,
    pub provenance: Provenance,
}

/// The single deduplicated record for one real-world concept
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalEntity {
    pub id: String,
    pub entity_type: EntityType,
    /// Join key currently used to find this entity (code or normalized name)
    pub join_key: String,
    pub name: String,
    pub aliases: BTreeSet<String>,
    pub attributes: BTreeMap<String, Attribute>,
    pub list_attributes: BTreeMap<String, BTreeSet<String>>,
    pub provenance: Provenance,
    pub sources: BTreeSet<String>,
    /// Audit notes such as re-keying from a name to an ontology code
    pub notes: BTreeSet<String>,
}

impl CanonicalEntity {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.entity_type, self.id.clone())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|a| a.value.as_str())
    }

    pub fn list_attribute(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.list_attributes.get(name)
    }

    pub fn ontology_id(&self) -> Option<&str> {
        self.attribute(attrs::ONTOLOGY_ID)
    }

    pub fn category_flag(&self) -> Option<bool> {
        self.attribute(attrs::CANCER_LIKE).and_then(parse_flag)
    }

    pub fn specimens(&self) -> BTreeSet<String> {
        self.list_attribute(attrs::SPECIMENS).cloned().unwrap_or_default()
    }

    /// Set a scalar attribute. Curated values are never replaced by
    /// heuristic ones; among equals the later write wins.
    pub fn set_attribute(&mut self, name: &str, value: &str, provenance: Provenance) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        match self.attributes.get(name) {
            Some(existing) if existing.provenance > provenance => false,
            Some(existing) if existing.value == value && existing.provenance == provenance => false,
            _ => {
                self.attributes.insert(
                    name.to_string(),
                    Attribute {
                        value: value.to_string(),
                        provenance,
                    },
                );
                true
            }
        }
    }

    pub fn extend_list<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.list_attributes.entry(name.to_string()).or_default();
        for value in values {
            let value = value.as_ref().trim();
            if !value.is_empty() {
                entry.insert(value.to_string());
            }
        }
        if entry.is_empty() {
            self.list_attributes.remove(name);
        }
    }

    /// Fold another record for the same entity into this one. Sets are
    /// unioned, scalar attributes follow provenance precedence and the
    /// display name only changes when a strictly stronger source supplies it.
    pub fn absorb(&mut self, other: &CanonicalEntity) {
        if other.provenance > self.provenance {
            self.name = other.name.clone();
            self.provenance = other.provenance;
        }
        for alias in &other.aliases {
            if !alias.eq_ignore_ascii_case(&self.name) {
                self.aliases.insert(alias.clone());
            }
        }
        for (name, attr) in &other.attributes {
            self.set_attribute(name, &attr.value, attr.provenance);
        }
        for (name, values) in &other.list_attributes {
            self.extend_list(name, values);
        }
        self.sources.extend(other.sources.iter().cloned());
        self.notes.extend(other.notes.iter().cloned());
    }
}

/// Accepts "1"/"0", "true"/"false", "yes"/"no"
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}
