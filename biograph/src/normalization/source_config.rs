use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::errors::{GraphError, GraphResult};
use crate::models::{EntityType, Provenance, RelationType};

use super::terms::TermStrategyKind;

/// List field name that feeds the alias set rather than a list attribute
pub const ALIASES_FIELD: &str = "aliases";

fn default_delimiter() -> char {
    ','
}

fn default_list_delimiter() -> String {
    ";".to_string()
}

fn default_true() -> bool {
    true
}

fn default_min_count() -> u64 {
    1
}

/// How one entity role is read out of a source row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleMapping {
    pub role: String,
    pub entity_type: EntityType,
    /// Source-local id column. Falls back to the column heuristic when absent.
    pub id_field: Option<String>,
    /// Name column. Falls back to the column heuristic when absent.
    pub name_field: Option<String>,
    /// Column carrying an ontology or registry code
    pub code_field: Option<String>,
    /// attribute name -> column holding a delimited list
    #[serde(default)]
    pub list_fields: BTreeMap<String, String>,
    /// attribute name -> column holding a scalar
    #[serde(default)]
    pub attribute_fields: BTreeMap<String, String>,
    /// A row without a name for a required role is dropped
    #[serde(default = "default_true")]
    pub required: bool,
}

/// How one edge is built from the roles of a row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeTemplate {
    pub relation: RelationType,
    pub from: String,
    pub to: String,
    pub count_field: Option<String>,
    pub query_field: Option<String>,
    pub strength_field: Option<String>,
    pub evidence_source_field: Option<String>,
    /// Fixed strength label when the source has no strength column
    pub strength: Option<String>,
    /// Fixed evidence-source tag when the source has no such column
    pub evidence_source: Option<String>,
    #[serde(default)]
    pub list_fields: BTreeMap<String, String>,
    /// Ask the literature collaborator when the row has no count
    #[serde(default)]
    pub count_missing: bool,
}

/// One input table and its column mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
    pub provenance: Provenance,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_list_delimiter")]
    pub list_delimiter: String,
    #[serde(default)]
    pub term_strategy: TermStrategyKind,
    pub roles: Vec<RoleMapping>,
    #[serde(default)]
    pub edges: Vec<EdgeTemplate>,
}

impl SourceConfig {
    pub fn role(&self, name: &str) -> Option<&RoleMapping> {
        self.roles.iter().find(|r| r.role == name)
    }
}

/// Cross two role lists and count literature co-mentions for every pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComentionPlan {
    pub name: String,
    pub biomarker_source: String,
    pub biomarker_role: String,
    pub disease_source: String,
    pub disease_role: String,
    /// Pairs whose successful count is below this are not turned into edges
    #[serde(default = "default_min_count")]
    pub min_count: u64,
    pub max_pairs: Option<usize>,
    #[serde(default)]
    pub term_strategy: TermStrategyKind,
}

/// The JSON document named by PIPELINE_SOURCES
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcesFile {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub comention: Vec<ComentionPlan>,
}

impl SourcesFile {
    /// Load and validate; relative source paths are resolved against the
    /// directory of the configuration file.
    pub fn from_path(path: &Path) -> GraphResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Config(format!("cannot read sources file {}: {}", path.display(), e))
        })?;
        let mut file: SourcesFile = serde_json::from_str(&content)?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for source in &mut file.sources {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }

        file.validate()?;
        Ok(file)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn validate(&self) -> GraphResult<()> {
        let mut names = BTreeSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(GraphError::Config(format!("duplicate source name '{}'", source.name)));
            }
            if source.roles.is_empty() {
                return Err(GraphError::Config(format!("source '{}' declares no roles", source.name)));
            }

            let mut roles = BTreeSet::new();
            for role in &source.roles {
                if !roles.insert(role.role.as_str()) {
                    return Err(GraphError::Config(format!(
                        "source '{}' declares role '{}' twice",
                        source.name, role.role
                    )));
                }
            }

            for edge in &source.edges {
                let (from_type, to_type) = edge.relation.endpoints();
                check_endpoint(source, &edge.from, from_type, edge.relation)?;
                check_endpoint(source, &edge.to, to_type, edge.relation)?;
            }
        }

        for plan in &self.comention {
            let biomarkers = self.source(&plan.biomarker_source).ok_or_else(|| {
                GraphError::Config(format!("co-mention plan '{}' names unknown source '{}'", plan.name, plan.biomarker_source))
            })?;
            check_endpoint(biomarkers, &plan.biomarker_role, EntityType::Biomarker, RelationType::AssociatedWith)?;

            let diseases = self.source(&plan.disease_source).ok_or_else(|| {
                GraphError::Config(format!("co-mention plan '{}' names unknown source '{}'", plan.name, plan.disease_source))
            })?;
            check_endpoint(diseases, &plan.disease_role, EntityType::Disease, RelationType::AssociatedWith)?;
        }

        Ok(())
    }
}

fn check_endpoint(
    source: &SourceConfig,
    role: &str,
    expected: EntityType,
    relation: RelationType,
) -> GraphResult<()> {
    match source.role(role) {
        Some(mapping) if mapping.entity_type == expected => Ok(()),
        Some(mapping) => Err(GraphError::Config(format!(
            "source '{}': {} needs a {} endpoint but role '{}' is a {}",
            source.name, relation, expected, role, mapping.entity_type
        ))),
        None => Err(GraphError::Config(format!(
            "source '{}': edge {} references unknown role '{}'",
            source.name, relation, role
        ))),
    }
}
