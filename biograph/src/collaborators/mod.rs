//! Interfaces to the external evidence sources consulted while building
//! the graph, with the implementations the build binary wires in.

pub mod device_registry;
pub mod lookup;
pub mod ontology_table;
pub mod pubmed;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::GraphResult;

pub use device_registry::{DeviceLinkRule, KeywordDeviceRegistry};
pub use lookup::{BatchLookup, LookupOutcome};
pub use ontology_table::OntologyTable;
pub use pubmed::PubmedClient;

/// Literature co-mention counts
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    /// Service tag used in logs and failure counts
    fn name(&self) -> &str;

    /// Number of records mentioning both terms. An empty `term_b` counts
    /// records mentioning `term_a` alone.
    async fn count(&self, term_a: &str, term_b: &str) -> GraphResult<u64>;
}

/// What the ontology knows about a disease name or code
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OntologyMatch {
    pub canonical_id: Option<String>,
    pub name: Option<String>,
    pub synonyms: BTreeSet<String>,
    pub parent_ids: BTreeSet<String>,
    pub category_flag: Option<bool>,
}

impl OntologyMatch {
    pub fn is_resolved(&self) -> bool {
        self.canonical_id.is_some()
    }
}

/// Disease ontology lookups. Unresolvable names yield an empty match,
/// not an error.
#[async_trait]
pub trait OntologyResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, raw: &str) -> GraphResult<OntologyMatch>;
}

/// A device registry record plus the detection method inferred from it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryRecord {
    pub structured: BTreeMap<String, String>,
    pub method: Option<String>,
}

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, raw: &str) -> GraphResult<RegistryRecord>;
}
