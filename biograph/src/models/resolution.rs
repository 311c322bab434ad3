use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::candidate::CandidateKey;
use super::entity::{EntityType, NodeRef};

/// Join key of a candidate: an exact ontology/registry code when one is
/// known, otherwise the normalized name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum JoinKey {
    Code(String),
    Name(String),
}

impl JoinKey {
    pub fn as_str(&self) -> &str {
        match self {
            JoinKey::Code(c) => c,
            JoinKey::Name(n) => n,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, JoinKey::Code(_))
    }
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKey::Code(c) => write!(f, "code:{}", c),
            JoinKey::Name(n) => write!(f, "name:{}", n),
        }
    }
}

/// A candidate the resolver refused to merge, kept for manual review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmbiguityRecord {
    pub candidate: CandidateKey,
    pub entity_type: EntityType,
    pub source_id: String,
    pub raw_name: String,
    pub join_key: String,
    pub matches: Vec<String>,
}

/// Result of resolving one run's candidates
#[derive(Debug, Clone, Default)]
pub struct ResolutionOutcome {
    pub assignments: BTreeMap<CandidateKey, NodeRef>,
    pub ambiguities: Vec<AmbiguityRecord>,
    pub created: usize,
    pub merged: usize,
    pub rekeyed: usize,
}

impl ResolutionOutcome {
    pub fn canonical(&self, key: &CandidateKey) -> Option<&NodeRef> {
        self.assignments.get(key)
    }
}
