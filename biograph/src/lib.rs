//! biograph: a biomarker / disease / specimen / device / method knowledge
//! graph.
//!
//! The build side normalizes heterogeneous source tables, enriches them with
//! ontology, registry and literature evidence, resolves candidates onto
//! canonical entities, merges edge evidence and persists the result. The
//! query side serves ranked search and bounded subgraphs over the store.

pub mod artifacts;
pub mod collaborators;
pub mod entity_resolution;
pub mod errors;
pub mod graph_db;
pub mod handlers;
pub mod knowledge_fusion;
pub mod models;
pub mod normalization;
pub mod query;
pub mod services;

pub use errors::{GraphError, GraphResult};
