use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

use crate::models::EntityType;

#[derive(Error, Debug)]
pub enum GraphError {
    /// A row is missing a mandatory field. The row is skipped and counted.
    #[error("Source format error in {source_name} row {row}: {reason}")]
    SourceFormat {
        source_name: String,
        row: usize,
        reason: String,
    },

    /// A join key matched more than one canonical entity. Never merged.
    #[error("Ambiguous {entity_type} key '{join_key}' matches {} canonical entities", .candidates.len())]
    ResolutionAmbiguity {
        entity_type: EntityType,
        join_key: String,
        candidates: Vec<String>,
    },

    /// A literature, ontology or registry call failed or timed out.
    #[error("External query failed ({service}) for '{query}': {reason}")]
    ExternalQuery {
        service: String,
        query: String,
        reason: String,
    },

    #[error("Graph write conflict: {0}")]
    GraphWriteConflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Neo4j error: {0}")]
    Neo4j(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),

    #[error("Invalid relation type: {0}")]
    InvalidRelationType(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GraphError {
    pub fn external(service: &str, query: &str, reason: impl ToString) -> Self {
        GraphError::ExternalQuery {
            service: service.to_string(),
            query: query.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<biograph_config::ConfigError> for GraphError {
    fn from(err: biograph_config::ConfigError) -> Self {
        GraphError::Config(err.to_string())
    }
}

impl From<neo4rs::Error> for GraphError {
    fn from(err: neo4rs::Error) -> Self {
        GraphError::Neo4j(err.to_string())
    }
}

impl ResponseError for GraphError {
    fn error_response(&self) -> HttpResponse {
        let status_code = match self {
            GraphError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            GraphError::InvalidEntityType(_)
            | GraphError::InvalidRelationType(_)
            | GraphError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
