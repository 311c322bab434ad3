//! Environment driven configuration for the build pipeline and the query
//! service. `.env` files are honoured through dotenv.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Connection parameters for the Neo4j graph store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub database: String,
    pub max_connections: usize,
    pub fetch_size: usize,
}

impl Neo4jConfig {
    /// Connection parameters are the one piece of configuration without a
    /// default: a missing URI, user or password is fatal at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let uri = required("NEO4J_URI")?;
        let user = required("NEO4J_USER")?;
        let password = required("NEO4J_PASSWORD")?;

        Ok(Self {
            uri,
            user,
            password,
            database: env::var("NEO4J_DATABASE").unwrap_or_else(|_| "neo4j".to_string()),
            max_connections: parsed_or("NEO4J_MAX_CONNECTIONS", 10),
            fetch_size: parsed_or("NEO4J_FETCH_SIZE", 500),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Neo4j(Neo4jConfig),
    /// In-process store loaded from the merged stage artifacts
    Memory,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = env::var("GRAPH_STORE").unwrap_or_else(|_| "neo4j".to_string());
        match backend.to_lowercase().as_str() {
            "neo4j" => Ok(StoreConfig::Neo4j(Neo4jConfig::from_env()?)),
            "memory" => Ok(StoreConfig::Memory),
            _ => Err(ConfigError::Invalid { key: "GRAPH_STORE", value: backend }),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreConfig::Neo4j(_) => "neo4j",
            StoreConfig::Memory => "memory",
        }
    }
}

/// Bounds applied to every search and expansion request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryLimits {
    pub default_limit: usize,
    pub max_limit: usize,
    /// How many text matches are fetched from the store before ranking
    pub candidate_pool: usize,
    pub max_hops: usize,
    pub max_neighbors_per_relation: usize,
    pub max_nodes: usize,
    /// How many top search hits seed a term-based subgraph
    pub seed_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 500,
            candidate_pool: 1000,
            max_hops: 2,
            max_neighbors_per_relation: 25,
            max_nodes: 150,
            seed_limit: 5,
        }
    }
}

impl QueryLimits {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_limit: parsed_or("QUERY_DEFAULT_LIMIT", defaults.default_limit),
            max_limit: parsed_or("QUERY_MAX_LIMIT", defaults.max_limit),
            candidate_pool: parsed_or("QUERY_CANDIDATE_POOL", defaults.candidate_pool),
            max_hops: parsed_or("EXPAND_MAX_HOPS", defaults.max_hops),
            max_neighbors_per_relation: parsed_or(
                "EXPAND_MAX_NEIGHBORS_PER_RELATION",
                defaults.max_neighbors_per_relation,
            ),
            max_nodes: parsed_or("SUBGRAPH_MAX_NODES", defaults.max_nodes),
            seed_limit: parsed_or("SUBGRAPH_SEED_LIMIT", defaults.seed_limit),
        }
    }
}

/// NCBI E-utilities settings for the literature co-mention collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteratureConfig {
    pub enabled: bool,
    pub base_url: String,
    pub email: String,
    pub tool: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub rate_per_second: u32,
    pub timeout_secs: u64,
}

impl LiteratureConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: parsed_or("LITERATURE_ENABLED", false),
            base_url: env::var("NCBI_EUTILS_URL").unwrap_or_else(|_| {
                "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi".to_string()
            }),
            email: env::var("NCBI_EMAIL").unwrap_or_else(|_| "biograph@example.com".to_string()),
            tool: env::var("NCBI_TOOL").unwrap_or_else(|_| "biograph".to_string()),
            api_key: env::var("NCBI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            rate_per_second: parsed_or("LITERATURE_RATE_PER_SECOND", 3),
            timeout_secs: parsed_or("LITERATURE_TIMEOUT_SECS", 15),
        }
    }
}

/// Retry policy for rate-limited evidence lookups
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupConfig {
    /// Batch passes over the pending lookups, the first pass included
    pub max_attempts: u32,
    pub backoff_ms: u64,
    /// Lookups in flight at once inside one pass
    pub concurrency: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            concurrency: 4,
        }
    }
}

impl LookupConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: parsed_or("LOOKUP_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            backoff_ms: parsed_or("LOOKUP_BACKOFF_MS", defaults.backoff_ms),
            concurrency: parsed_or("LOOKUP_CONCURRENCY", defaults.concurrency).max(1),
        }
    }
}

/// Input and artifact locations for the build pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub sources_path: Option<PathBuf>,
    pub artifacts_dir: PathBuf,
    pub ontology_table: Option<PathBuf>,
    pub device_rules: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            sources_path: env::var("PIPELINE_SOURCES").ok().map(PathBuf::from),
            artifacts_dir: env::var("PIPELINE_ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/artifacts")),
            ontology_table: env::var("ONTOLOGY_TABLE").ok().map(PathBuf::from),
            device_rules: env::var("DEVICE_RULES").ok().map(PathBuf::from),
        }
    }

    /// The source list is required to run a build, not to serve queries.
    pub fn require_sources(&self) -> Result<&PathBuf, ConfigError> {
        self.sources_path
            .as_ref()
            .ok_or(ConfigError::Missing("PIPELINE_SOURCES"))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub query: QueryLimits,
    pub literature: LiteratureConfig,
    pub lookup: LookupConfig,
    pub pipeline: PipelineConfig,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let config = Self {
            store: StoreConfig::from_env()?,
            query: QueryLimits::from_env(),
            literature: LiteratureConfig::from_env(),
            lookup: LookupConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
            server_port: parsed_or("GRAPH_PORT", 8006),
        };

        tracing::debug!(
            store = config.store.backend_name(),
            artifacts_dir = %config.pipeline.artifacts_dir.display(),
            literature_enabled = config.literature.enabled,
            "⚙️ [Config] Loaded configuration"
        );

        Ok(config)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "⚠️ [Config] Unparseable value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_store_env() {
        for key in ["GRAPH_STORE", "NEO4J_URI", "NEO4J_USER", "NEO4J_PASSWORD", "NEO4J_DATABASE"] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_missing_neo4j_uri_is_fatal() {
        clear_store_env();
        env::set_var("NEO4J_USER", "neo4j");
        env::set_var("NEO4J_PASSWORD", "secret");

        let err = StoreConfig::from_env().unwrap_err();
        assert_eq!(err, ConfigError::Missing("NEO4J_URI"));
        clear_store_env();
    }

    #[test]
    #[serial]
    fn test_memory_store_needs_no_connection() {
        clear_store_env();
        env::set_var("GRAPH_STORE", "memory");

        assert!(matches!(StoreConfig::from_env(), Ok(StoreConfig::Memory)));
        clear_store_env();
    }

    #[test]
    #[serial]
    fn test_neo4j_defaults() {
        clear_store_env();
        env::set_var("NEO4J_URI", "bolt://localhost:7687");
        env::set_var("NEO4J_USER", "neo4j");
        env::set_var("NEO4J_PASSWORD", "secret");

        match StoreConfig::from_env() {
            Ok(StoreConfig::Neo4j(cfg)) => {
                assert_eq!(cfg.database, "neo4j");
                assert_eq!(cfg.max_connections, 10);
            }
            other => panic!("unexpected store config: {:?}", other),
        }
        clear_store_env();
    }

    #[test]
    #[serial]
    fn test_unknown_backend_rejected() {
        clear_store_env();
        env::set_var("GRAPH_STORE", "postgres");
        assert!(matches!(
            StoreConfig::from_env(),
            Err(ConfigError::Invalid { key: "GRAPH_STORE", .. })
        ));
        clear_store_env();
    }

    #[test]
    #[serial]
    fn test_query_limits_fall_back_on_garbage() {
        env::set_var("EXPAND_MAX_HOPS", "three");
        env::set_var("SUBGRAPH_MAX_NODES", "40");

        let limits = QueryLimits::from_env();
        assert_eq!(limits.max_hops, QueryLimits::default().max_hops);
        assert_eq!(limits.max_nodes, 40);

        env::remove_var("EXPAND_MAX_HOPS");
        env::remove_var("SUBGRAPH_MAX_NODES");
    }

    #[test]
    fn test_require_sources() {
        let cfg = PipelineConfig {
            sources_path: None,
            artifacts_dir: PathBuf::from("data/artifacts"),
            ontology_table: None,
            device_rules: None,
        };
        assert_eq!(cfg.require_sources().unwrap_err(), ConfigError::Missing("PIPELINE_SOURCES"));
    }
}
