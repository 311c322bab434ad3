pub mod column_roles;
pub mod normalizer;
pub mod source_config;
pub mod terms;

pub use normalizer::{normalize, normalize_sources, parse_batch, read_batch, split_list, RawBatch, RawRow};
pub use source_config::{ComentionPlan, EdgeTemplate, RoleMapping, SourceConfig, SourcesFile, ALIASES_FIELD};
pub use terms::{literature_query, TermStrategy, TermStrategyKind};
