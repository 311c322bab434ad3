pub mod enrichment;
pub mod pipeline;

pub use enrichment::{Collaborators, Enricher, EnrichmentReport};
pub use pipeline::{collaborators_from_config, BuildPipeline, PipelineReport, SourceReport};
