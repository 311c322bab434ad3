//! Batch build of the knowledge graph from the configured sources.
//!
//! Reads PIPELINE_SOURCES, writes stage artifacts under
//! PIPELINE_ARTIFACTS_DIR and upserts the result into the configured store.
//! Rerunning with unchanged inputs leaves the store content unchanged.

use anyhow::Context;
use biograph::artifacts::ArtifactStore;
use biograph::graph_db;
use biograph::normalization::SourcesFile;
use biograph::services::{collaborators_from_config, BuildPipeline, Enricher};
use biograph_config::AppConfig;
use biograph_observability::{init_tracing, TracingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing(TracingConfig::for_binary("build-graph"));

    let config = AppConfig::from_env().context("invalid configuration")?;
    let sources_path = config.pipeline.require_sources()?;
    let sources = SourcesFile::from_path(sources_path)
        .with_context(|| format!("cannot load sources from {}", sources_path.display()))?;

    let artifacts = ArtifactStore::open(&config.pipeline.artifacts_dir)?;
    let store = graph_db::connect(&config.store).await.context("cannot reach graph store")?;
    let enricher = Enricher::new(collaborators_from_config(&config)?, config.lookup);

    let report = BuildPipeline::new(sources, artifacts, store, enricher).run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
