use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use biograph::artifacts::ArtifactStore;
use biograph::graph_db::{self, GraphStore, MemoryGraphStore};
use biograph::handlers;
use biograph::query::QueryEngine;
use biograph_config::{AppConfig, StoreConfig};
use biograph_observability::{init_tracing, TracingConfig};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing(TracingConfig::for_binary("biograph-query"));

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn GraphStore> = match &config.store {
        StoreConfig::Memory => {
            // memory mode serves whatever the last build left in the artifacts
            let artifacts = ArtifactStore::open(&config.pipeline.artifacts_dir)?;
            let snapshot = artifacts.load_snapshot()?;
            tracing::info!(
                "📂 [Query Service] Loaded {} nodes and {} edges from {}",
                snapshot.nodes.len(),
                snapshot.edges.len(),
                artifacts.dir().display()
            );
            Arc::new(MemoryGraphStore::from_snapshot(snapshot)?)
        }
        store_config => graph_db::connect(store_config).await?,
    };

    let engine = web::Data::new(QueryEngine::new(store, config.query));
    let port = config.server_port;

    tracing::info!("🚀 [Query Service] Starting on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header();

        App::new()
            .app_data(engine.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(
                web::scope("/api/graph")
                    // Search and neighborhood
                    .route("/search", web::get().to(handlers::search))
                    .route("/subgraph", web::get().to(handlers::get_subgraph))
                    .route("/subgraph", web::post().to(handlers::post_subgraph))

                    // Detection methods
                    .route("/methods", web::get().to(handlers::method_summary))
                    .route("/methods/devices", web::get().to(handlers::devices_by_method))

                    // Statistics
                    .route("/statistics", web::get().to(handlers::get_statistics)),
            )
            .route("/health", web::get().to(handlers::health))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    Ok(())
}
