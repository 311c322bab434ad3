use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::errors::{GraphError, GraphResult};
use crate::models::{
    EntityType, ProvenanceMode, RelationType, SearchFilters, SearchRequest, SubgraphRequest,
};
use crate::query::{to_dot, QueryEngine};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub term: String,
    pub specimen: Option<String>,
    pub method: Option<String>,
    /// all | exclude_heuristic | heuristic_only
    pub provenance: Option<String>,
    pub limit: Option<usize>,
    /// Comma separated entity types
    pub types: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubgraphParams {
    pub term: String,
    pub max_nodes: Option<usize>,
    /// Comma separated relation types
    pub relations: Option<String>,
    /// `dot` renders Graphviz instead of JSON
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DevicesParams {
    pub method: String,
    pub limit: Option<usize>,
}

fn split_list<T>(raw: Option<&str>, parse: impl Fn(&str) -> Option<T>, invalid: fn(String) -> GraphError) -> GraphResult<Vec<T>> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse(s).ok_or_else(|| invalid(s.to_string())))
            .collect()
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

impl SearchParams {
    fn into_request(self) -> GraphResult<SearchRequest> {
        let provenance = match self.provenance.as_deref() {
            None | Some("") => ProvenanceMode::All,
            Some(raw) => ProvenanceMode::from_str(raw)
                .ok_or_else(|| GraphError::InvalidQuery(format!("unknown provenance mode '{}'", raw)))?,
        };
        let types = split_list(self.types.as_deref(), EntityType::from_str, GraphError::InvalidEntityType)?;

        let filters = SearchFilters {
            specimen: non_blank(&self.specimen),
            method: non_blank(&self.method),
            provenance,
        };
        let mut request = SearchRequest::new(self.term).with_filters(filters).of_types(&types);
        request.limit = self.limit;
        Ok(request)
    }
}

/// GET /api/graph/search
pub async fn search(engine: web::Data<QueryEngine>, params: web::Query<SearchParams>) -> GraphResult<HttpResponse> {
    let request = params.into_inner().into_request()?;
    let outcome = engine.search(&request).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// GET /api/graph/subgraph
pub async fn get_subgraph(
    engine: web::Data<QueryEngine>,
    params: web::Query<SubgraphParams>,
) -> GraphResult<HttpResponse> {
    let params = params.into_inner();
    let relation_types = split_list(
        params.relations.as_deref(),
        RelationType::from_str,
        GraphError::InvalidRelationType,
    )?;
    let request = SubgraphRequest {
        term: Some(params.term),
        seeds: Vec::new(),
        max_nodes: params.max_nodes,
        relation_types,
    };
    let subgraph = engine.subgraph(&request).await?;

    match params.format.as_deref() {
        Some("dot") => Ok(HttpResponse::Ok()
            .content_type("text/vnd.graphviz")
            .body(to_dot(&subgraph))),
        Some("json") | None => Ok(HttpResponse::Ok().json(subgraph)),
        Some(other) => Err(GraphError::InvalidQuery(format!("unknown format '{}'", other))),
    }
}

/// POST /api/graph/subgraph
pub async fn post_subgraph(
    engine: web::Data<QueryEngine>,
    request: web::Json<SubgraphRequest>,
) -> GraphResult<HttpResponse> {
    let subgraph = engine.subgraph(&request).await?;
    Ok(HttpResponse::Ok().json(subgraph))
}

/// GET /api/graph/methods
pub async fn method_summary(engine: web::Data<QueryEngine>) -> GraphResult<HttpResponse> {
    let methods = engine.method_summary().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "methods": methods })))
}

/// GET /api/graph/methods/devices
pub async fn devices_by_method(
    engine: web::Data<QueryEngine>,
    params: web::Query<DevicesParams>,
) -> GraphResult<HttpResponse> {
    let devices = engine.devices_by_method(&params.method, params.limit).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "method": params.method,
        "devices": devices,
    })))
}

/// GET /api/graph/statistics
pub async fn get_statistics(engine: web::Data<QueryEngine>) -> GraphResult<HttpResponse> {
    let stats = engine.store().statistics().await?;
    info!(
        nodes = stats.total_nodes,
        edges = stats.total_edges,
        "📊 [Query Service] Statistics served"
    );
    Ok(HttpResponse::Ok().json(stats))
}

/// GET /health
pub async fn health(engine: web::Data<QueryEngine>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "biograph",
        "store": engine.store().backend(),
    }))
}
