use async_trait::async_trait;
use biograph_config::LiteratureConfig;
use biograph_observability::log_external_call;
use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use nonzero_ext::*;
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{GraphError, GraphResult};
use crate::normalization::literature_query;

use super::LiteratureSource;

const SERVICE: &str = "pubmed";

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    count: String,
}

/// Co-mention counts from NCBI ESearch
#[derive(Clone)]
pub struct PubmedClient {
    base_url: String,
    email: String,
    tool: String,
    api_key: Option<String>,
    client: Client,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl PubmedClient {
    pub fn new(config: &LiteratureConfig) -> GraphResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GraphError::Config(format!("cannot build literature client: {}", e)))?;

        let rate = NonZeroU32::new(config.rate_per_second).unwrap_or(nonzero!(1u32));

        Ok(Self {
            base_url: config.base_url.clone(),
            email: config.email.clone(),
            tool: config.tool.clone(),
            api_key: config.api_key.clone(),
            client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    /// Hit count of a raw ESearch term
    pub async fn count_query(&self, query: &str) -> GraphResult<u64> {
        self.limiter.until_ready().await;
        log_external_call!(SERVICE, query);
        let started = Instant::now();

        let mut params = vec![
            ("db", "pubmed"),
            ("term", query),
            ("retmode", "json"),
            ("email", self.email.as_str()),
            ("tool", self.tool.as_str()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.as_str()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| GraphError::external(SERVICE, query, e))?;

        let status = response.status();
        if !status.is_success() {
            log_external_call!(SERVICE, query, started.elapsed().as_millis() as u64, status.as_u16());
            return Err(GraphError::external(SERVICE, query, format!("HTTP {}", status)));
        }

        let body: ESearchResponse = response
            .json()
            .await
            .map_err(|e| GraphError::external(SERVICE, query, e))?;
        log_external_call!(SERVICE, query, started.elapsed().as_millis() as u64, status.as_u16());

        body.esearchresult
            .count
            .trim()
            .parse::<u64>()
            .map_err(|e| GraphError::external(SERVICE, query, format!("bad count '{}': {}", body.esearchresult.count, e)))
    }
}

#[async_trait]
impl LiteratureSource for PubmedClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn count(&self, term_a: &str, term_b: &str) -> GraphResult<u64> {
        self.count_query(&literature_query(term_a, term_b)).await
    }
}
