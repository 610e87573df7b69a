//! The cost query pipeline: resolve, try shapes, normalize, aggregate.

pub mod aggregator;
pub mod chain;
pub mod normalizer;
pub mod shapes;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::CloudCostConfig;
use crate::error::{CostError, CostResult};
use crate::models::query::start_of_month;
use crate::models::{CanonicalSeries, CostBucket, CostQuery, CostReport, QueryWindow, Resolution};
use crate::resolver::{EndpointResolver, KeystoneResolver, StaticResolver};

pub use aggregator::{aggregate, bucket_edges, fill_buckets, resample, MAX_BUCKETS};
pub use chain::{QueryStrategyChain, ShapeMatch, MAX_PAGES};
pub use normalizer::{parse_instant, Normalizer};
pub use shapes::{ResponseShape, PAGE_SIZE};

/// Runs cost queries end to end. Holds no per-request state, so one engine
/// is shared by every request.
pub struct CostQueryEngine {
    resolver: Arc<dyn EndpointResolver>,
    chain: QueryStrategyChain,
    normalizer: Normalizer,
    resolver_timeout: Duration,
}

impl CostQueryEngine {
    pub fn new(
        resolver: Arc<dyn EndpointResolver>,
        chain: QueryStrategyChain,
        normalizer: Normalizer,
        resolver_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            chain,
            normalizer,
            resolver_timeout,
        }
    }

    /// Builds the engine a deployment describes: a static endpoint when both
    /// `rating.endpoint` and `rating.token` are set, Keystone otherwise.
    pub fn from_config(config: &CloudCostConfig) -> CostResult<Self> {
        let client = build_client(config)?;
        let rating = &config.rating;

        let resolver: Arc<dyn EndpointResolver> = match (&rating.endpoint, &rating.token) {
            (Some(endpoint), Some(token)) if rating.uses_static_token() => {
                Arc::new(StaticResolver::new(endpoint.trim(), token.trim()))
            }
            _ => Arc::new(
                KeystoneResolver::new(client.clone(), config.identity.clone())
                    .with_endpoint_override(rating.endpoint.clone()),
            ),
        };

        let chain = QueryStrategyChain::new(
            client,
            rating.response_shapes()?,
            rating.attempt_timeout(),
        );

        info!(
            resolver = resolver.name(),
            shapes = chain.shapes().len(),
            "Cost query engine ready"
        );

        Ok(Self::new(
            resolver,
            chain,
            Normalizer::new(rating.default_currency.trim()),
            rating.resolver_timeout(),
        ))
    }

    pub fn shapes(&self) -> &[ResponseShape] {
        self.chain.shapes()
    }

    pub fn resolver(&self) -> &Arc<dyn EndpointResolver> {
        &self.resolver
    }

    /// Bound on one [`Self::run`]: resolution, project verification, then
    /// every shape attempt.
    pub fn query_timeout(&self) -> Duration {
        self.resolver_timeout
            .saturating_mul(2)
            .saturating_add(self.chain.worst_case())
    }

    /// Runs one query. Invalid input fails before any network I/O.
    pub async fn run(&self, query: CostQuery) -> CostResult<CostReport> {
        query.validate()?;
        let buckets = if query.include_series {
            Some(bucket_edges(&query.window, query.resolution)?)
        } else {
            None
        };

        self.bounded(&query, async {
            let series = self.fetch_series(&query.project_id, &query.window).await?;
            let time_series = buckets.map(|b| fill_buckets(b, &series)).transpose()?;

            Ok(CostReport {
                project_id: query.project_id.clone(),
                start: query.window.start(),
                end: query.window.end(),
                resolution: query.resolution,
                aggregate_cost_now: aggregate(&series)?,
                currency: series.currency,
                time_series,
            })
        })
        .await
    }

    /// Cost per completed calendar month, from the first month with data
    /// up to the start of the month containing `now`.
    pub async fn run_monthly(&self, project_id: &str, now: DateTime<Utc>) -> CostResult<CostReport> {
        let epoch = Utc.timestamp_opt(0, 0).single().unwrap_or_default();
        let window = QueryWindow::new(epoch, start_of_month(now))?;
        let query = CostQuery::new(project_id, window)
            .with_resolution(Resolution::Month)
            .with_series(true);
        query.validate()?;
        let buckets = bucket_edges(&window, Resolution::Month)?;

        self.bounded(&query, async {
            let series = self.fetch_series(&query.project_id, &window).await?;
            let months = trim_leading_empty(fill_buckets(buckets, &series)?, &series);
            let start = months.first().map(|b| b.timestamp).unwrap_or(window.start());

            Ok(CostReport {
                project_id: query.project_id.clone(),
                start,
                end: window.end(),
                resolution: Resolution::Month,
                aggregate_cost_now: aggregate(&series)?,
                currency: series.currency,
                time_series: Some(months),
            })
        })
        .await
    }

    /// Runs `work` inside the query span and the overall time bound.
    async fn bounded<F>(&self, query: &CostQuery, work: F) -> CostResult<CostReport>
    where
        F: std::future::Future<Output = CostResult<CostReport>>,
    {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "cost_query",
            %request_id,
            project_id = %query.project_id,
            resolution = %query.resolution
        );
        let limit = self.query_timeout();

        let result = tokio::time::timeout(limit, work.instrument(span.clone()))
            .await
            .unwrap_or_else(|_| Err(CostError::timeout("cost query", limit)));

        span.in_scope(|| match &result {
            Ok(report) => info!(
                aggregate = %report.aggregate_cost_now,
                currency = %report.currency,
                "Cost query completed"
            ),
            Err(err) => err.log(),
        });

        result
    }

    async fn fetch_series(
        &self,
        project_id: &str,
        window: &QueryWindow,
    ) -> CostResult<CanonicalSeries> {
        let endpoint = tokio::time::timeout(self.resolver_timeout, self.resolver.resolve())
            .await
            .map_err(|_| CostError::timeout("endpoint resolution", self.resolver_timeout))??;
        debug!(endpoint = %endpoint.base_url, "Using rating endpoint");

        tokio::time::timeout(
            self.resolver_timeout,
            self.resolver.verify_project(&endpoint, project_id),
        )
        .await
        .map_err(|_| CostError::timeout("project verification", self.resolver_timeout))??;

        let found = self
            .chain
            .try_all(&endpoint, project_id, window, &self.normalizer)
            .await?;
        Ok(found.series)
    }
}

fn trim_leading_empty(buckets: Vec<CostBucket>, series: &CanonicalSeries) -> Vec<CostBucket> {
    match series.first_timestamp() {
        Some(first) => buckets.into_iter().skip_while(|b| b.end <= first).collect(),
        None => Vec::new(),
    }
}

/// The shared HTTP client: TLS verification follows `identity.verify_tls`.
pub fn build_client(config: &CloudCostConfig) -> CostResult<Client> {
    Client::builder()
        .danger_accept_invalid_certs(!config.identity.verify_tls)
        .user_agent(concat!("cloudcost/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CostError::Config(format!("failed to build HTTP client: {}", e)))
}
