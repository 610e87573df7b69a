//! Sequential fallback across the known response shapes.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::normalizer::Normalizer;
use crate::engine::shapes::{Pagination, ResponseShape};
use crate::error::{AttemptFailure, CostError, CostResult, StrategyAttempt};
use crate::models::{CanonicalSeries, QueryWindow};
use crate::resolver::ResolvedEndpoint;

/// Hard stop for runaway pagination.
pub const MAX_PAGES: usize = 1000;

const AUTH_HEADER: &str = "X-Auth-Token";

/// The first shape that produced a usable series.
#[derive(Debug, Clone)]
pub struct ShapeMatch {
    pub shape: ResponseShape,
    /// Response body, with every page merged for paginated shapes.
    pub raw: Value,
    pub series: CanonicalSeries,
}

enum AttemptError {
    /// Record and move on to the next shape.
    Failed(AttemptFailure),
    /// Stop the whole chain.
    Abort(CostError),
}

impl From<AttemptFailure> for AttemptError {
    fn from(failure: AttemptFailure) -> Self {
        AttemptError::Failed(failure)
    }
}

#[derive(Debug, Clone)]
pub struct QueryStrategyChain {
    client: Client,
    shapes: Vec<ResponseShape>,
    attempt_timeout: Duration,
}

impl QueryStrategyChain {
    pub fn new(client: Client, shapes: Vec<ResponseShape>, attempt_timeout: Duration) -> Self {
        Self {
            client,
            shapes,
            attempt_timeout,
        }
    }

    /// Chain over every shape in default priority order.
    pub fn with_default_shapes(client: Client, attempt_timeout: Duration) -> Self {
        Self::new(client, ResponseShape::PRIORITY.to_vec(), attempt_timeout)
    }

    pub fn shapes(&self) -> &[ResponseShape] {
        &self.shapes
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Upper bound on the wall time of [`Self::try_all`].
    pub fn worst_case(&self) -> Duration {
        let attempts = u32::try_from(self.shapes.len()).unwrap_or(u32::MAX);
        self.attempt_timeout.saturating_mul(attempts)
    }

    /// Tries each shape in order until one yields a series the normalizer
    /// accepts.
    ///
    /// A credential rejection (401/403) aborts immediately with
    /// `EndpointUnavailable`. Every other failure is recorded and the next
    /// shape is tried; when none is left the recorded attempts are returned
    /// in `NoCompatibleEndpoint`.
    pub async fn try_all(
        &self,
        endpoint: &ResolvedEndpoint,
        project_id: &str,
        window: &QueryWindow,
        normalizer: &Normalizer,
    ) -> CostResult<ShapeMatch> {
        let mut attempts = Vec::with_capacity(self.shapes.len());

        for &shape in &self.shapes {
            debug!(shape = %shape, "Trying rating response shape");

            let outcome = tokio::time::timeout(
                self.attempt_timeout,
                self.attempt(shape, endpoint, project_id, window, normalizer),
            )
            .await
            .unwrap_or(Err(AttemptError::Failed(AttemptFailure::Timeout(
                self.attempt_timeout,
            ))));

            match outcome {
                Ok(found) => {
                    info!(
                        shape = %shape,
                        points = found.series.len(),
                        attempts = attempts.len() + 1,
                        "Rating response shape matched"
                    );
                    return Ok(found);
                }
                Err(AttemptError::Abort(err)) => {
                    warn!(shape = %shape, "Rating service rejected credentials");
                    return Err(err);
                }
                Err(AttemptError::Failed(failure)) => {
                    debug!(shape = %shape, reason = %failure, "Rating response shape failed");
                    attempts.push(StrategyAttempt { shape, failure });
                }
            }
        }

        warn!(tried = attempts.len(), "No rating response shape matched");
        Err(CostError::NoCompatibleEndpoint { attempts })
    }

    async fn attempt(
        &self,
        shape: ResponseShape,
        endpoint: &ResolvedEndpoint,
        project_id: &str,
        window: &QueryWindow,
        normalizer: &Normalizer,
    ) -> Result<ShapeMatch, AttemptError> {
        let raw = match shape.pagination() {
            Some(pagination) => {
                self.fetch_paginated(shape, pagination, endpoint, project_id, window)
                    .await?
            }
            None => {
                self.fetch_page(shape, endpoint, project_id, window, 0)
                    .await?
            }
        };

        let series = normalizer
            .try_normalize(shape, &raw, window)
            .map_err(|e| AttemptError::Failed(e.into_attempt_failure()))?;

        Ok(ShapeMatch { shape, raw, series })
    }

    /// Collects every page into the first page's body, appending each
    /// page's items to the first page's item array.
    async fn fetch_paginated(
        &self,
        shape: ResponseShape,
        pagination: Pagination,
        endpoint: &ResolvedEndpoint,
        project_id: &str,
        window: &QueryWindow,
    ) -> Result<Value, AttemptError> {
        let mut merged = self
            .fetch_page(shape, endpoint, project_id, window, 0)
            .await?;
        let mut collected = page_items(&merged, pagination)?.len();
        let total = reported_total(&merged, pagination);

        let mut pages = 1;
        while collected > 0 && total.is_some_and(|t| collected < t) && pages < MAX_PAGES {
            let page = self
                .fetch_page(shape, endpoint, project_id, window, collected)
                .await?;
            let items = page_items(&page, pagination)?;
            if items.is_empty() {
                break;
            }
            collected += items.len();
            pages += 1;

            if let Some(target) = merged
                .pointer_mut(pagination.items)
                .and_then(Value::as_array_mut)
            {
                target.extend(items.iter().cloned());
            }
        }

        if pages == MAX_PAGES && total.is_some_and(|t| collected < t) {
            warn!(shape = %shape, collected, "Stopped paginating at the page limit");
        }

        Ok(merged)
    }

    async fn fetch_page(
        &self,
        shape: ResponseShape,
        endpoint: &ResolvedEndpoint,
        project_id: &str,
        window: &QueryWindow,
        offset: usize,
    ) -> Result<Value, AttemptError> {
        let url = endpoint.url(shape.path());

        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &endpoint.token)
            .query(&shape.query_params(project_id, window, offset))
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        debug!(shape = %shape, status = status.as_u16(), offset, "Rating service responded");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AttemptError::Abort(CostError::endpoint_unavailable(format!(
                "rating service rejected the token (HTTP {}) at {}",
                status.as_u16(),
                url
            ))));
        }
        if status.is_server_error() {
            return Err(AttemptFailure::ServerError(status.as_u16()).into());
        }
        if !status.is_success() {
            return Err(AttemptFailure::UnknownResource(status.as_u16()).into());
        }

        let body = response.bytes().await.map_err(transport_failure)?;
        serde_json::from_slice(&body).map_err(|e| {
            AttemptFailure::Unparseable(format!("body is not JSON: {}", e)).into()
        })
    }
}

fn transport_failure(err: reqwest::Error) -> AttemptError {
    AttemptError::Failed(AttemptFailure::Transport(err.to_string()))
}

fn page_items(page: &Value, pagination: Pagination) -> Result<&Vec<Value>, AttemptFailure> {
    page.pointer(pagination.items)
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AttemptFailure::Unparseable(format!("missing array at '{}'", pagination.items))
        })
}

fn reported_total(page: &Value, pagination: Pagination) -> Option<usize> {
    page.pointer(pagination.total)
        .and_then(Value::as_u64)
        .and_then(|t| usize::try_from(t).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SUMMARY: Pagination = Pagination {
        total: "/total",
        items: "/results",
    };

    #[test]
    fn test_page_items_requires_array() {
        let page = json!({ "total": 2, "results": [[1], [2]] });
        assert_eq!(page_items(&page, SUMMARY).unwrap().len(), 2);

        let page = json!({ "total": 2, "results": "nope" });
        assert!(matches!(
            page_items(&page, SUMMARY),
            Err(AttemptFailure::Unparseable(_))
        ));
    }

    #[test]
    fn test_reported_total() {
        assert_eq!(reported_total(&json!({ "total": 1500 }), SUMMARY), Some(1500));
        assert_eq!(reported_total(&json!({ "total": "1500" }), SUMMARY), None);
        assert_eq!(reported_total(&json!({}), SUMMARY), None);
    }

    #[test]
    fn test_worst_case_scales_with_shapes() {
        let chain = QueryStrategyChain::with_default_shapes(Client::new(), Duration::from_secs(20));
        assert_eq!(chain.worst_case(), Duration::from_secs(80));

        let chain = QueryStrategyChain::new(
            Client::new(),
            vec![ResponseShape::ReportSummaryV1],
            Duration::from_secs(5),
        );
        assert_eq!(chain.worst_case(), Duration::from_secs(5));
        assert_eq!(chain.shapes(), &[ResponseShape::ReportSummaryV1]);
    }

    #[test]
    fn test_worst_case_saturates() {
        let chain = QueryStrategyChain::with_default_shapes(Client::new(), Duration::MAX);
        assert_eq!(chain.worst_case(), Duration::MAX);
    }
}
