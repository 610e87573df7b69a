//! Resolution of the rating service base URL and credential.

mod keystone;

use std::fmt;

use async_trait::async_trait;

use crate::error::CostResult;

pub use keystone::{token_url, KeystoneResolver};

/// A reachable rating service plus the token to present to it.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// Base URL without a trailing slash, e.g. `http://rating:8889`.
    pub base_url: String,
    pub token: String,
}

impl ResolvedEndpoint {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Joins `path` (which starts with `/`) onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl fmt::Debug for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEndpoint")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Source of the rating endpoint for one query run.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn resolve(&self) -> CostResult<ResolvedEndpoint>;

    /// Confirms `project_id` exists. Resolvers without an identity service
    /// accept every project.
    async fn verify_project(
        &self,
        _endpoint: &ResolvedEndpoint,
        _project_id: &str,
    ) -> CostResult<()> {
        Ok(())
    }
}

/// Fixed endpoint and token, for pre-obtained credentials and tests.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    endpoint: ResolvedEndpoint,
}

impl StaticResolver {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: ResolvedEndpoint::new(base_url, token),
        }
    }
}

#[async_trait]
impl EndpointResolver for StaticResolver {
    fn name(&self) -> &str {
        "static"
    }

    async fn resolve(&self) -> CostResult<ResolvedEndpoint> {
        Ok(self.endpoint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let endpoint = ResolvedEndpoint::new("http://rating:8889/", "s3cret");
        let debug = format!("{:?}", endpoint);

        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("http://rating:8889"));
    }

    #[test]
    fn test_url_join_strips_trailing_slash() {
        let endpoint = ResolvedEndpoint::new("http://rating:8889//", "t");
        assert_eq!(endpoint.url("/v2/summary"), "http://rating:8889/v2/summary");
    }

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new("http://rating", "t");
        let endpoint = resolver.resolve().await.unwrap();

        assert_eq!(endpoint.base_url, "http://rating");
        assert_eq!(endpoint.token, "t");
        assert!(resolver.verify_project(&endpoint, "anything").await.is_ok());
    }
}
