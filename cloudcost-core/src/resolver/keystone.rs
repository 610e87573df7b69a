use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{EndpointResolver, ResolvedEndpoint};
use crate::config::IdentityConfig;
use crate::error::{CostError, CostResult};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
const RATING_SERVICE_TYPE: &str = "rating";

/// Authenticates against a Keystone v3 identity service and finds the rating
/// endpoint in the returned service catalog.
pub struct KeystoneResolver {
    client: Client,
    identity: IdentityConfig,
    endpoint_override: Option<String>,
}

impl KeystoneResolver {
    pub fn new(client: Client, identity: IdentityConfig) -> Self {
        Self {
            client,
            identity,
            endpoint_override: None,
        }
    }

    /// Use `endpoint` instead of the catalog entry. The token is still issued
    /// by Keystone.
    pub fn with_endpoint_override(mut self, endpoint: Option<String>) -> Self {
        self.endpoint_override = endpoint
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty());
        self
    }

    fn auth_url(&self) -> CostResult<&str> {
        self.identity
            .auth_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CostError::endpoint_unavailable("identity auth_url is not configured"))
    }

    fn auth_body(&self) -> CostResult<Value> {
        let (username, password) = match (&self.identity.username, &self.identity.password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => (user, pass),
            _ => {
                return Err(CostError::endpoint_unavailable(
                    "identity username and password are required",
                ))
            }
        };

        let project = if let Some(id) = non_empty(&self.identity.project_id) {
            json!({ "id": id })
        } else if let Some(name) = non_empty(&self.identity.project_name) {
            json!({ "name": name, "domain": { "name": self.identity.project_domain } })
        } else {
            return Err(CostError::endpoint_unavailable(
                "set identity project_id or project_name to scope the token",
            ));
        };

        Ok(json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": username,
                            "domain": { "name": self.identity.user_domain },
                            "password": password,
                        }
                    }
                },
                "scope": { "project": project }
            }
        }))
    }

    fn find_rating_endpoint(&self, catalog: &[CatalogService]) -> CostResult<String> {
        let region = non_empty(&self.identity.region_name);

        catalog
            .iter()
            .filter(|service| service.service_type == RATING_SERVICE_TYPE)
            .flat_map(|service| service.endpoints.iter())
            .find(|endpoint| {
                endpoint.interface == self.identity.interface
                    && region.map_or(true, |r| {
                        endpoint.region.as_deref() == Some(r)
                            || endpoint.region_id.as_deref() == Some(r)
                    })
            })
            .map(|endpoint| endpoint.url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                CostError::endpoint_unavailable(format!(
                    "no '{}' endpoint with interface '{}'{} in the service catalog; set CLOUDKITTY_ENDPOINT",
                    RATING_SERVICE_TYPE,
                    self.identity.interface,
                    region.map(|r| format!(" in region '{}'", r)).unwrap_or_default()
                ))
            })
    }
}

#[async_trait]
impl EndpointResolver for KeystoneResolver {
    fn name(&self) -> &str {
        "keystone"
    }

    async fn resolve(&self) -> CostResult<ResolvedEndpoint> {
        let url = token_url(self.auth_url()?)?;
        let body = self.auth_body()?;

        debug!(url = %url, "Requesting identity token");
        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Identity authentication failed");
            return Err(CostError::endpoint_unavailable(format!(
                "identity authentication failed with HTTP {}",
                status.as_u16()
            )));
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CostError::endpoint_unavailable("identity response carried no X-Subject-Token")
            })?;

        let base_url = match &self.endpoint_override {
            Some(endpoint) => endpoint.clone(),
            None => {
                let text = response.text().await?;
                let body: TokenBody = serde_json::from_str(&text).map_err(|e| {
                    CostError::endpoint_unavailable(format!("identity token body is invalid: {}", e))
                })?;
                self.find_rating_endpoint(&body.token.catalog)?
            }
        };

        info!(endpoint = %base_url, "Resolved rating endpoint");
        Ok(ResolvedEndpoint::new(base_url, token))
    }

    async fn verify_project(&self, endpoint: &ResolvedEndpoint, project_id: &str) -> CostResult<()> {
        if !self.identity.verify_project {
            return Ok(());
        }

        let url = project_url(&token_url(self.auth_url()?)?, project_id)?;
        debug!(project_id = %project_id, "Verifying project exists");

        let response = self
            .client
            .get(url)
            .header("X-Auth-Token", &endpoint.token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CostError::ProjectNotFound(project_id.to_string())),
            status => Err(CostError::endpoint_unavailable(format!(
                "unable to verify project '{}' (HTTP {})",
                project_id,
                status.as_u16()
            ))),
        }
    }
}

/// Derives the Keystone v3 token URL from a configured auth URL.
///
/// `http://ks:5000` and `http://ks:5000/identity` gain `/v3`; URLs already
/// ending in `/auth/tokens` are kept.
pub fn token_url(auth_url: &str) -> CostResult<String> {
    let mut url = Url::parse(auth_url.trim()).map_err(|e| {
        CostError::endpoint_unavailable(format!("invalid identity auth_url '{}': {}", auth_url, e))
    })?;

    let path = url.path().trim_end_matches('/').to_string();
    if path.ends_with("/auth/tokens") {
        url.set_path(&path);
        return Ok(url.to_string());
    }

    let base = if path.is_empty() {
        "/v3".to_string()
    } else if path.ends_with("/v3") {
        path
    } else {
        format!("{}/v3", path)
    };
    url.set_path(&format!("{}/auth/tokens", base));
    Ok(url.to_string())
}

fn project_url(token_url: &str, project_id: &str) -> CostResult<Url> {
    let invalid = || CostError::endpoint_unavailable(format!("invalid token url '{}'", token_url));
    let mut url = Url::parse(token_url).map_err(|_| invalid())?;

    let root = url.path().trim_end_matches("/auth/tokens").to_string();
    url.set_path(&root);
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .push("projects")
        .push(project_id);
    Ok(url)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct TokenBody {
    #[serde(default)]
    token: TokenInfo,
}

#[derive(Debug, Default, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "type", default)]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    #[serde(default)]
    url: String,
}
