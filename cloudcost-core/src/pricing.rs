//! Idempotent seeding of default flat prices into the hashmap rating module.

use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{CostError, CostResult};
use crate::resolver::ResolvedEndpoint;

pub const HASHMAP_ROOT: &str = "/v1/rating/module_config/hashmap";

/// Field every default mapping is keyed on.
pub const FLAVOR_FIELD: &str = "flavor";

const MAPPING_TYPE: &str = "flat";

/// Default price for one value of a service's flavor field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultMapping {
    pub value: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDefaults {
    pub service: &'static str,
    pub mappings: Vec<DefaultMapping>,
}

/// The built-in price list.
pub fn default_pricing() -> Vec<ServiceDefaults> {
    let mapping = |value, cents| DefaultMapping {
        value,
        cost: Decimal::new(cents, 2),
    };

    vec![
        ServiceDefaults {
            service: "instance",
            mappings: vec![
                mapping("small", 3),
                mapping("medium", 7),
                mapping("large", 12),
            ],
        },
        ServiceDefaults {
            service: "volume",
            mappings: vec![mapping("standard", 10), mapping("ssd", 18)],
        },
        ServiceDefaults {
            service: "network.bw.out",
            mappings: vec![mapping("default", 2)],
        },
    ]
}

/// What one seeding run found and changed for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeededService {
    pub service: String,
    pub service_id: String,
    pub field_id: String,
    pub created_service: bool,
    pub created_field: bool,
    pub created_mappings: Vec<String>,
    pub existing_mappings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub services: Vec<SeededService>,
}

impl SeedSummary {
    pub fn created_count(&self) -> usize {
        self.services
            .iter()
            .map(|s| s.created_mappings.len())
            .sum()
    }

    pub fn is_noop(&self) -> bool {
        self.services
            .iter()
            .all(|s| !s.created_service && !s.created_field && s.created_mappings.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct NewMapping<'a> {
    field_id: &'a str,
    value: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    cost: Decimal,
    #[serde(rename = "type")]
    mapping_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct HashmapService {
    service_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceList {
    #[serde(default)]
    services: Vec<HashmapService>,
}

#[derive(Debug, Deserialize)]
struct HashmapField {
    field_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FieldList {
    #[serde(default)]
    fields: Vec<HashmapField>,
}

#[derive(Debug, Deserialize)]
struct HashmapMapping {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MappingList {
    #[serde(default)]
    mappings: Vec<HashmapMapping>,
}

/// Creates whatever part of [`default_pricing`] is missing. Existing
/// services, fields and mappings are left untouched, so runs are repeatable.
pub struct PricingSeeder {
    client: Client,
    pricing: Vec<ServiceDefaults>,
}

impl PricingSeeder {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            pricing: default_pricing(),
        }
    }

    pub fn with_pricing(mut self, pricing: Vec<ServiceDefaults>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn pricing(&self) -> &[ServiceDefaults] {
        &self.pricing
    }

    pub async fn ensure_defaults(&self, endpoint: &ResolvedEndpoint) -> CostResult<SeedSummary> {
        let mut summary = SeedSummary::default();

        for defaults in &self.pricing {
            debug!(service = defaults.service, "Ensuring default pricing");

            let (service_id, created_service) = self.service_id(endpoint, defaults.service).await?;
            let (field_id, created_field) = self.field_id(endpoint, &service_id).await?;

            let existing: Vec<String> = self
                .get::<MappingList>(endpoint, "/mappings", &[("field_id", field_id.as_str())])
                .await?
                .mappings
                .into_iter()
                .filter_map(|m| m.value)
                .collect();

            let mut created_mappings = Vec::new();
            let mut existing_mappings = Vec::new();
            for mapping in &defaults.mappings {
                if existing.iter().any(|v| v == mapping.value) {
                    existing_mappings.push(mapping.value.to_string());
                    continue;
                }
                let body = NewMapping {
                    field_id: &field_id,
                    value: mapping.value,
                    cost: mapping.cost,
                    mapping_type: MAPPING_TYPE,
                };
                self.post(endpoint, "/mappings", &body).await?;
                created_mappings.push(mapping.value.to_string());
            }

            info!(
                service = defaults.service,
                created = created_mappings.len(),
                existing = existing_mappings.len(),
                "Default pricing ensured"
            );

            summary.services.push(SeededService {
                service: defaults.service.to_string(),
                service_id,
                field_id,
                created_service,
                created_field,
                created_mappings,
                existing_mappings,
            });
        }

        Ok(summary)
    }

    async fn service_id(&self, endpoint: &ResolvedEndpoint, name: &str) -> CostResult<(String, bool)> {
        let services = self.get::<ServiceList>(endpoint, "/services", &[]).await?;
        if let Some(found) = services.services.into_iter().find(|s| s.name == name) {
            return Ok((found.service_id, false));
        }

        let created: HashmapService =
            decode(self.post(endpoint, "/services", &json!({ "name": name })).await?)?;
        Ok((created.service_id, true))
    }

    async fn field_id(&self, endpoint: &ResolvedEndpoint, service_id: &str) -> CostResult<(String, bool)> {
        let fields = self
            .get::<FieldList>(endpoint, "/fields", &[("service_id", service_id)])
            .await?;
        if let Some(found) = fields.fields.into_iter().find(|f| f.name == FLAVOR_FIELD) {
            return Ok((found.field_id, false));
        }

        let body = json!({ "service_id": service_id, "name": FLAVOR_FIELD });
        let created: HashmapField = decode(self.post(endpoint, "/fields", &body).await?)?;
        Ok((created.field_id, true))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &ResolvedEndpoint,
        path: &str,
        query: &[(&str, &str)],
    ) -> CostResult<T> {
        let url = endpoint.url(&format!("{}{}", HASHMAP_ROOT, path));
        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &endpoint.token)
            .query(query)
            .send()
            .await?;
        decode(read_json(url, response).await?)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        endpoint: &ResolvedEndpoint,
        path: &str,
        body: &B,
    ) -> CostResult<Value> {
        let url = endpoint.url(&format!("{}{}", HASHMAP_ROOT, path));
        let response = self
            .client
            .post(&url)
            .header("X-Auth-Token", &endpoint.token)
            .json(body)
            .send()
            .await?;
        read_json(url, response).await
    }
}

async fn read_json(url: String, response: Response) -> CostResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(CostError::UpstreamRequest {
            status: status.as_u16(),
            url,
            body: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&text).map_err(|e| CostError::MalformedResponse {
        shape: "hashmap".to_string(),
        message: format!("{} returned invalid JSON: {}", url, e),
    })
}

fn decode<T: DeserializeOwned>(value: Value) -> CostResult<T> {
    serde_json::from_value(value).map_err(|e| CostError::MalformedResponse {
        shape: "hashmap".to_string(),
        message: e.to_string(),
    })
}
