use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Json};
use chrono::{DateTime, Utc};
use cloudcost_core::{parse_instant, parse_month, CostQuery, CostReport, QueryWindow, Resolution};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Query string accepted by the cost endpoints. Everything arrives as text so
/// that bad values produce a JSON error instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CostParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub resolution: Option<String>,
    pub include_series: Option<String>,
}

impl CostParams {
    pub fn resolution(&self) -> Result<Resolution, ApiError> {
        match non_empty(&self.resolution) {
            Some(raw) => Ok(raw.parse()?),
            None => Ok(Resolution::default()),
        }
    }

    pub fn include_series(&self) -> Result<bool, ApiError> {
        match non_empty(&self.include_series) {
            Some(raw) => parse_flag(raw).ok_or_else(|| {
                ApiError::bad_request(format!(
                    "include_series must be true or false (got '{}')",
                    raw
                ))
            }),
            None => Ok(false),
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> Result<QueryWindow, ApiError> {
        let start = instant(&self.start, "start")?;
        let end = instant(&self.end, "end")?;
        Ok(QueryWindow::from_bounds(start, end, now)?)
    }

    fn query(&self, project_id: String, window: QueryWindow) -> Result<CostQuery, ApiError> {
        Ok(CostQuery::new(project_id, window)
            .with_resolution(self.resolution()?)
            .with_series(self.include_series()?))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn instant(value: &Option<String>, name: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
    match non_empty(value) {
        Some(raw) => parse_instant(raw).map(Some).ok_or_else(|| {
            ApiError::bad_request(format!("{} must be an RFC 3339 timestamp (got '{}')", name, raw))
        }),
        None => Ok(None),
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub async fn project_costs(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<CostParams>,
) -> Result<Json<CostReport>, ApiError> {
    let window = params.window(Utc::now())?;
    let query = params.query(project_id, window)?;
    Ok(Json(state.engine.run(query).await?))
}

pub async fn last_month_costs(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<CostParams>,
) -> Result<Json<CostReport>, ApiError> {
    let window = QueryWindow::last_month(Utc::now())?;
    let query = params.query(project_id, window)?;
    Ok(Json(state.engine.run(query).await?))
}

pub async fn monthly_costs(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<CostReport>, ApiError> {
    Ok(Json(state.engine.run_monthly(&project_id, Utc::now()).await?))
}

pub async fn month_costs(
    State(state): State<AppState>,
    Path((project_id, month)): Path<(String, String)>,
    Query(params): Query<CostParams>,
) -> Result<Json<CostReport>, ApiError> {
    let window = parse_month(&month)?;
    let query = params.query(project_id, window)?;
    Ok(Json(state.engine.run(query).await?))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}
