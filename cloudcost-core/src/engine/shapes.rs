//! The closed set of rating-service response shapes and their field mappings.
//!
//! | Priority | Shape | Endpoint | Entries | Timestamp | Cost |
//! |----------|-------|----------|---------|-----------|------|
//! | 1 | `v2.summary` | `GET /v2/summary` (`groupby=time`) | `results[]` rows named by `columns[]` | `begin` column | `rate` column |
//! | 2 | `v2.dataframes` | `GET /v2/dataframes` | every item under `dataframes[].usage` | `period.begin` | `rating.price` |
//! | 3 | `v1.storage.dataframes` | `GET /v1/storage/dataframes` | `dataframes[].resources[]` | `begin` | `rating` |
//! | 4 | `v1.report.summary` | `GET /v1/report/summary` | `summary[]` | `begin` | `rate` |
//!
//! v2 endpoints filter with `filters=project_id:<id>` and paginate through
//! `limit`/`offset` against a top-level `total`; v1 endpoints take `tenant_id`
//! and return everything in one body.

use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::error::CostError;
use crate::models::QueryWindow;

/// Page size requested from paginated shapes.
pub const PAGE_SIZE: usize = 1000;

/// One known request/response convention of the rating service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseShape {
    #[serde(rename = "v2.summary")]
    SummaryV2,
    #[serde(rename = "v2.dataframes")]
    DataframesV2,
    #[serde(rename = "v1.storage.dataframes")]
    StorageDataframesV1,
    #[serde(rename = "v1.report.summary")]
    ReportSummaryV1,
}

/// Where the cost entries live inside a response body.
///
/// Pointers are RFC 6901 JSON pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryLayout {
    /// An array of objects, one entry each.
    Records { entries: &'static str },
    /// An array of positional rows whose column names sit in a sibling array.
    Columnar {
        columns: &'static str,
        rows: &'static str,
    },
    /// An array of frames, each with one timestamp and a set of rated items.
    /// `items` may point at an array or at an object whose values are arrays.
    Frames {
        frames: &'static str,
        items: &'static str,
    },
}

/// Per-shape mapping from the wire layout to `{timestamp, cost, currency}`.
///
/// For [`EntryLayout::Columnar`] `timestamp` and `cost` are column names;
/// otherwise they are pointers relative to the frame (timestamp) and the
/// record or item (cost). `currency` is a pointer from the response root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMap {
    pub layout: EntryLayout,
    pub timestamp: &'static str,
    pub cost: &'static str,
    pub currency: Option<&'static str>,
}

/// Offset/limit pagination against a reported total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub total: &'static str,
    pub items: &'static str,
}

const SUMMARY_V2: FieldMap = FieldMap {
    layout: EntryLayout::Columnar {
        columns: "/columns",
        rows: "/results",
    },
    timestamp: "begin",
    cost: "rate",
    currency: Some("/currency"),
};

const DATAFRAMES_V2: FieldMap = FieldMap {
    layout: EntryLayout::Frames {
        frames: "/dataframes",
        items: "/usage",
    },
    timestamp: "/period/begin",
    cost: "/rating/price",
    currency: Some("/currency"),
};

const STORAGE_DATAFRAMES_V1: FieldMap = FieldMap {
    layout: EntryLayout::Frames {
        frames: "/dataframes",
        items: "/resources",
    },
    timestamp: "/begin",
    cost: "/rating",
    currency: None,
};

const REPORT_SUMMARY_V1: FieldMap = FieldMap {
    layout: EntryLayout::Records {
        entries: "/summary",
    },
    timestamp: "/begin",
    cost: "/rate",
    currency: None,
};

impl ResponseShape {
    /// Default priority: most specific and most recent API first.
    pub const PRIORITY: [ResponseShape; 4] = [
        ResponseShape::SummaryV2,
        ResponseShape::DataframesV2,
        ResponseShape::StorageDataframesV1,
        ResponseShape::ReportSummaryV1,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ResponseShape::SummaryV2 => "v2.summary",
            ResponseShape::DataframesV2 => "v2.dataframes",
            ResponseShape::StorageDataframesV1 => "v1.storage.dataframes",
            ResponseShape::ReportSummaryV1 => "v1.report.summary",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ResponseShape::SummaryV2 => "/v2/summary",
            ResponseShape::DataframesV2 => "/v2/dataframes",
            ResponseShape::StorageDataframesV1 => "/v1/storage/dataframes",
            ResponseShape::ReportSummaryV1 => "/v1/report/summary",
        }
    }

    pub fn field_map(&self) -> &'static FieldMap {
        match self {
            ResponseShape::SummaryV2 => &SUMMARY_V2,
            ResponseShape::DataframesV2 => &DATAFRAMES_V2,
            ResponseShape::StorageDataframesV1 => &STORAGE_DATAFRAMES_V1,
            ResponseShape::ReportSummaryV1 => &REPORT_SUMMARY_V1,
        }
    }

    pub fn pagination(&self) -> Option<Pagination> {
        match self {
            ResponseShape::SummaryV2 => Some(Pagination {
                total: "/total",
                items: "/results",
            }),
            ResponseShape::DataframesV2 => Some(Pagination {
                total: "/total",
                items: "/dataframes",
            }),
            ResponseShape::StorageDataframesV1 | ResponseShape::ReportSummaryV1 => None,
        }
    }

    /// Query string for one request of this shape. `offset` is ignored by
    /// unpaginated shapes.
    pub fn query_params(
        &self,
        project_id: &str,
        window: &QueryWindow,
        offset: usize,
    ) -> Vec<(&'static str, String)> {
        let begin = window.start().to_rfc3339_opts(SecondsFormat::Secs, false);
        let end = window.end().to_rfc3339_opts(SecondsFormat::Secs, false);

        match self {
            ResponseShape::SummaryV2 => vec![
                ("begin", begin),
                ("end", end),
                ("filters", format!("project_id:{}", project_id)),
                ("groupby", "time".to_string()),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ],
            ResponseShape::DataframesV2 => vec![
                ("begin", begin),
                ("end", end),
                ("filters", format!("project_id:{}", project_id)),
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ],
            ResponseShape::StorageDataframesV1 | ResponseShape::ReportSummaryV1 => vec![
                ("tenant_id", project_id.to_string()),
                ("begin", begin),
                ("end", end),
            ],
        }
    }
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ResponseShape {
    type Err = CostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ResponseShape::PRIORITY
            .into_iter()
            .find(|shape| shape.id() == wanted)
            .ok_or_else(|| {
                CostError::Config(format!(
                    "unknown response shape '{}' (known: {})",
                    wanted,
                    ResponseShape::PRIORITY.map(|s| s.id()).join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> QueryWindow {
        QueryWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_ids_round_trip_through_from_str() {
        for shape in ResponseShape::PRIORITY {
            assert_eq!(shape.id().parse::<ResponseShape>().unwrap(), shape);
        }
        assert!("v3.summary".parse::<ResponseShape>().is_err());
    }

    #[test]
    fn test_priority_is_newest_first() {
        assert_eq!(ResponseShape::PRIORITY[0], ResponseShape::SummaryV2);
        assert_eq!(ResponseShape::PRIORITY[3], ResponseShape::ReportSummaryV1);
    }

    #[test]
    fn test_v2_query_params() {
        let params = ResponseShape::SummaryV2.query_params("p1", &window(), 1000);

        assert!(params.contains(&("begin", "2026-01-01T00:00:00+00:00".to_string())));
        assert!(params.contains(&("end", "2026-01-03T00:00:00+00:00".to_string())));
        assert!(params.contains(&("filters", "project_id:p1".to_string())));
        assert!(params.contains(&("groupby", "time".to_string())));
        assert!(params.contains(&("offset", "1000".to_string())));
    }

    #[test]
    fn test_v1_query_params_use_tenant() {
        let params = ResponseShape::ReportSummaryV1.query_params("p1", &window(), 0);

        assert!(params.contains(&("tenant_id", "p1".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "offset"));
    }

    #[test]
    fn test_only_v2_shapes_paginate() {
        assert!(ResponseShape::SummaryV2.pagination().is_some());
        assert!(ResponseShape::DataframesV2.pagination().is_some());
        assert!(ResponseShape::StorageDataframesV1.pagination().is_none());
        assert!(ResponseShape::ReportSummaryV1.pagination().is_none());
    }

    #[test]
    fn test_serde_uses_ids() {
        let json = serde_json::to_string(&ResponseShape::StorageDataframesV1).unwrap();
        assert_eq!(json, "\"v1.storage.dataframes\"");
    }
}
