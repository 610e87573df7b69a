use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CostError, CostResult};

/// Half-open time range `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CostResult<Self> {
        if start >= end {
            return Err(CostError::invalid_request(format!(
                "window start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Start of the current UTC calendar month through `now`.
    pub fn month_to_date(now: DateTime<Utc>) -> CostResult<Self> {
        Self::new(start_of_month(now), now)
    }

    /// Resolves optional caller bounds against the month-to-date default.
    pub fn from_bounds(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> CostResult<Self> {
        let start = start.unwrap_or_else(|| start_of_month(now));
        let end = end.unwrap_or(now);
        Self::new(start, end)
    }

    /// The full calendar month `[1st, 1st of next month)`.
    pub fn month(year: i32, month: u32) -> CostResult<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| CostError::invalid_request("Month must be in YYYY-MM format"))?;
        let next = first
            .checked_add_months(Months::new(1))
            .ok_or_else(|| CostError::invalid_request("month is out of range"))?;
        Self::new(midnight(first), midnight(next))
    }

    /// The calendar month before the one containing `now`.
    pub fn last_month(now: DateTime<Utc>) -> CostResult<Self> {
        let this_month = start_of_month(now);
        let previous = this_month
            .checked_sub_months(Months::new(1))
            .ok_or_else(|| CostError::invalid_request("month is out of range"))?;
        Self::new(previous, this_month)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Parses `YYYY-MM` into a calendar-month window.
pub fn parse_month(raw: &str) -> CostResult<QueryWindow> {
    let invalid = || CostError::invalid_request("Month must be in YYYY-MM format");
    let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
    if year.len() != 4 || month.len() != 2 {
        return Err(invalid());
    }
    let year: i32 = year.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    QueryWindow::month(year, month)
}

pub(crate) fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

pub(crate) fn start_of_month(instant: DateTime<Utc>) -> DateTime<Utc> {
    let date = instant.date_naive();
    midnight(date.with_day(1).unwrap_or(date))
}

/// Bucket width of a resampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Hour,
        Resolution::Day,
        Resolution::Week,
        Resolution::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hour => "hour",
            Resolution::Day => "day",
            Resolution::Week => "week",
            Resolution::Month => "month",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = CostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hour" => Ok(Resolution::Hour),
            "day" => Ok(Resolution::Day),
            "week" => Ok(Resolution::Week),
            "month" => Ok(Resolution::Month),
            other => Err(CostError::invalid_request(format!(
                "resolution must be one of hour, day, week, month (got '{}')",
                other
            ))),
        }
    }
}

/// Input to [`crate::CostQueryEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostQuery {
    pub project_id: String,
    pub window: QueryWindow,
    pub resolution: Resolution,
    pub include_series: bool,
}

impl CostQuery {
    pub fn new(project_id: impl Into<String>, window: QueryWindow) -> Self {
        Self {
            project_id: project_id.into(),
            window,
            resolution: Resolution::default(),
            include_series: false,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_series(mut self, include_series: bool) -> Self {
        self.include_series = include_series;
        self
    }

    pub fn validate(&self) -> CostResult<()> {
        let id = self.project_id.trim();
        if id.is_empty() {
            return Err(CostError::invalid_request("project_id must not be empty"));
        }
        if id.len() != self.project_id.len() {
            return Err(CostError::invalid_request(
                "project_id must not have surrounding whitespace",
            ));
        }
        if id.contains('/') {
            return Err(CostError::invalid_request("project_id must not contain '/'"));
        }
        if self.window.start() >= self.window.end() {
            return Err(CostError::invalid_request("window start must be before end"));
        }
        Ok(())
    }
}

/// One resampled bucket `[timestamp, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostBucket {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub end: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
}

/// Successful result of a cost query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostReport {
    pub project_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
    #[serde(with = "rust_decimal::serde::float")]
    pub aggregate_cost_now: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<CostBucket>>,
}
