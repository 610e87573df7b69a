use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::engine::shapes::{EntryLayout, FieldMap, ResponseShape};
use crate::error::{AttemptFailure, CostError, CostResult};
use crate::models::{checked_sum, CanonicalSeries, CostPoint, QueryWindow};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Why a body could not be turned into a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NormalizeError {
    /// The body does not have the shape's layout at all.
    Unrecognized(String),
    /// The layout matches but an entry is unusable.
    InvalidEntry(String),
}

impl NormalizeError {
    pub(crate) fn into_attempt_failure(self) -> AttemptFailure {
        match self {
            NormalizeError::Unrecognized(msg) => AttemptFailure::Unparseable(msg),
            NormalizeError::InvalidEntry(msg) => AttemptFailure::Malformed(msg),
        }
    }

    fn message(self) -> String {
        match self {
            NormalizeError::Unrecognized(msg) | NormalizeError::InvalidEntry(msg) => msg,
        }
    }
}

/// Converts a raw rating-service body into a [`CanonicalSeries`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_currency: String,
}

impl Normalizer {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Extracts, sorts, clips to `window` and merges duplicate timestamps.
    ///
    /// Any entry with a missing, non-numeric or negative cost, or an
    /// unparseable timestamp, rejects the whole response.
    pub fn normalize(
        &self,
        shape: ResponseShape,
        raw: &Value,
        window: &QueryWindow,
    ) -> CostResult<CanonicalSeries> {
        self.try_normalize(shape, raw, window)
            .map_err(|e| CostError::malformed(shape, e.message()))
    }

    pub(crate) fn try_normalize(
        &self,
        shape: ResponseShape,
        raw: &Value,
        window: &QueryWindow,
    ) -> Result<CanonicalSeries, NormalizeError> {
        if !raw.is_object() {
            return Err(NormalizeError::Unrecognized(
                "response body is not a JSON object".to_string(),
            ));
        }

        let map = shape.field_map();
        let mut points = extract(map, raw)?;

        points.sort_by_key(|p| p.timestamp);
        points.retain(|p| window.contains(p.timestamp));

        let currency = map
            .currency
            .and_then(|pointer| raw.pointer(pointer))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_currency)
            .to_string();

        let points = merge_duplicates(points)?;
        if checked_sum(points.iter().map(|p| p.cost)).is_none() {
            return Err(NormalizeError::InvalidEntry(
                "costs sum beyond the representable range".to_string(),
            ));
        }

        Ok(CanonicalSeries::with_points(currency, points))
    }
}

fn extract(map: &FieldMap, raw: &Value) -> Result<Vec<CostPoint>, NormalizeError> {
    match map.layout {
        EntryLayout::Records { entries } => {
            let entries = require_array(raw, entries)?;
            entries
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    let timestamp = parse_timestamp(entry.pointer(map.timestamp))
                        .map_err(|e| invalid(i, e))?;
                    let cost = parse_cost(entry.pointer(map.cost)).map_err(|e| invalid(i, e))?;
                    Ok(CostPoint::new(timestamp, cost))
                })
                .collect()
        }
        EntryLayout::Columnar { columns, rows } => {
            let columns = require_array(raw, columns)?;
            let rows = require_array(raw, rows)?;
            let ts_index = column_index(columns, map.timestamp)?;
            let cost_index = column_index(columns, map.cost)?;

            rows.iter()
                .enumerate()
                .map(|(i, row)| {
                    let row = row
                        .as_array()
                        .ok_or_else(|| invalid(i, "row is not an array".to_string()))?;
                    let timestamp =
                        parse_timestamp(row.get(ts_index)).map_err(|e| invalid(i, e))?;
                    let cost = parse_cost(row.get(cost_index)).map_err(|e| invalid(i, e))?;
                    Ok(CostPoint::new(timestamp, cost))
                })
                .collect()
        }
        EntryLayout::Frames { frames, items } => {
            let frames = require_array(raw, frames)?;
            let mut points = Vec::new();

            for (i, frame) in frames.iter().enumerate() {
                let timestamp =
                    parse_timestamp(frame.pointer(map.timestamp)).map_err(|e| invalid(i, e))?;
                for item in frame_items(frame, items).map_err(|e| invalid(i, e))? {
                    let cost = parse_cost(item.pointer(map.cost)).map_err(|e| invalid(i, e))?;
                    points.push(CostPoint::new(timestamp, cost));
                }
            }

            Ok(points)
        }
    }
}

fn invalid(index: usize, message: String) -> NormalizeError {
    NormalizeError::InvalidEntry(format!("entry {}: {}", index, message))
}

fn require_array<'a>(raw: &'a Value, pointer: &str) -> Result<&'a Vec<Value>, NormalizeError> {
    raw.pointer(pointer)
        .and_then(Value::as_array)
        .ok_or_else(|| NormalizeError::Unrecognized(format!("expected an array at '{}'", pointer)))
}

fn column_index(columns: &[Value], name: &str) -> Result<usize, NormalizeError> {
    columns
        .iter()
        .position(|c| c.as_str() == Some(name))
        .ok_or_else(|| NormalizeError::Unrecognized(format!("missing column '{}'", name)))
}

fn frame_items<'a>(frame: &'a Value, pointer: &str) -> Result<Vec<&'a Value>, String> {
    match frame.pointer(pointer) {
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(Value::Object(groups)) => {
            let mut items = Vec::new();
            for (name, group) in groups {
                let group = group
                    .as_array()
                    .ok_or_else(|| format!("'{}' is not a list of rated items", name))?;
                items.extend(group.iter());
            }
            Ok(items)
        }
        Some(_) => Err(format!("'{}' is neither a list nor a map", pointer)),
        None => Err(format!("missing '{}'", pointer)),
    }
}

fn parse_cost(value: Option<&Value>) -> Result<Decimal, String> {
    let cost = match value {
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(Value::String(s)) => parse_decimal(s.trim()),
        Some(Value::Null) | None => return Err("cost is missing".to_string()),
        Some(other) => return Err(format!("cost is not numeric: {}", other)),
    }
    .ok_or_else(|| format!("cost is not numeric: {}", value.map(Value::to_string).unwrap_or_default()))?;

    if cost.is_sign_negative() && !cost.is_zero() {
        return Err(format!("cost is negative: {}", cost));
    }
    Ok(cost)
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

pub(crate) fn parse_timestamp(value: Option<&Value>) -> Result<DateTime<Utc>, String> {
    let raw = match value {
        Some(Value::String(s)) => s.trim(),
        Some(other) => return Err(format!("timestamp is not a string: {}", other)),
        None => return Err("timestamp is missing".to_string()),
    };

    parse_instant(raw).ok_or_else(|| format!("unparseable timestamp '{}'", raw))
}

/// Parses RFC 3339, or a naive date-time read as UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn merge_duplicates(points: Vec<CostPoint>) -> Result<Vec<CostPoint>, NormalizeError> {
    let mut merged: Vec<CostPoint> = Vec::with_capacity(points.len());
    for point in points {
        match merged.last_mut() {
            Some(last) if last.timestamp == point.timestamp => {
                last.cost = last.cost.checked_add(point.cost).ok_or_else(|| {
                    NormalizeError::InvalidEntry(format!(
                        "costs at {} sum beyond the representable range",
                        point.timestamp.to_rfc3339()
                    ))
                })?;
            }
            _ => merged.push(point),
        }
    }
    Ok(merged)
}
