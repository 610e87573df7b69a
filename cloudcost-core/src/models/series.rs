use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CostError, CostResult};

/// A single rated cost at an instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
}

impl CostPoint {
    pub fn new(timestamp: DateTime<Utc>, cost: Decimal) -> Self {
        Self { timestamp, cost }
    }
}

/// Shape-independent cost-over-time for one project and window.
///
/// After normalization the points are strictly increasing by timestamp. An
/// empty point list is a valid zero-cost series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalSeries {
    pub points: Vec<CostPoint>,
    pub currency: String,
}

impl CanonicalSeries {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            points: Vec::new(),
            currency: currency.into(),
        }
    }

    pub fn with_points(currency: impl Into<String>, points: Vec<CostPoint>) -> Self {
        Self {
            points,
            currency: currency.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Exact, unrounded sum of every point.
    pub fn total(&self) -> CostResult<Decimal> {
        checked_sum(self.points.iter().map(|p| p.cost))
            .ok_or_else(|| CostError::cost_overflow("series total"))
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }
}

/// Sum that reports overflow instead of panicking.
pub fn checked_sum(costs: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    costs
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, cost| acc.checked_add(cost))
}
