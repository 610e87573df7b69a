use chrono::{DateTime, Datelike, Duration, Months, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{CostError, CostResult};
use crate::models::query::{midnight, start_of_month};
use crate::models::{CanonicalSeries, CostBucket, QueryWindow, Resolution};

/// Decimal places of the reported aggregate.
pub const AGGREGATE_SCALE: u32 = 4;

/// Upper bound on buckets in one resampled series.
pub const MAX_BUCKETS: usize = 50_000;

/// Sum of every point, rounded for presentation.
pub fn aggregate(series: &CanonicalSeries) -> CostResult<Decimal> {
    Ok(round_cost(series.total()?))
}

/// Rounds half away from zero and pads to exactly four decimal places.
pub fn round_cost(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(AGGREGATE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(AGGREGATE_SCALE);
    rounded
}

/// Floors `instant` to the natural boundary of `resolution`.
pub fn bucket_floor(instant: DateTime<Utc>, resolution: Resolution) -> DateTime<Utc> {
    match resolution {
        Resolution::Hour => {
            let date = instant.date_naive();
            midnight(date) + Duration::hours(i64::from(instant.hour()))
        }
        Resolution::Day => midnight(instant.date_naive()),
        Resolution::Week => {
            let date = instant.date_naive();
            let back = i64::from(date.weekday().num_days_from_monday());
            midnight(date) - Duration::days(back)
        }
        Resolution::Month => start_of_month(instant),
    }
}

/// The boundary after `boundary`, which must already be aligned.
fn next_boundary(boundary: DateTime<Utc>, resolution: Resolution) -> Option<DateTime<Utc>> {
    match resolution {
        Resolution::Hour => boundary.checked_add_signed(Duration::hours(1)),
        Resolution::Day => boundary.checked_add_signed(Duration::days(1)),
        Resolution::Week => boundary.checked_add_signed(Duration::weeks(1)),
        Resolution::Month => boundary.checked_add_months(Months::new(1)),
    }
}

/// Empty buckets covering exactly `window`, with aligned interior boundaries.
///
/// The first and last buckets are clipped to the window when its bounds are
/// not themselves aligned.
pub fn bucket_edges(window: &QueryWindow, resolution: Resolution) -> CostResult<Vec<CostBucket>> {
    let mut buckets = Vec::new();
    let mut cursor = window.start();

    while cursor < window.end() {
        if buckets.len() >= MAX_BUCKETS {
            return Err(CostError::invalid_request(format!(
                "window spans more than {} {} buckets; use a coarser resolution",
                MAX_BUCKETS, resolution
            )));
        }
        let next = next_boundary(bucket_floor(cursor, resolution), resolution)
            .map(|n| n.min(window.end()))
            .unwrap_or_else(|| window.end());
        buckets.push(CostBucket {
            timestamp: cursor,
            end: next,
            cost: Decimal::ZERO,
        });
        cursor = next;
    }

    Ok(buckets)
}

/// Sums the series into one bucket per `resolution` step across `window`.
///
/// Empty buckets are kept with a zero cost. Points outside the window are
/// ignored; the normalizer has already clipped them in practice.
pub fn resample(
    series: &CanonicalSeries,
    window: &QueryWindow,
    resolution: Resolution,
) -> CostResult<Vec<CostBucket>> {
    let buckets = bucket_edges(window, resolution)?;
    fill_buckets(buckets, series)
}

/// Adds each point's cost to the bucket containing it. Points before the
/// first bucket or after the last are dropped.
pub fn fill_buckets(
    mut buckets: Vec<CostBucket>,
    series: &CanonicalSeries,
) -> CostResult<Vec<CostBucket>> {
    if buckets.is_empty() {
        return Ok(buckets);
    }
    let start = buckets[0].timestamp;
    let end = buckets[buckets.len() - 1].end;

    for point in &series.points {
        if point.timestamp < start || point.timestamp >= end {
            continue;
        }
        let index = buckets.partition_point(|b| b.end <= point.timestamp);
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.cost = bucket
                .cost
                .checked_add(point.cost)
                .ok_or_else(|| CostError::cost_overflow(format!("bucket {}", bucket.timestamp)))?;
        }
    }

    Ok(buckets)
}
