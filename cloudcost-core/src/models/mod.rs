pub mod query;
pub mod series;

pub use query::{parse_month, CostBucket, CostQuery, CostReport, QueryWindow, Resolution};
pub use series::{checked_sum, CanonicalSeries, CostPoint};
