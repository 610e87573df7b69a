pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pricing;
pub mod resolver;

pub use config::{
    config_search_paths, CloudCostConfig, ConfigLoadError, IdentityConfig, LoggingConfig,
    RatingConfig, ServerConfig,
};
pub use engine::{
    aggregate, build_client, parse_instant, resample, CostQueryEngine, Normalizer,
    QueryStrategyChain, ResponseShape, ShapeMatch,
};
pub use error::{AttemptFailure, CostError, CostResult, ErrorKind, StrategyAttempt};
pub use models::{
    parse_month, CanonicalSeries, CostBucket, CostPoint, CostQuery, CostReport, QueryWindow,
    Resolution,
};
pub use pricing::{default_pricing, PricingSeeder, SeedSummary, SeededService};
pub use resolver::{EndpointResolver, KeystoneResolver, ResolvedEndpoint, StaticResolver};
