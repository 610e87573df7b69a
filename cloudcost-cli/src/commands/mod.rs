pub mod costs;
pub mod inspect;
pub mod pricing;

use clap::ValueEnum;
use cloudcost_core::{CloudCostConfig, CostQueryEngine};

pub use costs::{cmd_monthly, cmd_query, QueryArgs};
pub use inspect::{cmd_config, cmd_shapes};
pub use pricing::cmd_seed_pricing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn load_engine() -> anyhow::Result<(CloudCostConfig, CostQueryEngine)> {
    let config = CloudCostConfig::load()?;
    let engine = CostQueryEngine::from_config(&config)?;
    Ok((config, engine))
}
