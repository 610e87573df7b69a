use std::process::ExitCode;
use std::sync::Arc;

use cloudcost_core::{CloudCostConfig, CostQueryEngine, LoggingConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let config = match CloudCostConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.json_format {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init();
    }
}

async fn run(config: CloudCostConfig) -> anyhow::Result<()> {
    info!(version = VERSION, "Starting cloudcost-server");

    let engine = Arc::new(CostQueryEngine::from_config(&config)?);
    info!(
        query_timeout_secs = engine.query_timeout().as_secs(),
        "Engine configured"
    );

    cloudcost_server::serve(engine, &config.server).await
}
