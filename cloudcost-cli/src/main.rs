use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{
    cmd_config, cmd_monthly, cmd_query, cmd_seed_pricing, cmd_shapes, OutputFormat, QueryArgs,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "cloudcost")]
#[command(version = VERSION)]
#[command(about = "Query project costs from a CloudKitty rating service")]
#[command(long_about = r#"
cloudcost resolves the rating endpoint through Keystone (or a static
CLOUDKITTY_ENDPOINT/CLOUDKITTY_TOKEN pair), tries each known summary API
until one answers, and reports the project's aggregate cost and an optional
time series.

Credentials come from the usual OS_* variables, cloudcost.toml or
CLOUDCOST__* overrides. Run 'cloudcost config' to see what was loaded.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Cost of a project over a window (month to date by default)")]
    Query(QueryArgs),

    #[command(about = "Cost per completed calendar month")]
    Monthly {
        #[arg(help = "Project ID")]
        project: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    #[command(about = "Create the default flat prices in the hashmap rating module")]
    SeedPricing {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    #[command(about = "List the response shapes tried, in order")]
    Shapes,

    #[command(about = "Show the loaded configuration with secrets masked")]
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Query(args) => cmd_query(args).await,
        Commands::Monthly { project, format } => cmd_monthly(&project, format).await,
        Commands::SeedPricing { format } => cmd_seed_pricing(format).await,
        Commands::Shapes => cmd_shapes(),
        Commands::Config => cmd_config(),
    }
}
