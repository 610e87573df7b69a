use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use cloudcost_core::{parse_instant, CostQuery, CostReport, QueryWindow, Resolution};

use super::{load_engine, OutputFormat};

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[arg(help = "Project ID")]
    pub project: String,

    #[arg(long, help = "Window start, RFC 3339 (default: start of this month)")]
    pub start: Option<String>,

    #[arg(long, help = "Window end, RFC 3339 (default: now)")]
    pub end: Option<String>,

    #[arg(
        short,
        long,
        default_value = "day",
        help = "Bucket width (hour, day, week, month)"
    )]
    pub resolution: String,

    #[arg(short, long, help = "Include the bucketed time series")]
    pub series: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub async fn cmd_query(args: QueryArgs) -> anyhow::Result<()> {
    let start = instant(args.start.as_deref(), "--start")?;
    let end = instant(args.end.as_deref(), "--end")?;
    let resolution: Resolution = args.resolution.parse()?;
    let window = QueryWindow::from_bounds(start, end, Utc::now())?;

    let (_, engine) = load_engine()?;
    let query = CostQuery::new(args.project, window)
        .with_resolution(resolution)
        .with_series(args.series);
    let report = engine.run(query).await?;

    print_report(&report, args.format, "Project Cost")
}

pub async fn cmd_monthly(project: &str, format: OutputFormat) -> anyhow::Result<()> {
    let (_, engine) = load_engine()?;
    let report = engine.run_monthly(project, Utc::now()).await?;

    print_report(&report, format, "Monthly Costs")
}

fn instant(raw: Option<&str>, flag: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
    raw.map(|value| {
        parse_instant(value)
            .with_context(|| format!("{} must be an RFC 3339 timestamp, got '{}'", flag, value))
    })
    .transpose()
}

fn print_report(report: &CostReport, format: OutputFormat, title: &str) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("{}", title.cyan().bold());
    println!(
        "{}",
        format!(
            "Project: {}  Window: {} → {}",
            report.project_id,
            report.start.format("%Y-%m-%d %H:%M"),
            report.end.format("%Y-%m-%d %H:%M")
        )
        .dimmed()
    );
    println!();

    if let Some(series) = &report.time_series {
        if series.is_empty() {
            println!("{}", "No cost data for this period.".yellow());
        } else {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new(bucket_label(report.resolution)).fg(Color::White),
                    Cell::new(format!("Cost ({})", report.currency)).fg(Color::White),
                ]);

            for bucket in series {
                table.add_row(vec![
                    Cell::new(format_bucket(bucket.timestamp, report.resolution)),
                    Cell::new(format!("{:.4}", bucket.cost)).fg(Color::Yellow),
                ]);
            }

            println!("{table}");
        }
        println!();
    }

    println!(
        "  {} {}",
        "Total Cost:".bold(),
        format!("{} {}", report.aggregate_cost_now, report.currency).yellow()
    );

    Ok(())
}

fn bucket_label(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Hour => "Hour",
        Resolution::Day => "Day",
        Resolution::Week => "Week of",
        Resolution::Month => "Month",
    }
}

fn format_bucket(timestamp: DateTime<Utc>, resolution: Resolution) -> String {
    match resolution {
        Resolution::Hour => timestamp.format("%Y-%m-%d %H:00").to_string(),
        Resolution::Day | Resolution::Week => timestamp.format("%Y-%m-%d").to_string(),
        Resolution::Month => timestamp.format("%Y-%m").to_string(),
    }
}
