use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use cloudcost_core::pricing::FLAVOR_FIELD;
use cloudcost_core::{build_client, PricingSeeder, SeedSummary};

use super::{load_engine, OutputFormat};

pub async fn cmd_seed_pricing(format: OutputFormat) -> anyhow::Result<()> {
    let (config, engine) = load_engine()?;

    if format == OutputFormat::Text {
        println!("{}", "Seeding default pricing...".cyan().bold());
        println!();
        println!("  {} Resolving rating endpoint...", "→".blue());
    }
    let endpoint = engine.resolver().resolve().await?;

    if format == OutputFormat::Text {
        println!("  {} Using {}", "→".blue(), endpoint.base_url);
    }
    let summary = PricingSeeder::new(build_client(&config)?)
        .ensure_defaults(&endpoint)
        .await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("{}", summary_table(&summary));
    println!();

    if summary.is_noop() {
        println!(
            "{} {}",
            "✓".green().bold(),
            "Default pricing already present, nothing changed.".green()
        );
    } else {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("Created {} price mapping(s).", summary.created_count()).green()
        );
    }

    Ok(())
}

fn summary_table(summary: &SeedSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Service").fg(Color::White),
            Cell::new("Field").fg(Color::White),
            Cell::new("Created").fg(Color::White),
            Cell::new("Already present").fg(Color::White),
        ]);

    for service in &summary.services {
        let name = if service.created_service {
            format!("{} (new)", service.service)
        } else {
            service.service.clone()
        };
        let field = if service.created_field {
            format!("{} (new)", FLAVOR_FIELD)
        } else {
            FLAVOR_FIELD.to_string()
        };

        table.add_row(vec![
            Cell::new(name),
            Cell::new(field),
            Cell::new(join_or_dash(&service.created_mappings)).fg(Color::Green),
            Cell::new(join_or_dash(&service.existing_mappings)).fg(Color::DarkGrey),
        ]);
    }

    table
}

fn join_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}
