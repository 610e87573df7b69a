use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use cloudcost_core::{config_search_paths, CloudCostConfig, ResponseShape};

pub fn cmd_shapes() -> anyhow::Result<()> {
    let config = CloudCostConfig::load_unvalidated(config_search_paths())?;
    let shapes = config.rating.response_shapes()?;

    println!("{}", "Response Shapes".cyan().bold());
    println!("{}", "Tried in this order until one answers.".dimmed());
    println!();
    println!("{}", shapes_table(&shapes));

    Ok(())
}

fn shapes_table(shapes: &[ResponseShape]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("#").fg(Color::White),
            Cell::new("Shape").fg(Color::White),
            Cell::new("Path").fg(Color::White),
            Cell::new("Paginated").fg(Color::White),
        ]);

    for (i, shape) in shapes.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(shape.id()).fg(Color::Cyan),
            Cell::new(shape.path()),
            Cell::new(if shape.pagination().is_some() { "yes" } else { "no" }),
        ]);
    }

    table
}

pub fn cmd_config() -> anyhow::Result<()> {
    let paths = config_search_paths();
    let config = CloudCostConfig::load_unvalidated(paths.clone())?;

    println!("{}", "Configuration".cyan().bold());
    println!();

    println!("  {}", "Files".yellow().bold());
    for path in &paths {
        if path.exists() {
            println!("    {} {}", "✓".green(), path.display());
        } else {
            println!("    {} {}", "-".dimmed(), path.display().to_string().dimmed());
        }
    }
    println!();

    println!("  {}", "Effective settings".yellow().bold());
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    println!();

    match config.validate() {
        Ok(()) => println!("{} {}", "✓".green().bold(), "Configuration is valid".green()),
        Err(e) => println!("{} {}", "✗".red().bold(), e.to_string().red()),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_table_lists_in_order() {
        let table = shapes_table(&ResponseShape::PRIORITY).to_string();
        let summary = table.find("v2.summary").unwrap();
        let report = table.find("v1.report.summary").unwrap();
        assert!(summary < report);
        assert!(table.contains("/v1/storage/dataframes"));
    }
}
