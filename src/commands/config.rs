use anyhow::Result;
use tracing::info;

use crate::cli::ConfigCommands;
use export_cache::config::ExportCacheConfig;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Example => example(),
    }
}

fn validate(path: &str) -> Result<()> {
    info!("Validating config file: {}", path);

    let config = ExportCacheConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path);
    println!("\nSummary:");
    println!("  - Adapter: {}", config.adapter.kind);
    println!("  - Export directory: {}", config.adapter.dir);
    println!(
        "  - Cache TTL: {}",
        config.cache.ttl.as_deref().unwrap_or("none")
    );
    println!("  - Tables: {}", config.tables.len());

    for (i, table) in config.tables.iter().enumerate() {
        println!("    {}. {} ({} columns)", i + 1, table.name, table.columns.len());
    }

    Ok(())
}

fn example() -> Result<()> {
    println!("{}", ExportCacheConfig::example()?);
    Ok(())
}
