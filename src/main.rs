mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use export_cache::config::ExportCacheConfig;
use export_cache::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve(args) => {
            let config = ExportCacheConfig::load(args.config.as_deref())?;
            logging::init(&config.observability.log_level);
            commands::resolve::run(args, config).await
        }
        Commands::Config(args) => {
            logging::init("info");
            commands::config::run(args.command)
        }
    }
}
