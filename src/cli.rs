use clap::{Parser, Subcommand};

/// export-cache - Deduplicating cache for table exports
///
/// Resolves export references for a set of tables, running each export at
/// most once per execution time.
#[derive(Parser, Debug)]
#[command(name = "export-cache")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deduplicating cache for table exports", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export tables (or reuse cached exports) and print their references
    Resolve(ResolveArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ResolveArgs {
    /// Config file path (defaults to ./export-cache.toml when present)
    #[arg(short = 'c', long, env = "EXPORT_CACHE_CONFIG")]
    pub config: Option<String>,

    /// Override the configured adapter kind (local, fake)
    #[arg(long, env = "EXPORT_CACHE_ADAPTER")]
    pub adapter: Option<String>,

    /// Execution time (RFC 3339, "YYYY-MM-DDTHH:MM:SS" or "YYYY-MM-DD", UTC); defaults to now
    #[arg(short = 't', long)]
    pub execution_time: Option<String>,

    /// Report failed tables in the output instead of failing the command
    #[arg(long)]
    pub partial: bool,

    /// Tables to export; repeated names are resolved once
    #[arg(required = true, num_args = 1..)]
    pub tables: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: String,
    },
    /// Print an example config file
    Example,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "export-cache",
            "resolve",
            "--partial",
            "-t",
            "2024-01-01",
            "table1",
            "table2",
            "table1",
        ])
        .unwrap();

        match cli.command {
            Commands::Resolve(args) => {
                assert!(args.partial);
                assert_eq!(args.execution_time.as_deref(), Some("2024-01-01"));
                assert_eq!(args.tables, vec!["table1", "table2", "table1"]);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_resolve_requires_tables() {
        assert!(Cli::try_parse_from(["export-cache", "resolve"]).is_err());
    }
}
