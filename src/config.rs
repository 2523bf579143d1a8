use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheOptions;
use crate::export::{
    local, Column, ColumnsDefinition, ExportAdapter, ExportType, FakeExportAdapter,
    LocalExportAdapter,
};

pub const DEFAULT_CONFIG_FILE: &str = "export-cache.toml";

/// Complete configuration (loaded from `export-cache.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExportCacheConfig {
    #[serde(default)]
    pub adapter: AdapterConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Exportable tables and their schemas
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// Export backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Backend kind: local, fake
    #[serde(default = "default_adapter_kind")]
    pub kind: String,

    /// Root directory for local exports
    #[serde(default = "default_export_dir")]
    pub dir: String,

    /// SQL dialect of the configured column types
    #[serde(default = "default_dialect")]
    pub dialect: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            kind: default_adapter_kind(),
            dir: default_export_dir(),
            dialect: default_dialect(),
        }
    }
}

/// Cache behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Expire resolved references after this long (e.g. "24h"); unset keeps
    /// them for the whole run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Schema of one exportable table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<Column>,

    /// Overrides `adapter.dialect` for this table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
}

fn default_adapter_kind() -> String {
    "local".to_string()
}

fn default_export_dir() -> String {
    ".export-cache/exports".to_string()
}

fn default_dialect() -> String {
    ColumnsDefinition::DEFAULT_DIALECT.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse TTL string (e.g., "7d", "24h", "30m", "10s") into a duration
pub fn parse_ttl(ttl_str: &str) -> Result<Duration> {
    let ttl_str = ttl_str.trim().to_lowercase();

    let (num, unit_secs) = if let Some(num) = ttl_str.strip_suffix('d') {
        (num, 24 * 60 * 60)
    } else if let Some(num) = ttl_str.strip_suffix('h') {
        (num, 60 * 60)
    } else if let Some(num) = ttl_str.strip_suffix('m') {
        (num, 60)
    } else if let Some(num) = ttl_str.strip_suffix('s') {
        (num, 1)
    } else {
        // Assume seconds
        (ttl_str.as_str(), 1)
    };

    let count = num.trim().parse::<u64>().context("Invalid TTL number")?;
    let secs = match count.checked_mul(unit_secs) {
        Some(secs) => secs,
        None => anyhow::bail!("TTL too large: {}", ttl_str),
    };

    Ok(Duration::from_secs(secs))
}

impl ExportCacheConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: ExportCacheConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load `path`, else `./export-cache.toml` if present, else defaults
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = ExportCacheConfig {
            adapter: AdapterConfig::default(),
            cache: CacheConfig {
                ttl: Some("24h".to_string()),
            },
            observability: ObservabilityConfig::default(),
            tables: vec![TableConfig {
                name: "events_daily_to_project".to_string(),
                columns: vec![
                    Column::new("bucket_day", "DATE"),
                    Column::new("project_id", "VARCHAR"),
                    Column::new("event_type", "VARCHAR"),
                    Column::new("amount", "DOUBLE"),
                ],
                dialect: None,
            }],
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let kind: ExportType = self.adapter.kind.parse()?;
        if !matches!(kind, ExportType::Local | ExportType::Fake) {
            anyhow::bail!("adapter.kind must be one of: local, fake");
        }

        if kind == ExportType::Local && self.adapter.dir.is_empty() {
            anyhow::bail!("adapter.dir must be set for the local adapter");
        }

        if let Some(ttl) = &self.cache.ttl {
            parse_ttl(ttl).with_context(|| format!("cache.ttl is invalid: {}", ttl))?;
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if table.name.is_empty() {
                anyhow::bail!("tables.name must not be empty");
            }
            if kind == ExportType::Local {
                local::validate_table_name(&table.name)?;
            }
            if !seen.insert(table.name.as_str()) {
                anyhow::bail!("table {} is configured more than once", table.name);
            }
            self.columns_for(table)
                .with_context(|| format!("table {} has an invalid schema", table.name))?;
        }

        Ok(())
    }

    pub fn cache_options(&self) -> Result<CacheOptions> {
        let ttl = self.cache.ttl.as_deref().map(parse_ttl).transpose()?;
        Ok(CacheOptions { ttl })
    }

    /// Build the configured export adapter
    pub fn build_adapter(&self) -> Result<Arc<dyn ExportAdapter>> {
        match self.adapter.kind.parse::<ExportType>()? {
            ExportType::Local => {
                let mut adapter = LocalExportAdapter::new(&self.adapter.dir);
                for table in &self.tables {
                    adapter = adapter.with_table(&table.name, self.columns_for(table)?);
                }
                Ok(Arc::new(adapter))
            }
            ExportType::Fake => Ok(Arc::new(FakeExportAdapter::new())),
            other => anyhow::bail!("Unsupported adapter kind: {}", other),
        }
    }

    fn columns_for(&self, table: &TableConfig) -> Result<ColumnsDefinition> {
        let dialect = table.dialect.as_deref().unwrap_or(&self.adapter.dialect);
        Ok(ColumnsDefinition::new(table.columns.clone(), dialect)?)
    }
}
