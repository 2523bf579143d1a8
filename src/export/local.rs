//! Filesystem export backend
//!
//! Layout:
//! - `<root>/<table>/<YYYYmmddTHHMMSSZ>/manifest.json` - one directory per export

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ColumnsDefinition, ExportAdapter, ExportReference, ExportType, LOCAL_PATH_KEY};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest written next to every local export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub version: u32,
    pub table_name: String,
    pub execution_time: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    pub columns: ColumnsDefinition,
}

/// Reject table names that would not map to a single directory under the root
pub fn validate_table_name(table_name: &str) -> Result<()> {
    if table_name.is_empty()
        || table_name == "."
        || table_name.contains("..")
        || table_name.contains(['/', '\\'])
    {
        anyhow::bail!("Invalid table name for local export: {:?}", table_name);
    }
    Ok(())
}

pub struct LocalExportAdapter {
    root: PathBuf,
    schemas: HashMap<String, ColumnsDefinition>,
}

impl LocalExportAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            schemas: HashMap::new(),
        }
    }

    /// Register the schema of an exportable table
    pub fn with_table(mut self, table_name: impl Into<String>, columns: ColumnsDefinition) -> Self {
        self.schemas.insert(table_name.into(), columns);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for one export of `table_name`
    pub fn export_dir(&self, table_name: &str, execution_time: DateTime<Utc>) -> PathBuf {
        self.root
            .join(table_name)
            .join(execution_time.format("%Y%m%dT%H%M%S%.fZ").to_string())
    }
}

#[async_trait]
impl ExportAdapter for LocalExportAdapter {
    fn name(&self) -> &str {
        "local"
    }

    async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create export directory: {}", self.root.display()))?;

        info!(root = %self.root.display(), tables = self.schemas.len(), "local export adapter ready");
        Ok(())
    }

    async fn export_table(
        &self,
        table_name: &str,
        execution_time: DateTime<Utc>,
    ) -> Result<ExportReference> {
        validate_table_name(table_name)?;

        let columns = self
            .schemas
            .get(table_name)
            .cloned()
            .with_context(|| format!("No schema registered for table: {}", table_name))?;

        let export_dir = self.export_dir(table_name, execution_time);
        tokio::fs::create_dir_all(&export_dir)
            .await
            .with_context(|| format!("Failed to create export directory: {}", export_dir.display()))?;

        let manifest = ExportManifest {
            version: 1,
            table_name: table_name.to_string(),
            execution_time,
            exported_at: Utc::now(),
            columns: columns.clone(),
        };
        let manifest_path = export_dir.join(MANIFEST_FILE);
        let manifest_json =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        tokio::fs::write(&manifest_path, manifest_json)
            .await
            .with_context(|| format!("Failed to write manifest: {}", manifest_path.display()))?;

        debug!(table = table_name, path = %export_dir.display(), "local export written");

        Ok(
            ExportReference::new(table_name, ExportType::Local, columns)
                .with_payload(LOCAL_PATH_KEY, export_dir.display().to_string()),
        )
    }
}
