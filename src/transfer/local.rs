use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{ensure_supported, Importer};
use crate::export::{ExportReference, ExportType, TableReference, LOCAL_PATH_KEY};
use crate::logging::{operations, services, status};

/// Imports `local` exports into a directory-per-table warehouse
///
/// Data is copied into `<root>/<fqn>_<timestamp>` first, then the existing
/// `<root>/<fqn>` is dropped and the loading directory renamed into place.
pub struct LocalImporter {
    root: PathBuf,
}

impl LocalImporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn table_dir(&self, table: &TableReference) -> PathBuf {
        self.root.join(table.fqn())
    }
}

#[async_trait]
impl Importer for LocalImporter {
    fn supported_types(&self) -> &[ExportType] {
        &[ExportType::Local]
    }

    async fn import_table(
        &self,
        destination: &TableReference,
        reference: &ExportReference,
    ) -> Result<()> {
        ensure_supported(self, reference)?;
        let source = PathBuf::from(reference.payload_str(LOCAL_PATH_KEY)?);

        let final_dir = self.table_dir(destination);
        let loading_dir = self.root.join(format!(
            "{}_{}",
            destination.fqn(),
            Utc::now().format("%Y%m%d%H%M%S")
        ));

        let root = self.root.clone();
        let table = destination.fqn();
        tokio::task::spawn_blocking(move || {
            fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create import root: {}", root.display()))?;

            let result = replace_table(&source, &loading_dir, &final_dir, &table);
            if result.is_err() {
                discard_loading_dir(&loading_dir);
            }
            result?;

            debug!(
                service = services::TRANSFER,
                operation = operations::IMPORT,
                status = status::SUCCESS,
                table = %table,
                "table imported"
            );
            Ok(())
        })
        .await
        .context("Import task panicked")?
    }
}

/// Copy `source` into `loading_dir`, then swap it in for `final_dir`
fn replace_table(source: &Path, loading_dir: &Path, final_dir: &Path, table: &str) -> Result<()> {
    debug!(table = %table, path = %loading_dir.display(), "copying export into loading directory");
    copy_dir(source, loading_dir)?;

    if final_dir.exists() {
        debug!(table = %table, "dropping existing table");
        fs::remove_dir_all(final_dir)
            .with_context(|| format!("Failed to remove existing table: {}", final_dir.display()))?;
    }

    fs::rename(loading_dir, final_dir).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            loading_dir.display(),
            final_dir.display()
        )
    })
}

/// Best-effort removal of a partially written loading directory
fn discard_loading_dir(loading_dir: &Path) {
    if !loading_dir.exists() {
        return;
    }
    if let Err(err) = fs::remove_dir_all(loading_dir) {
        warn!(
            service = services::TRANSFER,
            operation = operations::IMPORT,
            path = %loading_dir.display(),
            error = %err,
            "failed to remove loading directory"
        );
    }
}

fn copy_dir(source: &Path, dest: &Path) -> Result<()> {
    if !source.is_dir() {
        anyhow::bail!("Export directory not found: {}", source.display());
    }

    for entry in WalkDir::new(source) {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory: {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{
        Column, ColumnsDefinition, ExportAdapter, LocalExportAdapter, local::MANIFEST_FILE,
    };
    use tempfile::TempDir;

    async fn exported(temp: &TempDir) -> ExportReference {
        let columns = ColumnsDefinition::new(vec![Column::new("id", "BIGINT")], "duckdb").unwrap();
        let adapter =
            LocalExportAdapter::new(temp.path().join("exports")).with_table("events", columns);
        adapter.initialize().await.unwrap();
        adapter.export_table("events", Utc::now()).await.unwrap()
    }

    #[tokio::test]
    async fn test_import_replaces_existing_table() {
        let temp = TempDir::new().unwrap();
        let reference = exported(&temp).await;
        let importer = LocalImporter::new(temp.path().join("warehouse"));
        let destination: TableReference = "metrics.events".parse().unwrap();

        let final_dir = importer.table_dir(&destination);
        fs::create_dir_all(&final_dir).unwrap();
        fs::write(final_dir.join("stale.json"), b"{}").unwrap();

        importer.import_table(&destination, &reference).await.unwrap();

        assert!(final_dir.join(MANIFEST_FILE).exists());
        assert!(!final_dir.join("stale.json").exists());

        // Only the final table directory remains
        let entries: Vec<_> = fs::read_dir(temp.path().join("warehouse"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("metrics.events")]);
    }

    #[tokio::test]
    async fn test_import_rejects_unsupported_type() {
        let temp = TempDir::new().unwrap();
        let importer = LocalImporter::new(temp.path());
        let reference =
            ExportReference::new("events", ExportType::Gcs, ColumnsDefinition::empty());

        let err = importer
            .import_table(&"events".parse().unwrap(), &reference)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported export type: gcs"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_copy_leaves_warehouse_untouched() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("export");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.json"), b"{}").unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone.json"), source.join("sub/b.json"))
            .unwrap();

        let warehouse = temp.path().join("warehouse");
        let importer = LocalImporter::new(warehouse.clone());
        let destination: TableReference = "events".parse().unwrap();
        let final_dir = importer.table_dir(&destination);
        fs::create_dir_all(&final_dir).unwrap();
        fs::write(final_dir.join("existing.json"), b"{}").unwrap();

        let reference =
            ExportReference::new("events", ExportType::Local, ColumnsDefinition::empty())
                .with_payload(LOCAL_PATH_KEY, source.display().to_string());

        assert!(importer
            .import_table(&destination, &reference)
            .await
            .is_err());

        let entries: Vec<_> = fs::read_dir(&warehouse)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("events")]);
        assert!(final_dir.join("existing.json").exists());
    }

    #[tokio::test]
    async fn test_import_missing_source_fails() {
        let temp = TempDir::new().unwrap();
        let importer = LocalImporter::new(temp.path().join("warehouse"));
        let reference =
            ExportReference::new("events", ExportType::Local, ColumnsDefinition::empty())
                .with_payload(LOCAL_PATH_KEY, temp.path().join("missing").display().to_string());

        assert!(importer
            .import_table(&"events".parse().unwrap(), &reference)
            .await
            .is_err());
    }
}
