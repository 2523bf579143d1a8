// Shared helpers for export-cache acceptance tests

use chrono::{DateTime, TimeZone, Utc};
use export_cache::{ColumnsDefinition, ExportReference, ExportType, FakeExportAdapter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Fixed execution time so keys are reproducible across calls
#[allow(dead_code)]
pub fn execution_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap()
}

/// GCS reference shaped like a warehouse export
#[allow(dead_code)]
pub fn gcs_reference(table_name: &str) -> ExportReference {
    ExportReference::new(table_name, ExportType::Gcs, ColumnsDefinition::empty())
        .with_payload("gcs_path", format!("gs://exports/{}/part", table_name))
}

/// Fake adapter that returns a GCS reference for each of `tables`
#[allow(dead_code)]
pub fn scripted_adapter(tables: &[&str]) -> Arc<FakeExportAdapter> {
    let adapter = tables
        .iter()
        .fold(FakeExportAdapter::new(), |adapter, table| {
            adapter.with_reference(*table, gcs_reference(table))
        });
    Arc::new(adapter)
}

/// Isolated working directory with an optional config file
#[allow(dead_code)]
pub struct TestWorkspace {
    _temp_dir: TempDir,
    pub root: PathBuf,
}

#[allow(dead_code)]
impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    /// Write a config that exports `events` and `users` under `<root>/exports`
    pub fn write_local_config(&self) -> PathBuf {
        // Forward slashes keep the path valid inside TOML strings on Windows
        let exports_dir = self.root.join("exports").display().to_string().replace('\\', "/");
        let content = format!(
            r#"
[adapter]
kind = "local"
dir = "{}"

[observability]
log_level = "warn"

[[tables]]
name = "events"
columns = [
    {{ name = "id", type = "BIGINT" }},
    {{ name = "created_at", type = "TIMESTAMP" }},
]

[[tables]]
name = "users"
columns = [{{ name = "id", type = "BIGINT" }}]
"#,
            exports_dir
        );
        self.write_config("export-cache.toml", &content)
    }

    pub fn write_config(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        std::fs::write(&path, content).expect("Failed to write test config");
        path
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}
