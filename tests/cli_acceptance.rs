// Acceptance tests for the export-cache command line
//
// Each test runs the binary inside its own temporary directory so that no
// `export-cache.toml` from the surrounding checkout is picked up.
//
// To run: `cargo test --test cli_acceptance -- --nocapture`

mod common;

use assert_cmd::Command;
use common::TestWorkspace;
use predicates::prelude::*;

impl TestWorkspace {
    fn export_cache(&self) -> Command {
        let mut cmd = Command::new(std::env!("CARGO_BIN_EXE_export-cache"));
        cmd.current_dir(self.path())
            .env_remove("EXPORT_CACHE_CONFIG")
            .env_remove("EXPORT_CACHE_ADAPTER")
            .env("EXPORT_CACHE_LOG_FORMAT", "compact");
        cmd
    }
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_resolve_with_fake_adapter_deduplicates_tables() {
    let workspace = TestWorkspace::new();

    let json = stdout_json(workspace.export_cache().args([
        "resolve",
        "--adapter",
        "fake",
        "-t",
        "2024-01-15T06:00:00Z",
        "table1",
        "table2",
        "table1",
    ]));

    let references = json["references"].as_object().unwrap();
    assert_eq!(references.len(), 2);
    assert_eq!(json["references"]["table1"]["type"], "fake");
    assert_eq!(
        json["references"]["table2"]["payload"]["execution_time"],
        "2024-01-15T06:00:00+00:00"
    );
    assert_eq!(json["execution_time"], "2024-01-15T06:00:00Z");
    assert_eq!(json["stats"]["requests_total"], 2);
    assert_eq!(json["stats"]["misses_total"], 2);
    assert!(json.get("failed").is_none());
}

#[test]
fn test_resolve_with_local_config_writes_manifests() {
    let workspace = TestWorkspace::new();
    let config = workspace.write_local_config();

    let json = stdout_json(workspace.export_cache().args([
        "resolve",
        "-c",
        config.to_str().unwrap(),
        "-t",
        "2024-01-15",
        "events",
        "users",
    ]));

    assert_eq!(json["references"]["events"]["type"], "local");
    assert_eq!(
        json["references"]["events"]["columns"]["columns"][1]["name"],
        "created_at"
    );

    let events_dir = workspace.exports_dir().join("events");
    let export_dirs: Vec<_> = std::fs::read_dir(&events_dir).unwrap().collect();
    assert_eq!(export_dirs.len(), 1);
    assert!(workspace
        .exports_dir()
        .join("users/20240115T000000Z/manifest.json")
        .is_file());
}

#[test]
fn test_resolve_partial_reports_failed_tables() {
    let workspace = TestWorkspace::new();
    // Picked up from the working directory without -c
    workspace.write_local_config();

    let json = stdout_json(
        workspace
            .export_cache()
            .args(["resolve", "--partial", "events", "unknown"]),
    );

    assert!(json["references"]["events"].is_object());
    assert!(json["references"].get("unknown").is_none());
    assert!(json["failed"]["unknown"]
        .as_str()
        .unwrap()
        .contains("No schema registered for table: unknown"));
    assert_eq!(json["stats"]["exports_failed"], 1);
}

#[test]
fn test_resolve_fails_when_any_table_fails() {
    let workspace = TestWorkspace::new();
    workspace.write_local_config();

    workspace
        .export_cache()
        .args(["resolve", "events", "unknown"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Export of table `unknown`"));
}

#[test]
fn test_resolve_rejects_bad_input() {
    let workspace = TestWorkspace::new();

    // No tables
    workspace
        .export_cache()
        .args(["resolve", "--adapter", "fake"])
        .assert()
        .failure();

    workspace
        .export_cache()
        .args(["resolve", "--adapter", "fake", "-t", "last tuesday", "events"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid execution time"));

    workspace
        .export_cache()
        .args(["resolve", "--adapter", "gcs", "events"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("adapter.kind must be one of"));
}

#[test]
fn test_adapter_override_from_environment() {
    let workspace = TestWorkspace::new();

    let json = stdout_json(
        workspace
            .export_cache()
            .env("EXPORT_CACHE_ADAPTER", "fake")
            .args(["resolve", "events"]),
    );

    assert_eq!(json["references"]["events"]["type"], "fake");
}

#[test]
fn test_config_example_is_valid() {
    let workspace = TestWorkspace::new();

    let output = workspace
        .export_cache()
        .args(["config", "example"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let example = String::from_utf8(output.stdout).unwrap();
    assert!(example.contains("[adapter]"));
    assert!(example.contains("events_daily_to_project"));

    let path = workspace.write_config("example.toml", &example);
    workspace
        .export_cache()
        .args(["config", "validate", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file is valid"))
        .stdout(predicate::str::contains("Cache TTL: 24h"));
}

#[test]
fn test_config_validate_rejects_duplicate_columns() {
    let workspace = TestWorkspace::new();
    let path = workspace.write_config(
        "broken.toml",
        r#"
[[tables]]
name = "events"
columns = [
    { name = "id", type = "BIGINT" },
    { name = "id", type = "VARCHAR" },
]
"#,
    );

    workspace
        .export_cache()
        .args(["config", "validate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("events"));
}
