use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use export_cache::cache::{CacheExportManager, CacheStats};
use export_cache::config::ExportCacheConfig;
use export_cache::export::ExportReference;

use crate::cli::ResolveArgs;

#[derive(Debug, Serialize)]
struct ResolveOutput<'a> {
    execution_time: DateTime<Utc>,
    references: BTreeMap<&'a str, &'a ExportReference>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failed: BTreeMap<&'a str, String>,
    stats: CacheStats,
}

pub async fn run(args: ResolveArgs, mut config: ExportCacheConfig) -> Result<()> {
    if let Some(kind) = args.adapter {
        config.adapter.kind = kind;
    }
    config.validate()?;

    let execution_time = match args.execution_time.as_deref() {
        Some(value) => parse_execution_time(value)?,
        None => Utc::now(),
    };

    let manager =
        CacheExportManager::setup_with_options(config.build_adapter()?, config.cache_options()?)
            .await?;

    let resolution = manager
        .resolve_export_references_partial(&args.tables, execution_time)
        .await;

    if !args.partial {
        if let Some(failure) = resolution.failed.first() {
            return Err(failure.clone().into());
        }
    }

    let output = ResolveOutput {
        execution_time,
        references: resolution
            .resolved
            .iter()
            .map(|(name, reference)| (name.as_str(), reference.as_ref()))
            .collect(),
        failed: resolution
            .failed
            .iter()
            .map(|failure| (failure.table_name(), format!("{:#}", failure.cause())))
            .collect(),
        stats: manager.stats(),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize output")?
    );

    Ok(())
}

/// Parse an execution time given as RFC 3339, a naive UTC datetime, or a date
pub fn parse_execution_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }
    if let Ok(time) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(time.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    anyhow::bail!(
        "Invalid execution time: {}. Use RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD",
        value
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_execution_time() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_execution_time("2024-03-01T12:30:00Z").unwrap(), expected);
        assert_eq!(
            parse_execution_time("2024-03-01T14:30:00+02:00").unwrap(),
            expected
        );
        assert_eq!(parse_execution_time("2024-03-01T12:30:00").unwrap(), expected);
        assert_eq!(
            parse_execution_time("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert!(parse_execution_time("yesterday").is_err());
    }
}
