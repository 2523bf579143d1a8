use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::ExportReference;

/// Backend that materializes a table to external storage
///
/// Implementations must tolerate concurrent calls for different tables and
/// must be safe to call again for a table whose previous export failed.
#[async_trait]
pub trait ExportAdapter: Send + Sync + 'static {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// One-time initialization (opening connections, creating directories)
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Export `table_name` as of `execution_time`
    async fn export_table(
        &self,
        table_name: &str,
        execution_time: DateTime<Utc>,
    ) -> Result<ExportReference>;
}
