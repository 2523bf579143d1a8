use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use crate::export::ExportType;

/// Errors surfaced by the cache export manager
#[derive(Debug, Error)]
pub enum CacheError {
    /// The adapter could not be initialized; no manager was created
    #[error("Export adapter setup failed: {0:#}")]
    Setup(anyhow::Error),

    /// An export failed for one of the requested tables
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Failure of a single export attempt
///
/// Cloneable so that the one failed attempt can be handed to every caller
/// that was waiting on the same key.
#[derive(Debug, Clone, Error)]
#[error("Export of table `{table_name}` at {execution_time} failed: {cause:#}")]
pub struct ExportError {
    table_name: String,
    execution_time: DateTime<Utc>,
    cause: Arc<anyhow::Error>,
}

impl ExportError {
    pub fn new(
        table_name: impl Into<String>,
        execution_time: DateTime<Utc>,
        cause: anyhow::Error,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            execution_time,
            cause: Arc::new(cause),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn execution_time(&self) -> DateTime<Utc> {
        self.execution_time
    }

    /// Underlying adapter error
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

/// Problems with the contents of an export reference or its schema
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Unsupported export type: {0}")]
    UnsupportedExportType(ExportType),

    #[error("Export reference for `{table}` is missing payload key `{key}`")]
    MissingPayload { table: String, key: String },

    #[error("Invalid GCS path: {0}")]
    InvalidGcsPath(String),

    #[error("Invalid table reference: {0}")]
    InvalidTableReference(String),
}
