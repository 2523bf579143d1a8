//! Importers that load exported tables into a destination
//!
//! An importer declares which [`ExportType`]s it understands and loads the
//! data an [`ExportReference`] points at into a destination table.

mod local;

pub use local::LocalImporter;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::ReferenceError;
use crate::export::{ExportReference, ExportType, TableReference};

#[async_trait]
pub trait Importer: Send + Sync {
    fn supported_types(&self) -> &[ExportType];

    /// Load `reference` into `destination`, replacing any existing table
    async fn import_table(
        &self,
        destination: &TableReference,
        reference: &ExportReference,
    ) -> Result<()>;
}

/// Reject references the importer cannot read
pub fn ensure_supported(
    importer: &dyn Importer,
    reference: &ExportReference,
) -> Result<(), ReferenceError> {
    if importer
        .supported_types()
        .contains(&reference.export_type())
    {
        Ok(())
    } else {
        Err(ReferenceError::UnsupportedExportType(
            reference.export_type(),
        ))
    }
}
