// Library interface for export-cache
// The binary and the acceptance tests use the cache through these modules

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod transfer;

// Re-export commonly used types
pub use cache::{BatchResolution, CacheExportManager, CacheKey, CacheOptions, CacheStats};
pub use error::{CacheError, ExportError, ReferenceError};
pub use export::{
    Column, ColumnsDefinition, ExportAdapter, ExportReference, ExportType, FakeExportAdapter,
    LocalExportAdapter, TableReference,
};
