//! Export model and backends
//!
//! - [`ExportReference`]: immutable descriptor of a completed export
//! - [`ExportAdapter`]: capability that performs exports for one backend
//! - [`FakeExportAdapter`], [`LocalExportAdapter`]: built-in backends

mod adapter;
mod fake;
pub mod local;
mod reference;

pub use adapter::ExportAdapter;
pub use fake::FakeExportAdapter;
pub use local::LocalExportAdapter;
pub use reference::{
    Column, ColumnsDefinition, ExportReference, ExportType, GcsLocation, TableReference,
    GCS_PATH_KEY, LOCAL_PATH_KEY,
};
