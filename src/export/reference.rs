//! Export reference model
//!
//! An [`ExportReference`] describes one completed export: which table was
//! exported, by what mechanism, the column schema, and a mechanism-specific
//! payload (e.g. the storage path). References are immutable once built and
//! are shared between callers behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::ReferenceError;

/// Payload key holding a `gs://bucket/path` export location
pub const GCS_PATH_KEY: &str = "gcs_path";

/// Payload key holding a local export directory
pub const LOCAL_PATH_KEY: &str = "local_path";

/// Mechanism used to perform an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ExportType {
    /// Google Cloud Storage
    Gcs,
    /// Directory on the local filesystem
    Local,
    /// In-process fake used in tests
    Fake,
}

impl ExportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gcs => "gcs",
            Self::Local => "local",
            Self::Fake => "fake",
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "local" => Ok(Self::Local),
            "fake" => Ok(Self::Fake),
            _ => anyhow::bail!("Invalid export type: {}. Must be gcs, local, or fake", s),
        }
    }
}

/// A single column: name and dialect-specific type name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Ordered column schema of an exported table
///
/// Column order is significant; column names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnsDefinition {
    columns: Vec<Column>,
    dialect: String,
}

impl ColumnsDefinition {
    pub const DEFAULT_DIALECT: &'static str = "duckdb";

    pub fn new(columns: Vec<Column>, dialect: impl Into<String>) -> Result<Self, ReferenceError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(ReferenceError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self {
            columns,
            dialect: dialect.into().to_lowercase(),
        })
    }

    /// Schema with no columns
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            dialect: Self::DEFAULT_DIALECT.to_string(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns with type names rendered for another SQL dialect
    ///
    /// Only common scalar types are translated; anything else is passed
    /// through unchanged.
    pub fn columns_as(&self, dialect: &str) -> Vec<Column> {
        let target = dialect.to_lowercase();
        self.columns
            .iter()
            .map(|column| Column {
                name: column.name.clone(),
                data_type: translate_type(&column.data_type, &self.dialect, &target),
            })
            .collect()
    }
}

impl<'de> Deserialize<'de> for ColumnsDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            columns: Vec<Column>,
            #[serde(default = "default_dialect")]
            dialect: String,
        }

        let raw = Raw::deserialize(deserializer)?;
        ColumnsDefinition::new(raw.columns, raw.dialect).map_err(serde::de::Error::custom)
    }
}

fn default_dialect() -> String {
    ColumnsDefinition::DEFAULT_DIALECT.to_string()
}

/// Canonical scalar types shared by the supported dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Boolean,
    Int32,
    Int64,
    Float64,
    Decimal,
    Text,
    Bytes,
    Date,
    Timestamp,
}

fn parse_scalar(data_type: &str, dialect: &str) -> Option<ScalarType> {
    let upper = data_type.trim().to_uppercase();
    let base = upper.split('(').next().unwrap_or(&upper).trim();

    let scalar = match (dialect, base) {
        (_, "BOOLEAN" | "BOOL") => ScalarType::Boolean,
        ("clickhouse", "INT32") => ScalarType::Int32,
        ("clickhouse", "INT64") => ScalarType::Int64,
        ("bigquery", "INT64" | "INTEGER") => ScalarType::Int64,
        (_, "INTEGER" | "INT" | "INT4") => ScalarType::Int32,
        (_, "BIGINT" | "INT8" | "INT64") => ScalarType::Int64,
        (_, "DOUBLE" | "FLOAT64" | "FLOAT8") => ScalarType::Float64,
        (_, "DECIMAL" | "NUMERIC" | "BIGNUMERIC") => ScalarType::Decimal,
        (_, "VARCHAR" | "STRING" | "TEXT") => ScalarType::Text,
        (_, "BLOB" | "BYTES" | "BYTEA") => ScalarType::Bytes,
        (_, "DATE" | "DATE32") => ScalarType::Date,
        (_, "TIMESTAMP" | "DATETIME" | "DATETIME64") => ScalarType::Timestamp,
        _ => return None,
    };

    Some(scalar)
}

fn render_scalar(scalar: ScalarType, dialect: &str) -> Option<&'static str> {
    let rendered = match dialect {
        "duckdb" => match scalar {
            ScalarType::Boolean => "BOOLEAN",
            ScalarType::Int32 => "INTEGER",
            ScalarType::Int64 => "BIGINT",
            ScalarType::Float64 => "DOUBLE",
            ScalarType::Decimal => "DECIMAL",
            ScalarType::Text => "VARCHAR",
            ScalarType::Bytes => "BLOB",
            ScalarType::Date => "DATE",
            ScalarType::Timestamp => "TIMESTAMP",
        },
        "bigquery" => match scalar {
            ScalarType::Boolean => "BOOL",
            ScalarType::Int32 | ScalarType::Int64 => "INT64",
            ScalarType::Float64 => "FLOAT64",
            ScalarType::Decimal => "NUMERIC",
            ScalarType::Text => "STRING",
            ScalarType::Bytes => "BYTES",
            ScalarType::Date => "DATE",
            ScalarType::Timestamp => "TIMESTAMP",
        },
        "clickhouse" => match scalar {
            ScalarType::Boolean => "Bool",
            ScalarType::Int32 => "Int32",
            ScalarType::Int64 => "Int64",
            ScalarType::Float64 => "Float64",
            ScalarType::Decimal => "Decimal(38, 9)",
            ScalarType::Text | ScalarType::Bytes => "String",
            ScalarType::Date => "Date32",
            ScalarType::Timestamp => "DateTime64(6)",
        },
        _ => return None,
    };

    Some(rendered)
}

fn translate_type(data_type: &str, from: &str, to: &str) -> String {
    if from == to {
        return data_type.to_string();
    }

    parse_scalar(data_type, from)
        .and_then(|scalar| render_scalar(scalar, to))
        .map(str::to_string)
        .unwrap_or_else(|| data_type.to_string())
}

/// Descriptor of a completed export
///
/// Built once with [`ExportReference::new`] and the consuming
/// [`ExportReference::with_payload`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReference {
    table_name: String,
    #[serde(rename = "type")]
    export_type: ExportType,
    columns: ColumnsDefinition,
    #[serde(default)]
    payload: BTreeMap<String, serde_json::Value>,
}

impl ExportReference {
    pub fn new(
        table_name: impl Into<String>,
        export_type: ExportType,
        columns: ColumnsDefinition,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            export_type,
            columns,
            payload: BTreeMap::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn export_type(&self) -> ExportType {
        self.export_type
    }

    pub fn columns(&self) -> &ColumnsDefinition {
        &self.columns
    }

    pub fn payload(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.payload
    }

    /// String payload value, or `MissingPayload` if absent or not a string
    pub fn payload_str(&self, key: &str) -> Result<&str, ReferenceError> {
        self.payload
            .get(key)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ReferenceError::MissingPayload {
                table: self.table_name.clone(),
                key: key.to_string(),
            })
    }
}

/// Bucket and blob prefix of a GCS export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcsLocation {
    pub bucket: String,
    pub blob_path: String,
}

impl GcsLocation {
    pub fn from_reference(reference: &ExportReference) -> Result<Self, ReferenceError> {
        if reference.export_type() != ExportType::Gcs {
            return Err(ReferenceError::UnsupportedExportType(reference.export_type()));
        }
        reference.payload_str(GCS_PATH_KEY)?.parse()
    }

    /// HTTPS glob URL covering every file of the export
    pub fn import_url(&self) -> String {
        format!(
            "https://storage.googleapis.com/{}/{}/*",
            self.bucket, self.blob_path
        )
    }
}

impl FromStr for GcsLocation {
    type Err = ReferenceError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let rest = path
            .strip_prefix("gs://")
            .ok_or_else(|| ReferenceError::InvalidGcsPath(path.to_string()))?;
        let (bucket, blob_path) = rest.split_once('/').unwrap_or((rest, ""));

        if bucket.is_empty() {
            return Err(ReferenceError::InvalidGcsPath(path.to_string()));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            blob_path: blob_path.trim_matches('/').to_string(),
        })
    }
}

/// Destination table identity, optionally schema-qualified
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    pub schema: Option<String>,
    pub table: String,
}

impl TableReference {
    pub fn new(schema: Option<&str>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.map(str::to_string),
            table: table.into(),
        }
    }

    /// Fully qualified name
    pub fn fqn(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }
}

impl FromStr for TableReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ReferenceError::InvalidTableReference(s.to_string());

        match s.split('.').collect::<Vec<_>>().as_slice() {
            [table] if !table.is_empty() => Ok(Self::new(None, *table)),
            [schema, table] if !schema.is_empty() && !table.is_empty() => {
                Ok(Self::new(Some(*schema), *table))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fqn())
    }
}
