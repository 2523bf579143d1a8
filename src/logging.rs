//! Structured logging utilities
//!
//! All cache events use structured fields so they can be filtered and
//! aggregated.
//!
//! # Log Format Conventions
//!
//! - `service`: The emitting component ("export_cache", "transfer")
//! - `operation`: The operation being performed ("setup", "lookup", "export")
//! - `status`: The result status ("success", "hit", "miss", "in_flight", "error")
//! - `table`: Table name of the cache key
//! - `execution_time`: Execution time of the cache key
//!
//! # Examples
//!
//! ```rust
//! use export_cache::logging::{operations, services, status};
//! use tracing::debug;
//!
//! let table = "events";
//! debug!(
//!     service = services::EXPORT_CACHE,
//!     operation = operations::LOOKUP,
//!     status = status::HIT,
//!     table = table,
//!     "cache hit"
//! );
//! ```

use std::{fmt as std_fmt, io};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    self, format::Writer, FmtContext, FormatEvent, FormatFields, MakeWriter,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, EnvFilter, Layer};

const TAG: &str = "export-cache";

/// One line per event: timestamp, level, crate tag, then the event fields
struct LineFormatter {
    color: bool,
}

fn level_color(level: Level) -> &'static str {
    match level {
        Level::ERROR => "\x1b[31m",
        Level::WARN => "\x1b[33m",
        Level::INFO => "\x1b[32m",
        Level::DEBUG => "\x1b[34m",
        Level::TRACE => "\x1b[35m",
    }
}

impl<S, N> FormatEvent<S, N> for LineFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std_fmt::Result {
        let level = *event.metadata().level();
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");

        if self.color {
            write!(
                writer,
                "{} {}{:5}\x1b[0m {}: ",
                timestamp,
                level_color(level),
                level,
                TAG
            )?;
        } else {
            write!(writer, "{} {:5} {}: ", timestamp, level, TAG)?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Human-readable line layer shared by the pretty and compact formats
fn line_layer<S, W>(color: bool, make_writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .event_format(LineFormatter { color })
        .with_writer(make_writer)
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored
    Pretty,
    /// Plain single line (CI)
    Compact,
    /// JSON lines for log aggregation
    Json,
}

impl LogFormat {
    /// Parse from `EXPORT_CACHE_LOG_FORMAT`, falling back to compact under CI
    pub fn from_env() -> Self {
        Self::from_values(
            std::env::var("EXPORT_CACHE_LOG_FORMAT").ok().as_deref(),
            std::env::var("CI").is_ok(),
        )
    }

    fn from_values(format: Option<&str>, ci: bool) -> Self {
        match format.unwrap_or_default().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ if ci => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

/// Initialize the global tracing subscriber (writes to stderr)
///
/// # Environment Variables
///
/// - `RUST_LOG`: Log filter (defaults to `default_level`)
/// - `EXPORT_CACHE_LOG_FORMAT`: "pretty", "compact" or "json"
/// - `CI`: If set, defaults to compact format
///
/// Calling this more than once is a no-op.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = LogFormat::from_env();
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false)
                    .with_writer(io::stderr)
                    .json(),
            )
            .try_init(),
        LogFormat::Pretty | LogFormat::Compact => registry
            .with(line_layer(format == LogFormat::Pretty, io::stderr))
            .try_init(),
    };

    if let Err(err) = result {
        tracing::debug!("tracing subscriber already installed: {}", err);
    }
}

/// Service names
pub mod services {
    pub const EXPORT_CACHE: &str = "export_cache";
    pub const TRANSFER: &str = "transfer";
}

/// Operation names
pub mod operations {
    pub const SETUP: &str = "setup";
    pub const RESOLVE: &str = "resolve";
    pub const LOOKUP: &str = "lookup";
    pub const EXPORT: &str = "export";
    pub const IMPORT: &str = "import";
}

/// Status values
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const HIT: &str = "hit";
    pub const MISS: &str = "miss";
    pub const IN_FLIGHT: &str = "in_flight";
    pub const ERROR: &str = "error";
}
