//! Cache export manager
//!
//! Deduplicates and memoizes table exports. For every `(table, execution
//! time)` key at most one adapter call runs at a time:
//!
//! - **Hit**: a resolved reference is returned without calling the adapter
//! - **Join**: a caller that finds the key in flight awaits the same export
//! - **Miss**: the caller claims the key and the export is started
//!
//! ## Concurrency
//!
//! Checking for a key and claiming it happen under one map lock, so two
//! callers can never both see the key as absent. The adapter call itself runs
//! on a spawned tokio task outside the lock; it records the outcome in the map
//! before any waiter sees it. A failed export is delivered to every waiter
//! and its entry removed, so the next request retries it.
//!
//! Cancelling a caller (e.g. with `tokio::time::timeout`) only stops that
//! caller's wait. The export keeps running for the other waiters and its
//! result is still cached.
//!
//! ## Batch failures
//!
//! [`CacheExportManager::resolve_export_references`] fails the whole call if
//! any key fails, reporting the first failure in request order. Every key is
//! still awaited, so successful keys in the same batch are cached.
//! [`CacheExportManager::resolve_export_references_partial`] returns per-key
//! outcomes instead.

mod entry;
mod metrics;

pub use entry::CacheKey;
pub use metrics::{CacheMetrics, CacheStats};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::future::{join_all, FutureExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{CacheError, ExportError};
use crate::export::{ExportAdapter, ExportReference};
use crate::logging::{operations, services, status};
use entry::{EntryMap, ExportResult, Lookup, SharedExport};

/// Manager options
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Drop resolved entries older than this on their next lookup.
    /// `None` keeps them for the lifetime of the manager.
    pub ttl: Option<Duration>,
}

/// Per-key outcome of a batch resolution
#[derive(Debug, Default)]
pub struct BatchResolution {
    pub resolved: HashMap<String, Arc<ExportReference>>,
    /// Failures in request order
    pub failed: Vec<ExportError>,
}

impl BatchResolution {
    /// True when every requested table resolved
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, table_name: &str) -> Option<&ExportError> {
        self.failed
            .iter()
            .find(|failure| failure.table_name() == table_name)
    }

    /// All references, or the first failure in request order
    pub fn into_result(self) -> Result<HashMap<String, Arc<ExportReference>>, CacheError> {
        let Self { resolved, failed } = self;
        match failed.into_iter().next() {
            Some(failure) => Err(failure.into()),
            None => Ok(resolved),
        }
    }
}

/// Coordinates exports for one cache scope (typically one pipeline run)
///
/// Cloning is cheap; clones share the same entries, adapter and metrics.
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct CacheExportManager {
    adapter: Arc<dyn ExportAdapter>,
    entries: EntryMap,
    metrics: Arc<CacheMetrics>,
    options: CacheOptions,
}

impl CacheExportManager {
    /// Initialize `adapter` and create a manager with default options
    pub async fn setup(adapter: Arc<dyn ExportAdapter>) -> Result<Self, CacheError> {
        Self::setup_with_options(adapter, CacheOptions::default()).await
    }

    pub async fn setup_with_options(
        adapter: Arc<dyn ExportAdapter>,
        options: CacheOptions,
    ) -> Result<Self, CacheError> {
        if let Err(err) = adapter.initialize().await {
            error!(
                service = services::EXPORT_CACHE,
                operation = operations::SETUP,
                status = status::ERROR,
                adapter = adapter.name(),
                error = %format!("{:#}", err),
                "export adapter setup failed"
            );
            return Err(CacheError::Setup(err));
        }

        info!(
            service = services::EXPORT_CACHE,
            operation = operations::SETUP,
            status = status::SUCCESS,
            adapter = adapter.name(),
            ttl = ?options.ttl,
            "export cache ready"
        );

        Ok(Self {
            adapter,
            entries: EntryMap::new(),
            metrics: Arc::new(CacheMetrics::new()),
            options,
        })
    }

    /// Resolve references for every distinct name in `table_names`
    ///
    /// Duplicates are collapsed; the result has one entry per distinct name.
    /// Fails with the first failure in request order if any export fails.
    pub async fn resolve_export_references<I, S>(
        &self,
        table_names: I,
        execution_time: DateTime<Utc>,
    ) -> Result<HashMap<String, Arc<ExportReference>>, CacheError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resolve_export_references_partial(table_names, execution_time)
            .await
            .into_result()
    }

    /// Like [`resolve_export_references`](Self::resolve_export_references)
    /// but reports failures per table instead of failing the call
    pub async fn resolve_export_references_partial<I, S>(
        &self,
        table_names: I,
        execution_time: DateTime<Utc>,
    ) -> BatchResolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = distinct_names(table_names);
        if names.is_empty() {
            return BatchResolution::default();
        }

        let started = Instant::now();
        let outcomes = join_all(
            names
                .iter()
                .map(|name| self.resolve_key(CacheKey::new(name.as_str(), execution_time))),
        )
        .await;

        let mut resolution = BatchResolution::default();
        for (name, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Ok(reference) => {
                    resolution.resolved.insert(name, reference);
                }
                Err(failure) => resolution.failed.push(failure),
            }
        }

        info!(
            service = services::EXPORT_CACHE,
            operation = operations::RESOLVE,
            status = if resolution.is_complete() { status::SUCCESS } else { status::ERROR },
            execution_time = %execution_time,
            success_count = resolution.resolved.len(),
            error_count = resolution.failed.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "resolved export references"
        );

        resolution
    }

    /// Resolve a single table
    pub async fn resolve_export_reference(
        &self,
        table_name: &str,
        execution_time: DateTime<Utc>,
    ) -> Result<Arc<ExportReference>, ExportError> {
        self.resolve_key(CacheKey::new(table_name, execution_time))
            .await
    }

    /// Whether a resolved reference is cached for the key
    pub fn is_cached(&self, table_name: &str, execution_time: DateTime<Utc>) -> bool {
        self.entries
            .is_resolved(&CacheKey::new(table_name, execution_time))
    }

    /// Whether an export for the key is currently running
    pub fn is_in_flight(&self, table_name: &str, execution_time: DateTime<Utc>) -> bool {
        self.entries
            .is_pending(&CacheKey::new(table_name, execution_time))
    }

    /// Number of pending and resolved entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    async fn resolve_key(&self, key: CacheKey) -> ExportResult {
        let lookup = self
            .entries
            .lookup_or_claim(&key, self.options.ttl, |generation| {
                self.start_export(key.clone(), generation)
            });

        match lookup {
            Lookup::Hit(reference) => {
                self.metrics.record_hit();
                debug!(
                    service = services::EXPORT_CACHE,
                    operation = operations::LOOKUP,
                    status = status::HIT,
                    table = %key.table_name,
                    execution_time = %key.execution_time,
                    "cache hit"
                );
                Ok(reference)
            }
            Lookup::InFlight(export) => {
                self.metrics.record_join();
                debug!(
                    service = services::EXPORT_CACHE,
                    operation = operations::LOOKUP,
                    status = status::IN_FLIGHT,
                    table = %key.table_name,
                    execution_time = %key.execution_time,
                    "joining in-flight export"
                );
                export.await
            }
            Lookup::Claimed {
                export,
                replaced_expired,
            } => {
                if replaced_expired {
                    self.metrics.record_expiration();
                }
                self.metrics.record_miss();
                debug!(
                    service = services::EXPORT_CACHE,
                    operation = operations::LOOKUP,
                    status = status::MISS,
                    table = %key.table_name,
                    execution_time = %key.execution_time,
                    expired = replaced_expired,
                    "cache miss"
                );
                export.await
            }
        }
    }

    /// Spawn the adapter call for a freshly claimed key
    ///
    /// Called with the entry map locked; must not block or await.
    fn start_export(&self, key: CacheKey, generation: u64) -> SharedExport {
        let task = tokio::spawn(run_export(
            Arc::clone(&self.adapter),
            self.entries.clone(),
            Arc::clone(&self.metrics),
            key.clone(),
            generation,
        ));

        let entries = self.entries.clone();
        let metrics = Arc::clone(&self.metrics);
        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    // The task died before recording an outcome
                    if entries.fail(&key, generation) {
                        metrics.record_export(false);
                    }
                    error!(
                        service = services::EXPORT_CACHE,
                        operation = operations::EXPORT,
                        status = status::ERROR,
                        table = %key.table_name,
                        execution_time = %key.execution_time,
                        "export task aborted: {}",
                        join_error
                    );
                    Err(ExportError::new(
                        key.table_name,
                        key.execution_time,
                        anyhow!("export task aborted: {}", join_error),
                    ))
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn run_export(
    adapter: Arc<dyn ExportAdapter>,
    entries: EntryMap,
    metrics: Arc<CacheMetrics>,
    key: CacheKey,
    generation: u64,
) -> ExportResult {
    let started = Instant::now();
    debug!(
        service = services::EXPORT_CACHE,
        operation = operations::EXPORT,
        adapter = adapter.name(),
        table = %key.table_name,
        execution_time = %key.execution_time,
        "starting export"
    );

    match adapter
        .export_table(&key.table_name, key.execution_time)
        .await
    {
        Ok(reference) => {
            if reference.table_name() != key.table_name {
                warn!(
                    table = %key.table_name,
                    reference_table = reference.table_name(),
                    "adapter returned a reference for a different table"
                );
            }

            let reference = Arc::new(reference);
            entries.resolve(&key, generation, Arc::clone(&reference));
            metrics.record_export(true);
            info!(
                service = services::EXPORT_CACHE,
                operation = operations::EXPORT,
                status = status::SUCCESS,
                adapter = adapter.name(),
                table = %key.table_name,
                execution_time = %key.execution_time,
                export_type = %reference.export_type(),
                duration_ms = started.elapsed().as_millis() as u64,
                "export complete"
            );
            Ok(reference)
        }
        Err(err) => {
            entries.fail(&key, generation);
            metrics.record_export(false);
            warn!(
                service = services::EXPORT_CACHE,
                operation = operations::EXPORT,
                status = status::ERROR,
                adapter = adapter.name(),
                table = %key.table_name,
                execution_time = %key.execution_time,
                duration_ms = started.elapsed().as_millis() as u64,
                error = %format!("{:#}", err),
                "export failed"
            );
            Err(ExportError::new(key.table_name, key.execution_time, err))
        }
    }
}

/// Distinct names in first-seen order
fn distinct_names<I, S>(table_names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    table_names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            seen.insert(name.to_string()).then(|| name.to_string())
        })
        .collect()
}
