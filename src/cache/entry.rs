//! Cache entry lifecycle
//!
//! An entry moves `absent -> pending -> resolved` on success and
//! `absent -> pending -> absent` on failure. The map is only touched through
//! [`EntryMap::lookup_or_claim`], [`EntryMap::resolve`] and
//! [`EntryMap::fail`], each of which runs under one short-lived lock that is
//! never held across an await point.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ExportError;
use crate::export::ExportReference;

pub(crate) type ExportResult = Result<Arc<ExportReference>, ExportError>;

/// One in-flight export, awaitable by any number of callers
pub(crate) type SharedExport = Shared<BoxFuture<'static, ExportResult>>;

/// Identity of a cached export: table name plus execution time
///
/// Execution times are compared exactly; no truncation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub table_name: String,
    pub execution_time: DateTime<Utc>,
}

impl CacheKey {
    pub fn new(table_name: impl Into<String>, execution_time: DateTime<Utc>) -> Self {
        Self {
            table_name: table_name.into(),
            execution_time,
        }
    }
}

enum CacheEntry {
    Pending {
        generation: u64,
        export: SharedExport,
    },
    Resolved {
        reference: Arc<ExportReference>,
        resolved_at: Instant,
    },
}

/// Outcome of [`EntryMap::lookup_or_claim`]
pub(crate) enum Lookup {
    /// Resolved entry reused
    Hit(Arc<ExportReference>),
    /// Another caller's export is running; await it
    InFlight(SharedExport),
    /// This caller claimed the key and started the export
    Claimed {
        export: SharedExport,
        replaced_expired: bool,
    },
}

#[derive(Clone, Default)]
pub(crate) struct EntryMap {
    entries: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
    next_generation: Arc<AtomicU64>,
}

impl EntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check for `key` and, if absent (or expired), claim it in the same step
    ///
    /// `start` receives the generation of the new pending entry and must
    /// return the shared export without awaiting anything.
    pub fn lookup_or_claim<F>(&self, key: &CacheKey, ttl: Option<Duration>, start: F) -> Lookup
    where
        F: FnOnce(u64) -> SharedExport,
    {
        let mut entries = self.lock();

        let mut replaced_expired = false;
        match entries.get(key) {
            Some(CacheEntry::Resolved {
                reference,
                resolved_at,
            }) => {
                let expired = ttl.is_some_and(|ttl| resolved_at.elapsed() >= ttl);
                if !expired {
                    return Lookup::Hit(Arc::clone(reference));
                }
                replaced_expired = true;
            }
            Some(CacheEntry::Pending { export, .. }) => {
                return Lookup::InFlight(export.clone());
            }
            None => {}
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let export = start(generation);
        entries.insert(
            key.clone(),
            CacheEntry::Pending {
                generation,
                export: export.clone(),
            },
        );

        Lookup::Claimed {
            export,
            replaced_expired,
        }
    }

    /// Move the pending entry of `generation` to resolved
    pub fn resolve(&self, key: &CacheKey, generation: u64, reference: Arc<ExportReference>) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.generation() == Some(generation) => {
                *entry = CacheEntry::Resolved {
                    reference,
                    resolved_at: Instant::now(),
                };
                true
            }
            _ => false,
        }
    }

    /// Remove the pending entry of `generation` so the key can be retried
    pub fn fail(&self, key: &CacheKey, generation: u64) -> bool {
        let mut entries = self.lock();
        let owned = entries
            .get(key)
            .is_some_and(|entry| entry.generation() == Some(generation));
        if owned {
            entries.remove(key);
        }
        owned
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_pending(&self, key: &CacheKey) -> bool {
        matches!(self.lock().get(key), Some(CacheEntry::Pending { .. }))
    }

    pub fn is_resolved(&self, key: &CacheKey) -> bool {
        matches!(self.lock().get(key), Some(CacheEntry::Resolved { .. }))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheEntry {
    fn generation(&self) -> Option<u64> {
        match self {
            Self::Pending { generation, .. } => Some(*generation),
            Self::Resolved { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ColumnsDefinition, ExportType};
    use futures::FutureExt;

    fn reference(table: &str) -> Arc<ExportReference> {
        Arc::new(ExportReference::new(
            table,
            ExportType::Fake,
            ColumnsDefinition::empty(),
        ))
    }

    fn ready(table: &str) -> SharedExport {
        let reference = reference(table);
        async move { Ok(reference) }.boxed().shared()
    }

    #[test]
    fn test_claim_then_in_flight() {
        let map = EntryMap::new();
        let key = CacheKey::new("events", Utc::now());

        let first = map.lookup_or_claim(&key, None, |_| ready("events"));
        assert!(matches!(first, Lookup::Claimed { replaced_expired: false, .. }));
        assert!(map.is_pending(&key));

        let second = map.lookup_or_claim(&key, None, |_| panic!("must not claim twice"));
        assert!(matches!(second, Lookup::InFlight(_)));
    }

    #[test]
    fn test_resolve_then_hit() {
        let map = EntryMap::new();
        let key = CacheKey::new("events", Utc::now());
        let mut claimed = None;
        map.lookup_or_claim(&key, None, |generation| {
            claimed = Some(generation);
            ready("events")
        });

        let stored = reference("events");
        assert!(map.resolve(&key, claimed.unwrap(), Arc::clone(&stored)));
        assert!(map.is_resolved(&key));

        match map.lookup_or_claim(&key, None, |_| panic!("must not claim resolved key")) {
            Lookup::Hit(found) => assert!(Arc::ptr_eq(&found, &stored)),
            _ => panic!("expected hit"),
        }
    }

    #[test]
    fn test_fail_removes_only_own_generation() {
        let map = EntryMap::new();
        let key = CacheKey::new("events", Utc::now());
        let mut claimed = None;
        map.lookup_or_claim(&key, None, |generation| {
            claimed = Some(generation);
            ready("events")
        });
        let generation = claimed.unwrap();

        assert!(!map.fail(&key, generation + 1));
        assert_eq!(map.len(), 1);
        assert!(map.fail(&key, generation));
        assert_eq!(map.len(), 0);

        // Key can be claimed again
        let retry = map.lookup_or_claim(&key, None, |_| ready("events"));
        assert!(matches!(retry, Lookup::Claimed { .. }));
    }

    #[test]
    fn test_distinct_execution_times_are_distinct_keys() {
        let map = EntryMap::new();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);

        map.lookup_or_claim(&CacheKey::new("events", t1), None, |_| ready("events"));
        let second = map.lookup_or_claim(&CacheKey::new("events", t2), None, |_| ready("events"));
        assert!(matches!(second, Lookup::Claimed { .. }));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_expired_entry_is_reclaimed() {
        let map = EntryMap::new();
        let key = CacheKey::new("events", Utc::now());
        let mut claimed = None;
        map.lookup_or_claim(&key, None, |generation| {
            claimed = Some(generation);
            ready("events")
        });
        map.resolve(&key, claimed.unwrap(), reference("events"));

        let lookup = map.lookup_or_claim(&key, Some(Duration::ZERO), |_| ready("events"));
        assert!(matches!(lookup, Lookup::Claimed { replaced_expired: true, .. }));
        assert!(map.is_pending(&key));
    }
}
