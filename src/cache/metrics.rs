/// Export cache metrics
///
/// Tracks how requests for cache keys were satisfied:
/// - Hits (resolved entry reused)
/// - Joins (waited on another caller's in-flight export)
/// - Misses (claimed the key and ran the export)
/// - Export outcomes and TTL expirations
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    requests_total: AtomicU64,
    hits_total: AtomicU64,
    joins_total: AtomicU64,
    misses_total: AtomicU64,
    exports_succeeded: AtomicU64,
    exports_failed: AtomicU64,
    expirations_total: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.hits_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_join(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.joins_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.misses_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self, succeeded: bool) {
        if succeeded {
            self.exports_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.exports_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_expiration(&self) {
        self.expirations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn hits_total(&self) -> u64 {
        self.hits_total.load(Ordering::Relaxed)
    }

    pub fn joins_total(&self) -> u64 {
        self.joins_total.load(Ordering::Relaxed)
    }

    pub fn misses_total(&self) -> u64 {
        self.misses_total.load(Ordering::Relaxed)
    }

    /// Share of requests served without starting a new export (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.requests_total();
        if total == 0 {
            0.0
        } else {
            (self.hits_total() + self.joins_total()) as f64 / total as f64
        }
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            requests_total: self.requests_total(),
            hits_total: self.hits_total(),
            joins_total: self.joins_total(),
            misses_total: self.misses_total(),
            exports_succeeded: self.exports_succeeded.load(Ordering::Relaxed),
            exports_failed: self.exports_failed.load(Ordering::Relaxed),
            expirations_total: self.expirations_total.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Point-in-time copy of [`CacheMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub requests_total: u64,
    pub hits_total: u64,
    pub joins_total: u64,
    pub misses_total: u64,
    pub exports_succeeded: u64,
    pub exports_failed: u64,
    pub expirations_total: u64,
    pub hit_rate: f64,
}
