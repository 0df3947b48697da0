//! Cache counters. Distinct per instance so the analysis and suggestion
//! caches can be compared side by side in diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups answered from a live entry.
    pub hits: AtomicU64,
    /// Lookups with no entry (or an expired one).
    pub misses: AtomicU64,
    /// Entries removed for exceeding the absolute max age.
    pub expirations: AtomicU64,
    /// Entries removed to get back under the entry limit.
    pub evictions: AtomicU64,
    /// Entries removed by explicit invalidation (content change, clear).
    pub invalidations: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheMetrics {
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        if n > 0 {
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetricsSnapshot {
    /// Fraction of lookups served from cache; 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
