//! Bounded result caches for analysis output and model suggestions.
//!
//! Policy per instance:
//! * absolute max age measured from insertion; reading an entry does not
//!   extend its life
//! * max entry count, enforced least-recently-used first
//!
//! Maintenance runs on every `put` (expired entries first, then LRU eviction
//! down to the limit). `get` refreshes recency and lazily rejects an entry
//! that has outlived its max age. Every method has an `_at` twin taking the
//! current instant explicitly so expiry is testable without sleeping.

use lru::LruCache;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::trace;

pub mod keys;
pub mod metrics;

pub use keys::{AnalysisKey, ContentKeyed, StyleTemplate, SuggestionKey};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};

/// Sizing for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_entries: usize,
    pub max_age: Duration,
}

impl CachePolicy {
    pub const fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            max_entries,
            max_age,
        }
    }

    /// Default sizing for analysis results.
    pub const fn analysis() -> Self {
        Self::new(64, Duration::from_secs(300))
    }

    /// Default sizing for suggestion results.
    pub const fn suggestion() -> Self {
        Self::new(32, Duration::from_secs(600))
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
}

pub struct ResultCache<K, V> {
    name: &'static str,
    policy: CachePolicy,
    entries: LruCache<K, Entry<V>>,
    metrics: CacheMetrics,
}

impl<K: Hash + Eq, V> std::fmt::Debug for ResultCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// `name` labels log events (`analysis`, `suggestion`).
    pub fn new(name: &'static str, policy: CachePolicy) -> Self {
        Self {
            name,
            policy,
            entries: LruCache::unbounded(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let max_age = self.policy.max_age;
        let expired = match self.entries.peek(key) {
            None => {
                CacheMetrics::add(&self.metrics.misses, 1);
                return None;
            }
            Some(entry) => is_expired(entry, now, max_age),
        };
        if expired {
            self.entries.pop(key);
            CacheMetrics::add(&self.metrics.expirations, 1);
            CacheMetrics::add(&self.metrics.misses, 1);
            trace!(target: "cache", cache = self.name, "entry_expired_on_read");
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        CacheMetrics::add(&self.metrics.hits, 1);
        Some(entry.value.clone())
    }

    /// Look without touching recency or metrics.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key).map(|e| &e.value)
    }

    pub fn put(&mut self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    pub fn put_at(&mut self, key: K, value: V, now: Instant) {
        self.entries.put(
            key,
            Entry {
                value,
                inserted_at: now,
                last_accessed: now,
            },
        );
        let expired = self.purge_expired_at(now);
        let mut evicted = 0usize;
        while self.entries.len() > self.policy.max_entries {
            if self.entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        CacheMetrics::add(&self.metrics.evictions, evicted);
        trace!(
            target: "cache",
            cache = self.name,
            len = self.entries.len(),
            expired,
            evicted,
            "put"
        );
    }

    /// Drop every entry older than the max age. Returns the count removed.
    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let max_age = self.policy.max_age;
        let stale: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| is_expired(e, now, max_age))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &stale {
            self.entries.pop(k);
        }
        CacheMetrics::add(&self.metrics.expirations, stale.len());
        stale.len()
    }

    /// Remove entries whose key matches `pred`. Returns the count removed.
    pub fn invalidate_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let doomed: Vec<K> = self
            .entries
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            self.entries.pop(k);
        }
        CacheMetrics::add(&self.metrics.invalidations, doomed.len());
        if !doomed.is_empty() {
            trace!(target: "cache", cache = self.name, removed = doomed.len(), "invalidate");
        }
        doomed.len()
    }

    /// Remove everything (configuration or profile switch).
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        CacheMetrics::add(&self.metrics.invalidations, n);
        trace!(target: "cache", cache = self.name, removed = n, "clear");
        n
    }

    /// Age of every resident entry at `now`, most recently used first.
    pub fn ages_at(&self, now: Instant) -> Vec<Duration> {
        self.entries
            .iter()
            .map(|(_, e)| now.saturating_duration_since(e.inserted_at))
            .collect()
    }

    /// Keys from most to least recently accessed.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Instant of the most recent access to `key`.
    pub fn last_accessed(&self, key: &K) -> Option<Instant> {
        self.entries.peek(key).map(|e| e.last_accessed)
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone + ContentKeyed,
    V: Clone,
{
    /// Drop every entry derived from content with `hash`.
    pub fn invalidate_content(&mut self, hash: u64) -> usize {
        self.invalidate_where(|k| k.content_hash() == hash)
    }
}

fn is_expired<V>(entry: &Entry<V>, now: Instant, max_age: Duration) -> bool {
    now.saturating_duration_since(entry.inserted_at) > max_age
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cache(max: usize, age_secs: u64) -> ResultCache<&'static str, u32> {
        ResultCache::new("test", CachePolicy::new(max, Duration::from_secs(age_secs)))
    }

    #[test]
    fn third_put_evicts_oldest() {
        let mut c = cache(2, 60);
        let t = Instant::now();
        c.put_at("A", 1, t);
        c.put_at("B", 2, t + Duration::from_millis(1));
        c.put_at("C", 3, t + Duration::from_millis(2));
        assert!(c.peek(&"A").is_none());
        assert_eq!(c.keys_by_recency(), vec!["C", "B"]);
        assert_eq!(c.metrics().evictions, 1);
    }

    #[test]
    fn debug_reports_size_not_contents() {
        let mut c = cache(4, 60);
        c.put_at("A", 1, Instant::now());
        let shown = format!("{c:?}");
        assert!(shown.contains("len: 1"), "{shown}");
        assert!(!shown.contains("\"A\""), "{shown}");
    }

    #[test]
    fn get_refreshes_recency() {
        let mut c = cache(2, 60);
        let t = Instant::now();
        c.put_at("A", 1, t);
        c.put_at("B", 2, t);
        assert_eq!(c.get_at(&"A", t + Duration::from_secs(1)), Some(1));
        assert_eq!(c.last_accessed(&"A"), Some(t + Duration::from_secs(1)));
        c.put_at("C", 3, t + Duration::from_secs(2));
        assert!(c.peek(&"B").is_none());
        assert_eq!(c.peek(&"A"), Some(&1));
    }

    #[test]
    fn expiry_is_absolute_from_insertion() {
        let mut c = cache(8, 10);
        let t = Instant::now();
        c.put_at("A", 1, t);
        assert_eq!(c.get_at(&"A", t + Duration::from_secs(9)), Some(1));
        assert_eq!(c.get_at(&"A", t + Duration::from_secs(11)), None);
        let m = c.metrics();
        assert_eq!((m.hits, m.misses, m.expirations), (1, 1, 1));
    }

    #[test]
    fn put_purges_expired_before_evicting() {
        let mut c = cache(2, 10);
        let t = Instant::now();
        c.put_at("A", 1, t);
        c.put_at("B", 2, t + Duration::from_secs(5));
        c.put_at("C", 3, t + Duration::from_secs(12));
        // A expired, so no LRU eviction was needed.
        assert_eq!(c.keys_by_recency(), vec!["C", "B"]);
        assert_eq!(c.metrics().expirations, 1);
        assert_eq!(c.metrics().evictions, 0);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut c = cache(0, 10);
        c.put("A", 1);
        assert!(c.is_empty());
    }

    #[test]
    fn invalidate_content_hits_only_matching_hash() {
        let mut c: ResultCache<AnalysisKey, u32> = ResultCache::new("analysis", CachePolicy::analysis());
        c.put(AnalysisKey::new(1, "en"), 10);
        c.put(AnalysisKey::new(1, "de"), 11);
        c.put(AnalysisKey::new(2, "en"), 20);
        assert_eq!(c.invalidate_content(1), 2);
        assert_eq!(c.len(), 1);
        assert_eq!(c.clear(), 1);
        assert_eq!(c.metrics().invalidations, 3);
    }
}
