//! Weight-bounded cache of classification results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::{gauge, Gauge};
use moka::sync::Cache;

use crate::error::ParseError;
use crate::meters::names;
use crate::tas::parsed_query::ParsedQuery;

/// A cached classification outcome. Failures are cached too, so a statement
/// the grammar rejects is parsed once, not on every execution.
pub(crate) type CachedParse = Result<Arc<ParsedQuery>, ParseError>;

// Cache weight is the approximate byte footprint of an entry, dominated by
// the SQL text key.
const MIB: u64 = 1_000_000;

/// Parse results keyed by the raw SQL text, bounded by total weight rather
/// than entry count so a few huge generated statements cannot blow up
/// memory while small hot statements stay resident.
pub(crate) struct ParseResultCache {
    cache: Cache<String, CachedParse>,
    hits: AtomicU64,
    misses: AtomicU64,
    size: Gauge,
    hit_count: Gauge,
    hit_ratio: Gauge,
}

impl ParseResultCache {
    pub(crate) fn new(cache_size_mib: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_size_mib * MIB)
            .weigher(|key: &String, value: &CachedParse| {
                let parsed_size = match value {
                    Ok(parsed) => parsed.approximate_size(),
                    Err(_) => 0,
                };
                u32::try_from(2 * key.len() + parsed_size).unwrap_or(u32::MAX)
            })
            .build();
        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            size: gauge!(names::PARSE_CACHE_SIZE),
            hit_count: gauge!(names::PARSE_CACHE_HIT_COUNT),
            hit_ratio: gauge!(names::PARSE_CACHE_HIT_RATIO),
        }
    }

    /// Look up `sql`, classifying it with `load` on a miss. Concurrent
    /// lookups of the same text run `load` once and share the outcome.
    pub(crate) fn get_with(
        &self,
        sql: &str,
        load: impl FnOnce() -> Result<ParsedQuery, ParseError>,
    ) -> CachedParse {
        let mut loaded = false;
        let entry = self.cache.get_with_by_ref(sql, || {
            loaded = true;
            load().map(Arc::new)
        });
        if loaded {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        entry
    }

    /// Push the cache's health onto its gauges.
    pub(crate) fn record_metrics(&self) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        self.size.set(self.cache.entry_count() as f64);
        self.hit_count.set(hits as f64);
        self.hit_ratio.set(if total == 0 {
            1.0
        } else {
            hits as f64 / total as f64
        });
    }

    pub(crate) fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Flush pending internal maintenance so entry counts are exact.
    #[cfg(test)]
    pub(crate) fn sync(&self) {
        self.cache.run_pending_tasks();
    }

    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(table: &str) -> Result<ParsedQuery, ParseError> {
        let mut parsed = ParsedQuery::new();
        parsed.add_table("select", table);
        Ok(parsed)
    }

    #[test]
    fn test_load_runs_once_per_text() {
        let cache = ParseResultCache::new(1);

        let first = cache.get_with("select * from table_a", || classified("table_a"));
        let second = cache.get_with("select * from table_a", || {
            panic!("already cached")
        });

        assert!(Arc::ptr_eq(first.as_ref().unwrap(), second.as_ref().unwrap()));
        assert_eq!(cache.miss_count(), 1);
        assert_eq!(cache.hit_count(), 1);

        cache.sync();
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_failures_are_cached_too() {
        let cache = ParseResultCache::new(1);

        let first = cache.get_with("not sql", || {
            Err(ParseError::WorkersUnavailable)
        });
        assert!(first.is_err());

        let second = cache.get_with("not sql", || panic!("already cached"));
        assert!(second.is_err());
        assert_eq!(cache.hit_count(), 1);
    }

    #[test]
    fn test_weight_bound_evicts() {
        // Room for roughly one small entry only.
        let cache = Cache::builder()
            .max_capacity(64)
            .weigher(|key: &String, _: &CachedParse| (2 * key.len()) as u32)
            .build();

        cache.insert("a".repeat(30), classified("table_a").map(Arc::new));
        cache.insert("b".repeat(30), classified("table_b").map(Arc::new));
        cache.run_pending_tasks();

        assert!(cache.entry_count() < 2);
    }
}
