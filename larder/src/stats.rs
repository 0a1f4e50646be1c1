//! Cache statistics.
//!
//! Lock-free atomic counters recorded by the engine and the request
//! pipeline, copied out as a point-in-time [`StatsSnapshot`] for display.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache effectiveness monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    loader_calls: AtomicU64,
    loader_failures: AtomicU64,
    records_evicted: AtomicU64,
    reclamation_passes: AtomicU64,
}

impl CacheStats {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn loader_call(&self) {
        self.loader_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn loader_failure(&self) {
        self.loader_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, count: u64) {
        self.records_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn reclamation_pass(&self) {
        self.reclamation_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loader_calls: self.loader_calls.load(Ordering::Relaxed),
            loader_failures: self.loader_failures.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
            reclamation_passes: self.reclamation_passes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Reads satisfied by the memory layer.
    pub memory_hits: u64,
    /// Reads satisfied by the disk layer.
    pub disk_hits: u64,
    /// Reads satisfied by neither layer.
    pub misses: u64,
    /// Loader invocations.
    pub loader_calls: u64,
    /// Loader invocations that failed or returned nothing.
    pub loader_failures: u64,
    /// Distinct cache keys removed from either layer by expiry, eviction,
    /// or reclamation.
    pub records_evicted: u64,
    /// Budget reclamation passes run.
    pub reclamation_passes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = CacheStats::new();
        stats.memory_hit();
        stats.memory_hit();
        stats.disk_hit();
        stats.miss();
        stats.loader_call();
        stats.loader_failure();
        stats.evicted(3);
        stats.reclamation_pass();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.memory_hits, 2);
        assert_eq!(snapshot.disk_hits, 1);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.loader_calls, 1);
        assert_eq!(snapshot.loader_failures, 1);
        assert_eq!(snapshot.records_evicted, 3);
        assert_eq!(snapshot.reclamation_passes, 1);
    }

    #[test]
    fn test_default_snapshot_is_zero() {
        assert_eq!(CacheStats::new().snapshot(), StatsSnapshot::default());
    }
}
