use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for observing cache behavior.
#[derive(Default)]
pub struct CacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub fetches: AtomicU64,
    pub fetch_failures: AtomicU64,
    /// Callers that waited on another caller's in-flight fetch.
    pub deduplicated: AtomicU64,
    pub prefetch_scheduled: AtomicU64,
    pub prefetch_failures: AtomicU64,
    pub evictions: AtomicU64,
    pub bytes_fetched: AtomicU64,
    pub total_fetch_ns: AtomicU64,
}

impl CacheMetrics {
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            prefetch_scheduled: self.prefetch_scheduled.load(Ordering::Relaxed),
            prefetch_failures: self.prefetch_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            total_fetch_ns: self.total_fetch_ns.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub deduplicated: u64,
    pub prefetch_scheduled: u64,
    pub prefetch_failures: u64,
    pub evictions: u64,
    pub bytes_fetched: u64,
    pub total_fetch_ns: u64,
}

impl CacheMetricsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    pub fn mean_fetch_ms(&self) -> f64 {
        let ok = self.fetches.saturating_sub(self.fetch_failures);
        if ok == 0 { 0.0 } else { self.total_fetch_ns as f64 / ok as f64 / 1_000_000.0 }
    }
}
