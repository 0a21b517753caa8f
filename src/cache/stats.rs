//! Cache Statistics Module
//!
//! Tracks per-table lookup, loader and removal counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of a table's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found the key
    pub hits: u64,
    /// Lookups that did not find the key
    pub misses: u64,
    /// Misses resolved by the loader
    pub loads: u64,
    /// Misses where the loader produced nothing
    pub load_failures: u64,
    /// Entries removed by the expiration sweep
    pub expirations: u64,
    /// Entries removed by an explicit delete
    pub deletions: u64,
    /// Current number of entries in the table
    pub total_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the lookup hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counter ==
/// Lock-free counters updated from shared-lock paths such as lookups.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    expirations: AtomicU64,
    deletions: AtomicU64,
}

impl StatsCounter {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deletion(&self) {
        self.deletions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            total_entries,
        }
    }
}
