//! Cache Entry Module
//!
//! Defines a single cached key/value pair with sliding expiration bookkeeping
//! and its own pre-removal callbacks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Callback invoked with an entry's key right before the entry is removed.
pub type KeyCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Mutable part of an entry, guarded by the entry's own lock.
struct AccessState<K> {
    accessed_on: Instant,
    access_count: u64,
    pre_remove: Vec<KeyCallback<K>>,
}

// == Cache Entry ==
/// A single cached value.
///
/// `key`, `value`, `lifespan` and the creation timestamps never change after
/// construction. Access bookkeeping and callbacks sit behind a shared/exclusive
/// lock so lookups on other threads can refresh the entry concurrently.
pub struct CacheEntry<K, V> {
    key: K,
    value: V,
    lifespan: Duration,
    created_on: Instant,
    created_at: DateTime<Utc>,
    state: RwLock<AccessState<K>>,
    retired: AtomicBool,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a new entry accessed "now".
    ///
    /// # Arguments
    /// * `key` - Identity of the entry inside its table
    /// * `value` - The payload, never inspected by the cache
    /// * `lifespan` - Allowed idle time; `Duration::ZERO` never expires
    pub fn new(key: K, value: V, lifespan: Duration) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            lifespan,
            created_on: now,
            created_at: Utc::now(),
            state: RwLock::new(AccessState {
                accessed_on: now,
                access_count: 0,
                pre_remove: Vec::new(),
            }),
            retired: AtomicBool::new(false),
        }
    }

    // == Keep Alive ==
    /// Marks the entry as accessed now, pushing its expiration back by a full lifespan.
    pub fn keep_alive(&self) {
        let mut state = self.state.write();
        state.accessed_on = Instant::now();
        state.access_count += 1;
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn lifespan(&self) -> Duration {
        self.lifespan
    }

    /// Monotonic creation instant.
    pub fn created_on(&self) -> Instant {
        self.created_on
    }

    /// Wall-clock creation time, for display and logging.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn accessed_on(&self) -> Instant {
        self.state.read().accessed_on
    }

    /// Number of successful lookups since insertion.
    pub fn access_count(&self) -> u64 {
        self.state.read().access_count
    }

    // == Remaining ==
    /// Returns the time left before the entry expires, or None if it never expires.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` once the lifespan has elapsed since the last access
    /// - `Some(remaining)` while the entry is still live
    /// - `None` for entries with a zero lifespan
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(Instant::now())
    }

    pub(crate) fn remaining_at(&self, now: Instant) -> Option<Duration> {
        if self.lifespan.is_zero() {
            return None;
        }
        let idle = now.saturating_duration_since(self.accessed_on());
        Some(self.lifespan.saturating_sub(idle))
    }

    // == Pre-Remove Callbacks ==
    /// Replaces every pre-remove callback with `f`.
    pub fn set_pre_remove_callback<F>(&self, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        let mut state = self.state.write();
        state.pre_remove.clear();
        state.pre_remove.push(Arc::new(f));
    }

    /// Appends `f`, keeping previously registered callbacks.
    pub fn add_pre_remove_callback<F>(&self, f: F)
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.state.write().pre_remove.push(Arc::new(f));
    }

    pub fn clear_pre_remove_callbacks(&self) {
        self.state.write().pre_remove.clear();
    }

    pub fn pre_remove_callback_count(&self) -> usize {
        self.state.read().pre_remove.len()
    }

    /// Snapshot of the callbacks, so they run without holding the entry lock.
    pub(crate) fn pre_remove_callbacks(&self) -> Vec<KeyCallback<K>> {
        self.state.read().pre_remove.clone()
    }

    // == Removal Claim ==
    /// Claims the entry for removal. Only the first caller gets `true`.
    pub(crate) fn try_retire(&self) -> bool {
        self.retired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Splits a loader-produced entry back into what an insert needs.
    pub(crate) fn into_parts(self) -> (K, V, Duration) {
        (self.key, self.value, self.lifespan)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("lifespan", &self.lifespan)
            .field("created_at", &self.created_at)
            .field("access_count", &state.access_count)
            .field("pre_remove_callbacks", &state.pre_remove.len())
            .finish()
    }
}
