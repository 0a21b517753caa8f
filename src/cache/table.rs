//! Cache Table Module
//!
//! A named map of expiring entries with lifecycle callbacks, an on-miss
//! loader, and a self-rescheduling expiration sweep.
//!
//! # Locking
//! The table lock guards the map, the sweep timer, the callback lists and the
//! loader. It is always released before a callback or the loader runs, so
//! callbacks may call back into the table. They observe the table as it was
//! when the lock was released, which may already have changed again.

use std::any::Any;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockWriteGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::cache::stats::StatsCounter;
use crate::cache::{CacheEntry, CacheStats};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_sweep_timer;

/// Table-level callback receiving the entry being inserted or removed.
pub type EntryCallback<K, V> = Arc<dyn Fn(&CacheEntry<K, V>) + Send + Sync>;

/// Produces an entry for a key that missed. Extra lookup arguments are passed through untouched.
pub type Loader<K, V> = Arc<dyn Fn(&K, &[&dyn Any]) -> Option<CacheEntry<K, V>> + Send + Sync>;

type PanicPayload = Box<dyn Any + Send>;

struct TableInner<K, V> {
    items: HashMap<K, Arc<CacheEntry<K, V>>>,
    /// At most one pending sweep deadline
    cleanup_timer: Option<JoinHandle<()>>,
    /// Delay the pending deadline was armed with; zero when idle
    cleanup_interval: Duration,
    loader: Option<Loader<K, V>>,
    on_insert: Vec<EntryCallback<K, V>>,
    on_pre_delete: Vec<EntryCallback<K, V>>,
}

impl<K, V> TableInner<K, V> {
    fn new() -> Self {
        Self {
            items: HashMap::new(),
            cleanup_timer: None,
            cleanup_interval: Duration::ZERO,
            loader: None,
            on_insert: Vec::new(),
            on_pre_delete: Vec::new(),
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.cleanup_timer.take() {
            timer.abort();
        }
    }
}

// == Cache Table ==
/// A named collection of entries that expire after a period without access.
///
/// Tables always live behind an `Arc`; the pending sweep only holds a weak
/// reference, so dropping the last handle to a table ends its schedule.
pub struct CacheTable<K, V> {
    name: String,
    config: Config,
    runtime: Handle,
    inner: RwLock<TableInner<K, V>>,
    stats: StatsCounter,
    this: Weak<Self>,
}

impl<K, V> CacheTable<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates an empty table whose sweeps are scheduled on `runtime`.
    pub fn new(name: impl Into<String>, config: Config, runtime: Handle) -> Arc<Self> {
        let name = name.into();
        info!(table = %name, "Creating cache table");
        Arc::new_cyclic(|this| Self {
            name,
            config,
            runtime,
            inner: RwLock::new(TableInner::new()),
            stats: StatsCounter::default(),
            this: this.clone(),
        })
    }

    /// Creates an empty table on the runtime of the calling context.
    ///
    /// Fails with `NoRuntime` when called outside a tokio runtime.
    pub fn with_current_runtime(name: impl Into<String>, config: Config) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Ok(Self::new(name, config, runtime))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // == Insert ==
    /// Stores `value` under `key`, silently replacing any existing entry.
    ///
    /// On-insert callbacks run after the table lock is released. A finite
    /// lifespan shorter than the current sweep schedule triggers a sweep so
    /// the schedule tightens to the new entry.
    pub fn insert(&self, key: K, lifespan: Duration, value: V) -> Arc<CacheEntry<K, V>> {
        let entry = Arc::new(CacheEntry::new(key, value, lifespan));
        let inner = self.inner.write();
        self.insert_locked(inner, entry)
    }

    /// Inserts with the configured default lifespan.
    pub fn insert_default(&self, key: K, value: V) -> Arc<CacheEntry<K, V>> {
        self.insert(key, self.config.default_lifespan, value)
    }

    // == Insert If Absent ==
    /// Inserts only if `key` is not present. Returns whether the insert happened.
    ///
    /// The presence check and the insert share one critical section, so among
    /// concurrent callers for the same key exactly one wins.
    pub fn insert_if_absent(&self, key: K, lifespan: Duration, value: V) -> bool {
        let inner = self.inner.write();
        if inner.items.contains_key(&key) {
            return false;
        }
        let entry = Arc::new(CacheEntry::new(key, value, lifespan));
        self.insert_locked(inner, entry);
        true
    }

    fn insert_locked(
        &self,
        mut inner: RwLockWriteGuard<'_, TableInner<K, V>>,
        entry: Arc<CacheEntry<K, V>>,
    ) -> Arc<CacheEntry<K, V>> {
        inner.items.insert(entry.key().clone(), Arc::clone(&entry));
        let scheduled = inner.cleanup_interval;
        let callbacks = inner.on_insert.clone();
        drop(inner);

        trace!(table = %self.name, lifespan = ?entry.lifespan(), "Inserted entry");
        let panic = self.run_entry_callbacks("on-insert", &callbacks, &entry);

        let lifespan = entry.lifespan();
        if !lifespan.is_zero() && (scheduled.is_zero() || lifespan < scheduled) {
            self.expiration_check();
        }

        self.settle(panic);
        entry
    }

    // == Delete ==
    /// Removes the entry for `key`.
    ///
    /// Table pre-delete callbacks run first, then the entry's own pre-remove
    /// callbacks; the entry leaves the map only once they have all returned.
    /// Fails with `NotFound` if the key is absent or already being removed.
    pub fn delete<Q>(&self, key: &Q) -> Result<Arc<CacheEntry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (entry, callbacks) = {
            let inner = self.inner.read();
            let entry = match inner.items.get(key) {
                Some(entry) if entry.try_retire() => Arc::clone(entry),
                _ => return Err(CacheError::not_found(&self.name)),
            };
            (entry, inner.on_pre_delete.clone())
        };

        let (removed, panic) = self.remove_retired(&entry, &callbacks);
        if removed {
            self.stats.record_deletion();
        }
        debug!(table = %self.name, "Deleted entry");

        self.settle(panic);
        Ok(entry)
    }

    /// Fires removal callbacks for a claimed entry, then drops it from the map.
    ///
    /// Returns whether the entry was still mapped and got dropped, along with
    /// the first callback panic.
    fn remove_retired(
        &self,
        entry: &Arc<CacheEntry<K, V>>,
        callbacks: &[EntryCallback<K, V>],
    ) -> (bool, Option<PanicPayload>) {
        let mut first_panic = self.run_entry_callbacks("pre-delete", callbacks, entry);
        for callback in entry.pre_remove_callbacks() {
            if let Err(payload) = self.guarded("pre-remove", || callback(entry.key())) {
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }

        // The key may have been overwritten or flushed while callbacks ran
        let mut inner = self.inner.write();
        let still_mapped = inner
            .items
            .get(entry.key())
            .is_some_and(|current| Arc::ptr_eq(current, entry));
        if still_mapped {
            inner.items.remove(entry.key());
        }
        (still_mapped, first_panic)
    }

    // == Exists ==
    pub fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().items.contains_key(key)
    }

    // == Lookup ==
    /// Returns the entry for `key`, refreshing its sliding expiration.
    ///
    /// On a miss the loader, if any, is asked for an entry, which is then
    /// inserted like any other (on-insert callbacks fire).
    pub fn lookup<Q>(&self, key: &Q) -> Result<Arc<CacheEntry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        self.lookup_with(key, &[])
    }

    /// Like [`lookup`](Self::lookup), passing `args` through to the loader on a miss.
    ///
    /// # Errors
    /// - `NotFound` if the key is absent and no loader is configured
    /// - `LoaderFailed` if the loader returned nothing or panicked
    pub fn lookup_with<Q>(&self, key: &Q, args: &[&dyn Any]) -> Result<Arc<CacheEntry<K, V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let (found, loader) = {
            let inner = self.inner.read();
            (inner.items.get(key).cloned(), inner.loader.clone())
        };

        if let Some(entry) = found {
            entry.keep_alive();
            self.stats.record_hit();
            return Ok(entry);
        }
        self.stats.record_miss();

        let Some(loader) = loader else {
            return Err(CacheError::not_found(&self.name));
        };

        // The loader sees an owned key; only misses pay for the conversion
        let owned = key.to_owned();
        match self.guarded("loader", || loader(&owned, args)) {
            Ok(Some(loaded)) => {
                self.stats.record_load();
                let (key, value, lifespan) = loaded.into_parts();
                Ok(self.insert(key, lifespan, value))
            }
            Ok(None) => {
                self.stats.record_load_failure();
                Err(CacheError::loader_failed(&self.name))
            }
            Err(payload) => {
                self.stats.record_load_failure();
                self.settle(Some(payload));
                Err(CacheError::loader_failed(&self.name))
            }
        }
    }

    // == Count ==
    pub fn count(&self) -> usize {
        self.inner.read().items.len()
    }

    // == For Each ==
    /// Visits every entry in unspecified order.
    ///
    /// The table's shared lock is held for the whole traversal, so `f` must
    /// not call back into the table. Entry accessors are fine.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &CacheEntry<K, V>),
    {
        let inner = self.inner.read();
        for (key, entry) in inner.items.iter() {
            f(key, entry);
        }
    }

    // == Flush ==
    /// Drops every entry and cancels the pending sweep. No callbacks fire.
    pub fn flush(&self) {
        let mut inner = self.inner.write();
        inner.items.clear();
        inner.cancel_timer();
        inner.cleanup_interval = Duration::ZERO;
        debug!(table = %self.name, "Flushed table");
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.count())
    }

    /// Delay the pending sweep was armed with, or zero if no sweep is scheduled.
    pub fn cleanup_interval(&self) -> Duration {
        self.inner.read().cleanup_interval
    }

    // == Expiration Sweep ==
    /// Removes every expired entry and re-arms the timer for the next one due.
    ///
    /// Runs automatically from the sweep timer and after inserts that tighten
    /// the schedule; calling it directly forces an early pass.
    pub fn expiration_check(&self) {
        let (expired, callbacks) = {
            let mut inner = self.inner.write();
            inner.cancel_timer();

            let now = Instant::now();
            let mut smallest = Duration::ZERO;
            let mut expired = Vec::new();
            for entry in inner.items.values() {
                if entry.is_retired() {
                    continue;
                }
                let Some(remaining) = entry.remaining_at(now) else {
                    continue;
                };
                if remaining.is_zero() {
                    if entry.try_retire() {
                        expired.push(Arc::clone(entry));
                    }
                } else if smallest.is_zero() || remaining < smallest {
                    smallest = remaining;
                }
            }

            inner.cleanup_interval = smallest;
            if !smallest.is_zero() {
                inner.cleanup_timer = Some(self.arm(smallest));
            }
            (expired, inner.on_pre_delete.clone())
        };

        if !expired.is_empty() {
            debug!(table = %self.name, expired = expired.len(), "Sweep removing expired entries");
        }

        let mut first_panic = None;
        for entry in &expired {
            let (removed, panic) = self.remove_retired(entry, &callbacks);
            if removed {
                self.stats.record_expiration();
            }
            if first_panic.is_none() {
                first_panic = panic;
            }
        }
        self.settle(first_panic);
    }

    fn arm(&self, delay: Duration) -> JoinHandle<()> {
        trace!(table = %self.name, ?delay, "Arming sweep timer");
        let table = self.this.clone();
        spawn_sweep_timer(&self.runtime, self.name.clone(), delay, move || {
            if let Some(table) = table.upgrade() {
                table.expiration_check();
            }
        })
    }

    // == Loader & Callback Configuration ==
    // None of these invoke the callbacks they install.

    pub fn set_loader<F>(&self, f: F)
    where
        F: Fn(&K, &[&dyn Any]) -> Option<CacheEntry<K, V>> + Send + Sync + 'static,
    {
        self.inner.write().loader = Some(Arc::new(f));
    }

    pub fn clear_loader(&self) {
        self.inner.write().loader = None;
    }

    /// Replaces all on-insert callbacks with `f`.
    pub fn set_on_insert<F>(&self, f: F)
    where
        F: Fn(&CacheEntry<K, V>) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        inner.on_insert.clear();
        inner.on_insert.push(Arc::new(f));
    }

    pub fn add_on_insert<F>(&self, f: F)
    where
        F: Fn(&CacheEntry<K, V>) + Send + Sync + 'static,
    {
        self.inner.write().on_insert.push(Arc::new(f));
    }

    pub fn remove_on_insert(&self) {
        self.inner.write().on_insert.clear();
    }

    /// Replaces all pre-delete callbacks with `f`.
    ///
    /// Pre-delete callbacks fire before every removal, whether from `delete`
    /// or from the expiration sweep.
    pub fn set_on_pre_delete<F>(&self, f: F)
    where
        F: Fn(&CacheEntry<K, V>) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        inner.on_pre_delete.clear();
        inner.on_pre_delete.push(Arc::new(f));
    }

    pub fn add_on_pre_delete<F>(&self, f: F)
    where
        F: Fn(&CacheEntry<K, V>) + Send + Sync + 'static,
    {
        self.inner.write().on_pre_delete.push(Arc::new(f));
    }

    pub fn remove_on_pre_delete(&self) {
        self.inner.write().on_pre_delete.clear();
    }

    // == Panic Containment ==

    fn run_entry_callbacks(
        &self,
        label: &str,
        callbacks: &[EntryCallback<K, V>],
        entry: &CacheEntry<K, V>,
    ) -> Option<PanicPayload> {
        let mut first_panic = None;
        for callback in callbacks {
            if let Err(payload) = self.guarded(label, || callback(entry)) {
                if first_panic.is_none() {
                    first_panic = Some(payload);
                }
            }
        }
        first_panic
    }

    fn guarded<R>(&self, label: &str, f: impl FnOnce() -> R) -> std::result::Result<R, PanicPayload> {
        panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
            error!(
                table = %self.name,
                callback = label,
                panic = panic_message(payload.as_ref()),
                "Cache callback panicked"
            );
            payload
        })
    }

    /// Resumes a caught panic unless the table is configured to contain them.
    fn settle(&self, panic: Option<PanicPayload>) {
        if let Some(payload) = panic {
            if !self.config.contain_callback_panics {
                panic::resume_unwind(payload);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

impl<K, V> Drop for CacheTable<K, V> {
    fn drop(&mut self) {
        self.inner.get_mut().cancel_timer();
    }
}

impl<K, V> fmt::Debug for CacheTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CacheTable")
            .field("name", &self.name)
            .field("entries", &inner.items.len())
            .field("cleanup_interval", &inner.cleanup_interval)
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn create_test_table() -> Arc<CacheTable<String, String>> {
        CacheTable::new("test", Config::default(), Handle::current())
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let table = create_test_table();

        let entry = table.insert(key("k1"), Duration::ZERO, "v1".to_string());
        assert_eq!(entry.value(), "v1");
        assert_eq!(table.count(), 1);

        let found = table.lookup(&key("k1")).unwrap();
        assert_eq!(found.value(), "v1");
        assert_eq!(found.access_count(), 1);
        assert!(Arc::ptr_eq(&entry, &found));
    }

    #[tokio::test]
    async fn test_lookup_missing_without_loader() {
        let table = create_test_table();

        let result = table.lookup(&key("nope"));
        assert!(matches!(result, Err(CacheError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_insert_overwrites_silently() {
        let table = create_test_table();
        let deletes = Arc::new(AtomicUsize::new(0));
        let counter = deletes.clone();
        table.set_on_pre_delete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        table.insert(key("k"), Duration::ZERO, "a".to_string());
        table.insert(key("k"), Duration::ZERO, "b".to_string());

        assert_eq!(table.count(), 1);
        assert_eq!(table.lookup(&key("k")).unwrap().value(), "b");
        assert_eq!(deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_runs_callbacks_in_order_before_removal() {
        let table = create_test_table();
        let log = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&table);
        let table_log = log.clone();
        table.set_on_pre_delete(move |entry| {
            let still_there = weak.upgrade().unwrap().exists(entry.key());
            table_log.lock().unwrap().push(format!("table:{}:{}", entry.key(), still_there));
        });

        let entry = table.insert(key("k"), Duration::ZERO, "v".to_string());
        let entry_log = log.clone();
        entry.add_pre_remove_callback(move |k: &String| {
            entry_log.lock().unwrap().push(format!("entry:{}", k));
        });

        let removed = table.delete("k").unwrap();
        assert_eq!(removed.value(), "v");
        assert!(!table.exists("k"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["table:k:true".to_string(), "entry:k".to_string()]
        );
        assert_eq!(table.stats().deletions, 1);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let table = create_test_table();
        assert!(matches!(table.delete("nope"), Err(CacheError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_insert_if_absent() {
        let table = create_test_table();

        assert!(table.insert_if_absent(key("k"), Duration::ZERO, "first".to_string()));
        assert!(!table.insert_if_absent(key("k"), Duration::ZERO, "second".to_string()));
        assert_eq!(table.lookup(&key("k")).unwrap().value(), "first");
    }

    #[tokio::test]
    async fn test_on_insert_set_add_remove() {
        let table = create_test_table();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        table.set_on_insert(move |_| l.lock().unwrap().push("a"));
        let l = log.clone();
        table.add_on_insert(move |_| l.lock().unwrap().push("b"));
        table.insert(key("1"), Duration::ZERO, String::new());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        log.lock().unwrap().clear();
        let l = log.clone();
        table.set_on_insert(move |_| l.lock().unwrap().push("c"));
        table.insert(key("2"), Duration::ZERO, String::new());
        assert_eq!(*log.lock().unwrap(), vec!["c"]);

        log.lock().unwrap().clear();
        table.remove_on_insert();
        table.insert(key("3"), Duration::ZERO, String::new());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_callbacks_may_reenter_table() {
        let table = create_test_table();
        let weak = Arc::downgrade(&table);
        table.set_on_insert(move |entry| {
            let table = weak.upgrade().unwrap();
            if entry.key() == "trigger" {
                table.insert("echo".to_string(), Duration::ZERO, entry.value().clone());
            }
        });

        table.insert(key("trigger"), Duration::ZERO, "v".to_string());
        assert!(table.exists("echo"));
        assert_eq!(table.count(), 2);
    }

    #[tokio::test]
    async fn test_loader_fills_miss() {
        let table = create_test_table();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        table.set_loader(move |k: &String, _args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(CacheEntry::new(k.clone(), format!("loaded:{}", k), Duration::ZERO))
        });

        assert_eq!(table.lookup(&key("missing")).unwrap().value(), "loaded:missing");
        assert_eq!(table.lookup(&key("missing")).unwrap().value(), "loaded:missing");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = table.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_loader_receives_args() {
        let table = create_test_table();
        table.set_loader(|k: &String, args| {
            let suffix = args.first()?.downcast_ref::<&str>()?;
            Some(CacheEntry::new(k.clone(), format!("{}-{}", k, suffix), Duration::ZERO))
        });

        let entry = table.lookup_with(&key("k"), &[&"x"]).unwrap();
        assert_eq!(entry.value(), "k-x");

        let result = table.lookup(&key("other"));
        assert!(matches!(result, Err(CacheError::LoaderFailed { .. })));
        assert_eq!(table.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn test_for_each_visits_all() {
        let table = create_test_table();
        table.insert(key("a"), Duration::ZERO, "1".to_string());
        table.insert(key("b"), Duration::ZERO, "2".to_string());

        let mut seen = Vec::new();
        table.for_each(|k, entry| seen.push(format!("{}={}", k, entry.value())));
        seen.sort();
        assert_eq!(seen, vec!["a=1", "b=2"]);
    }

    #[tokio::test]
    async fn test_insert_arms_and_tightens_schedule() {
        let table = create_test_table();

        table.insert(key("slow"), Duration::from_secs(60), String::new());
        let first = table.cleanup_interval();
        assert!(first > Duration::from_secs(59));

        table.insert(key("fast"), Duration::from_secs(5), String::new());
        let tightened = table.cleanup_interval();
        assert!(tightened <= Duration::from_secs(5));
        assert!(tightened > Duration::from_secs(4));

        // A longer lifespan never loosens an armed schedule on insert
        table.insert(key("slower"), Duration::from_secs(120), String::new());
        assert!(table.cleanup_interval() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_flush_clears_everything() {
        let table = create_test_table();
        table.set_on_pre_delete(|_| panic!("flush must not fire callbacks"));
        table.insert(key("a"), Duration::from_secs(10), String::new());
        table.insert(key("b"), Duration::ZERO, String::new());

        table.flush();
        assert_eq!(table.count(), 0);
        assert_eq!(table.cleanup_interval(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_contained_callback_panic() {
        let table = create_test_table();
        table.set_on_insert(|_| panic!("boom"));
        table.set_loader(|_, _| panic!("loader boom"));

        table.insert(key("k"), Duration::ZERO, "v".to_string());
        assert!(table.exists("k"));

        let result = table.lookup(&key("missing"));
        assert!(matches!(result, Err(CacheError::LoaderFailed { .. })));
    }

    #[tokio::test]
    async fn test_uncontained_callback_panic_still_removes() {
        let config = Config {
            contain_callback_panics: false,
            ..Config::default()
        };
        let table: Arc<CacheTable<String, String>> =
            CacheTable::new("strict", config, Handle::current());
        table.set_on_pre_delete(|_| panic!("boom"));
        table.insert(key("k"), Duration::ZERO, "v".to_string());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| table.delete("k")));
        assert!(outcome.is_err());
        assert!(!table.exists("k"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_uncontained_panic_in_sweep_still_removes_and_rearms() {
        let config = Config {
            contain_callback_panics: false,
            ..Config::default()
        };
        let table: Arc<CacheTable<String, String>> =
            CacheTable::new("strict-sweep", config, Handle::current());
        table.set_on_pre_delete(|_| panic!("boom"));

        table.insert(key("first"), Duration::from_millis(30), "v".to_string());
        table.insert(key("second"), Duration::from_millis(80), "v".to_string());

        // The panic from the first sweep must not stop the second entry expiring
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!table.exists("first"));
        assert!(!table.exists("second"));
        assert_eq!(table.stats().expirations, 2);
        assert_eq!(table.cleanup_interval(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_lookup_by_borrowed_key() {
        let table = create_test_table();
        table.set_loader(|k: &String, _| {
            Some(CacheEntry::new(k.clone(), k.to_uppercase(), Duration::ZERO))
        });
        table.insert(key("present"), Duration::ZERO, "v".to_string());

        assert_eq!(table.lookup("present").unwrap().value(), "v");
        assert_eq!(table.lookup_with("absent", &[]).unwrap().value(), "ABSENT");
        assert!(table.exists("absent"));
    }

    #[tokio::test]
    async fn test_insert_default_uses_config_lifespan() {
        let config = Config {
            default_lifespan: Duration::from_secs(30),
            ..Config::default()
        };
        let table: Arc<CacheTable<String, String>> =
            CacheTable::new("defaults", config, Handle::current());

        let entry = table.insert_default(key("k"), "v".to_string());
        assert_eq!(entry.lifespan(), Duration::from_secs(30));
    }

    #[test]
    fn test_with_current_runtime_requires_runtime() {
        let result = CacheTable::<String, String>::with_current_runtime("t", Config::default());
        assert!(matches!(result, Err(CacheError::NoRuntime)));
    }
}
