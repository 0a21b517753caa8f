//! Table Registry
//!
//! Maps table names to shared tables. A registry is an ordinary value owned by
//! the application; there is no process-wide instance.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::CacheTable;
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Registry of named tables sharing one key/value type, one runtime and one config.
pub struct Registry<K, V> {
    tables: RwLock<HashMap<String, Arc<CacheTable<K, V>>>>,
    runtime: Handle,
    config: Config,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a registry bound to the current tokio runtime with default config.
    ///
    /// Fails with `NoRuntime` when called outside a runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Ok(Self::with_runtime(runtime, Config::default()))
    }

    pub fn with_runtime(runtime: Handle, config: Config) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            runtime,
            config,
        }
    }

    // == Get Or Create ==
    /// Returns the table called `name`, creating it on first use.
    ///
    /// Every call with the same name returns the same table, even when
    /// several threads race to create it.
    pub fn get_or_create(&self, name: &str) -> Arc<CacheTable<K, V>> {
        if let Some(table) = self.tables.read().get(name) {
            return Arc::clone(table);
        }

        // Re-check under the write lock; another thread may have won the race
        let mut tables = self.tables.write();
        let table = tables.entry(name.to_string()).or_insert_with(|| {
            debug!(table = name, "Registering new table");
            CacheTable::new(name, self.config.clone(), self.runtime.clone())
        });
        Arc::clone(table)
    }

    pub fn get(&self, name: &str) -> Option<Arc<CacheTable<K, V>>> {
        self.tables.read().get(name).cloned()
    }

    /// Unregisters a table. Its entries and schedule live on while handles to it remain.
    pub fn remove(&self, name: &str) -> Option<Arc<CacheTable<K, V>>> {
        self.tables.write().remove(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}
