//! Cache Module
//!
//! Provides named tables of key-value entries with sliding expiration,
//! lifecycle callbacks and on-miss loading.

mod entry;
mod stats;
mod table;


// Re-export public types
pub use entry::{CacheEntry, KeyCallback};
pub use stats::CacheStats;
pub use table::{CacheTable, EntryCallback, Loader};
