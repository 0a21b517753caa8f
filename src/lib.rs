//! Expiring Cache - an in-process registry of expiring key-value tables
//!
//! Entries expire once they go unaccessed for longer than their lifespan.
//! Each table sweeps itself on a timer armed for exactly the next expiration.

pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
mod tasks;

pub use cache::{CacheEntry, CacheStats, CacheTable};
pub use config::Config;
pub use error::{CacheError, Result};
pub use registry::Registry;
