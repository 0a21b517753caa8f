//! Configuration Module
//!
//! Handles loading cache table settings from environment variables.

use std::env;
use std::time::Duration;

/// Settings shared by every table a registry creates.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Lifespan applied by `insert_default`; zero means entries never expire by time
    pub default_lifespan: Duration,
    /// Whether panics raised by callbacks or loaders are logged and swallowed
    /// instead of being resumed on the invoking thread
    pub contain_callback_panics: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_LIFESPAN_MS` - Default lifespan in milliseconds (default: 0)
    /// - `CACHE_CONTAIN_CALLBACK_PANICS` - Contain callback panics (default: true)
    pub fn from_env() -> Self {
        Self {
            default_lifespan: env::var("CACHE_DEFAULT_LIFESPAN_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::ZERO),
            contain_callback_panics: env::var("CACHE_CONTAIN_CALLBACK_PANICS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_lifespan: Duration::ZERO,
            contain_callback_panics: true,
        }
    }
}
