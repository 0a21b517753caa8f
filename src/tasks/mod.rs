//! Background Tasks Module
//!
//! Contains the deferred work tables schedule on the tokio runtime.
//!
//! # Tasks
//! - Sweep timer: runs a table's expiration sweep when its next entry is due

mod sweep;

pub(crate) use sweep::spawn_sweep_timer;
