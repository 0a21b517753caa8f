//! Sweep Timer
//!
//! One-shot deadline that runs a table's expiration sweep once it elapses.
//! Tables re-arm a fresh timer from inside each sweep, so the schedule always
//! tracks the soonest expiration instead of polling on a fixed tick.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Spawns a task that sleeps for `delay`, then runs `sweep` on the blocking pool.
///
/// The sweep takes blocking locks and runs user callbacks, so it must not run
/// on a runtime worker thread.
///
/// # Arguments
/// * `runtime` - Runtime that owns the timer
/// * `table` - Table name, for logging
/// * `delay` - Time until the sweep should run
/// * `sweep` - The sweep body
///
/// # Returns
/// A JoinHandle whose `abort()` cancels the deadline if it has not fired yet.
pub(crate) fn spawn_sweep_timer<F>(
    runtime: &Handle,
    table: String,
    delay: Duration,
    sweep: F,
) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        trace!(table = %table, "Sweep deadline reached");

        if let Err(err) = tokio::task::spawn_blocking(sweep).await {
            warn!(table = %table, error = %err, "Expiration sweep did not complete");
        }
    })
}
