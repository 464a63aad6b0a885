//! Background maintenance: evicts idle resources and keeps the pool warm.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::factory::Factory;
use crate::pool::PoolInner;

/// Spawn the reaper task for a pool.
///
/// Runs every `reap_interval` until the pool's shutdown token is
/// cancelled. Each run evicts idle-expired resources (respecting
/// `min_size`) and then tops the pool back up to `min_size`. Failures
/// inside a run are logged and never affect callers.
pub(crate) fn spawn<F: Factory>(inner: Arc<PoolInner<F>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(inner.config.reap_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; consume it so a fresh pool
        // is not scanned at startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = inner.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    inner.reap_idle().await;
                    inner.top_up().await;
                }
            }
        }
        tracing::debug!("reaper stopped");
    })
}
