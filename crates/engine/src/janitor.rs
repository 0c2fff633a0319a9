//! Janitor: expiry sweeps and metric publication.

use std::sync::Arc;
use std::time::Duration;

use prewarm_common::epoch_seconds;
use tokio::time::MissedTickBehavior;

use crate::engine::PrefetchInner;
use crate::metrics::hit_percent;

/// How often read counters are published.
const METRICS_PERIOD: Duration = Duration::from_secs(1);

/// How often expired registry entries and dentry caches are removed.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

pub(crate) async fn janitor_loop(inner: Arc<PrefetchInner>) {
    log::info!("janitor started");
    let mut metrics_tick = tokio::time::interval(METRICS_PERIOD);
    metrics_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sweep_tick = tokio::time::interval(SWEEP_PERIOD);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown_rx.recv() => {
                log::info!("janitor stopped");
                return;
            }
            _ = metrics_tick.tick() => inner.publish_read_metrics(),
            _ = sweep_tick.tick() => inner.sweep_expired(),
        }
    }
}

impl PrefetchInner {
    /// Publish and reset the interval's read counters.
    pub(crate) fn publish_read_metrics(&self) {
        let (total, app) = self.metrics.take();
        log::info!(
            "reads total({}) app({}) cache hit({:.2}%) path queue({}) download queue({})",
            total,
            app,
            hit_percent(total, app),
            self.path_rx.len(),
            self.download_rx.len()
        );
    }

    /// Remove expired index entries and dentry caches.
    ///
    /// Entries registered without a TTL are never removed here.
    pub(crate) fn sweep_expired(&self) {
        let now: i64 = epoch_seconds();
        {
            let mut registry = self.registry.write().unwrap();
            registry.retain(|_, info| {
                let expired: bool = info.is_expired_at(now);
                if expired {
                    log::info!("removed expired {}", info);
                }
                !expired
            });
        }
        self.dcache_map.sweep_expired(now);
        self.lookup_cache.sweep_expired(now);
    }
}
