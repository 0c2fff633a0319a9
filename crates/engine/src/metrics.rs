//! Read counters published by the janitor.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide read counters for one engine instance.
///
/// `total` counts every read observed on the mount, `app` the subset that
/// missed the warmed caches and reached the backend on behalf of the
/// application. The janitor swaps both to zero each time it publishes, so
/// each published pair covers one interval.
pub(crate) struct ReadMetrics {
    total: AtomicU64,
    app: AtomicU64,
}

impl ReadMetrics {
    pub(crate) fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            app: AtomicU64::new(0),
        }
    }

    pub(crate) fn add_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_app(&self) {
        self.app.fetch_add(1, Ordering::Relaxed);
    }

    /// Take and reset both counters.
    pub(crate) fn take(&self) -> (u64, u64) {
        let total: u64 = self.total.swap(0, Ordering::AcqRel);
        let app: u64 = self.app.swap(0, Ordering::AcqRel);
        (total, app)
    }
}

/// Cache hit rate for one published interval, in percent.
///
/// An idle interval counts as fully hit.
pub(crate) fn hit_percent(total: u64, app: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (total.saturating_sub(app)) as f64 / total as f64 * 100.0
}
