//! Counter for outstanding batch work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Async counterpart of a wait group: `add` registers work, dropping the
/// returned guard completes it, `wait` resolves once the count reaches zero.
///
/// The guard ties completion to ownership, so a job decrements exactly once
/// whether it finishes, fails, panics mid-handler, or is discarded during
/// shutdown drain.
pub struct WaitGroup {
    count: AtomicUsize,
    drained: Notify,
}

impl WaitGroup {
    /// Create a wait group with no outstanding work.
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Register one unit of work on the given group.
    pub fn add(wg: &Arc<WaitGroup>) -> WaitGroupGuard {
        wg.count.fetch_add(1, Ordering::AcqRel);
        WaitGroupGuard { wg: wg.clone() }
    }

    /// Outstanding work count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Wait until every registered unit of work has completed.
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle for one unit of work.
pub struct WaitGroupGuard {
    wg: Arc<WaitGroup>,
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        self.wg.done();
    }
}
