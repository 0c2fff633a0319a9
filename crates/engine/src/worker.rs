//! Worker pool event loop.
//!
//! Every worker multiplexes over the three work queues plus the shutdown
//! channel. Workers are fungible; whichever is free takes the next item.
//! A panic while handling one item is caught and logged so the pool keeps
//! draining.

use std::any::Any;
use std::future::Future;
use std::io::Read;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use prewarm_common::{join_mount, READ_BUFFER_SIZE};

use crate::engine::PrefetchInner;
use crate::index::FileInfo;

pub(crate) async fn worker_loop(inner: Arc<PrefetchInner>, id: usize) {
    log::info!("prefetch worker({}) started", id);
    let mut scratch: Vec<u8> = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown_rx.recv() => {
                log::info!("prefetch worker({}) stopped", id);
                return;
            }
            msg = inner.index_rx.recv() => match msg {
                Ok(info) => run_guarded(inner.handle_index_load(info), "index load").await,
                Err(_) => return,
            },
            msg = inner.path_rx.recv() => match msg {
                Ok(file) => run_guarded(inner.handle_prefetch(file, &mut scratch), "prefetch").await,
                Err(_) => return,
            },
            msg = inner.download_rx.recv() => match msg {
                Ok(job) => run_guarded(inner.handle_download(job), "download").await,
                Err(_) => return,
            },
        }
    }
}

/// Run one handler, containing any panic to the item being handled.
async fn run_guarded<F>(handler: F, what: &str)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(handler).catch_unwind().await {
        log::error!("{} handler panicked: {}", what, panic_message(panic.as_ref()));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "opaque panic payload"
    }
}

impl PrefetchInner {
    /// Read a file end to end through the OS, discarding the bytes, to warm
    /// the page and block caches underneath the mount.
    pub(crate) async fn handle_prefetch(&self, file: Arc<FileInfo>, scratch: &mut [u8]) {
        let abs_path: String = if file.is_absolute() {
            file.path().to_string()
        } else {
            join_mount(&self.options.mount_point, file.path())
        };
        let start: std::time::Instant = std::time::Instant::now();
        if let Err(err) = read_through(&abs_path, scratch) {
            log::warn!(
                "prefetch ino({}) path({}) failed: {}",
                file.inode(),
                abs_path,
                err
            );
            return;
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "prefetched ino({}) path({}) in {:?}, queue({})",
                file.inode(),
                abs_path,
                start.elapsed(),
                self.path_rx.len()
            );
        }
    }
}

fn read_through(path: &str, scratch: &mut [u8]) -> std::io::Result<()> {
    let mut file: std::fs::File = std::fs::File::open(path)?;
    loop {
        if file.read(scratch)? == 0 {
            return Ok(());
        }
    }
}
