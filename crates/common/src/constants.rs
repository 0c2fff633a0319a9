//! Shared constants used across prewarm crates.

use std::time::Duration;

/// Buffer size for index-file parsing and prefetch read-through (128 KiB).
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

/// Default validity for dentry caches populated from index loads and
/// absolute-path lookups.
pub const DEFAULT_DENTRY_TTL: Duration = Duration::from_secs(60 * 60);

/// Validity for the transient directory caches built while a single index
/// load scans its parent directories.
pub const DIR_SCAN_DENTRY_TTL: Duration = Duration::from_secs(30 * 60);

/// Root inode of the mounted filesystem.
pub const ROOT_INODE: u64 = 1;

/// Default number of worker tasks servicing the work queues.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Capacity of the index-load queue.
pub const INDEX_QUEUE_CAPACITY: usize = 1024;

/// Capacity of the prefetch-path and download queues. Effectively unbounded
/// for training workloads; enqueues block once a queue fills.
pub const DATA_QUEUE_CAPACITY: usize = 1_024_000;
