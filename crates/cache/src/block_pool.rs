//! Size-classed buffer pool for content staging.
//!
//! Download and prefetch handlers need short-lived byte buffers whose sizes
//! track file sizes. The pool keeps free lists per power-of-two size class
//! so steady-state traffic recycles buffers instead of allocating.
//!
//! Buffers move by value: a released buffer is owned by the pool again, so a
//! double release is unrepresentable. Requests larger than the biggest class
//! fall through to a plain allocation and are dropped on release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Smallest size class (4 KiB).
const MIN_CLASS_SIZE: usize = 4 * 1024;

/// Number of size classes; the largest is `MIN_CLASS_SIZE << 15` = 128 MiB.
const CLASS_COUNT: usize = 16;

/// Free buffers retained per class.
const MAX_FREE_PER_CLASS: usize = 64;

/// Thread-safe pool of byte buffers grouped into power-of-two size classes.
pub struct BlockPool {
    classes: Vec<Mutex<Vec<Vec<u8>>>>,
    recycled: AtomicU64,
    allocated: AtomicU64,
}

/// Counters describing pool effectiveness.
#[derive(Debug, Clone, Copy)]
pub struct BlockPoolStats {
    /// Acquires served from a free list.
    pub recycled: u64,
    /// Acquires that allocated a fresh buffer.
    pub allocated: u64,
}

impl BlockPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        let classes: Vec<Mutex<Vec<Vec<u8>>>> =
            (0..CLASS_COUNT).map(|_| Mutex::new(Vec::new())).collect();
        Self {
            classes,
            recycled: AtomicU64::new(0),
            allocated: AtomicU64::new(0),
        }
    }

    /// Acquire a buffer with capacity at least `min_bytes`.
    ///
    /// The returned buffer is empty (`len == 0`); callers size it to actual
    /// use. Capacity is the requested size rounded up to its size class.
    ///
    /// # Arguments
    /// * `min_bytes` - Minimum required capacity
    pub fn acquire(&self, min_bytes: usize) -> Vec<u8> {
        if min_bytes == 0 {
            return Vec::new();
        }
        let Some(class) = class_index(min_bytes) else {
            // Oversize request; not pooled.
            self.allocated.fetch_add(1, Ordering::Relaxed);
            return Vec::with_capacity(min_bytes);
        };

        let mut free: std::sync::MutexGuard<'_, Vec<Vec<u8>>> =
            self.classes[class].lock().unwrap();
        if let Some(buf) = free.pop() {
            self.recycled.fetch_add(1, Ordering::Relaxed);
            return buf;
        }
        drop(free);

        self.allocated.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(class_size(class))
    }

    /// Return a buffer to its size class.
    ///
    /// Buffers with zero capacity, foreign capacities, or belonging to a
    /// full free list are dropped.
    ///
    /// # Arguments
    /// * `buf` - Buffer previously obtained from `acquire`
    pub fn release(&self, mut buf: Vec<u8>) {
        let capacity: usize = buf.capacity();
        if capacity == 0 {
            return;
        }
        let Some(class) = class_index(capacity) else {
            return;
        };
        if class_size(class) != capacity {
            return;
        }

        buf.clear();
        let mut free: std::sync::MutexGuard<'_, Vec<Vec<u8>>> =
            self.classes[class].lock().unwrap();
        if free.len() < MAX_FREE_PER_CLASS {
            free.push(buf);
        }
    }

    /// Current pool counters.
    pub fn stats(&self) -> BlockPoolStats {
        BlockPoolStats {
            recycled: self.recycled.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
        }
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Size class index for a byte count, or None when it exceeds every class.
fn class_index(bytes: usize) -> Option<usize> {
    let mut size: usize = MIN_CLASS_SIZE;
    for class in 0..CLASS_COUNT {
        if bytes <= size {
            return Some(class);
        }
        size <<= 1;
    }
    None
}

/// Capacity of the given size class.
fn class_size(class: usize) -> usize {
    MIN_CLASS_SIZE << class
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_rounds_up_to_class() {
        let pool: BlockPool = BlockPool::new();

        let buf: Vec<u8> = pool.acquire(1);
        assert_eq!(buf.capacity(), MIN_CLASS_SIZE);

        let buf: Vec<u8> = pool.acquire(MIN_CLASS_SIZE + 1);
        assert_eq!(buf.capacity(), MIN_CLASS_SIZE * 2);
    }

    #[test]
    fn test_acquire_zero_is_empty() {
        let pool: BlockPool = BlockPool::new();
        let buf: Vec<u8> = pool.acquire(0);
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn test_release_recycles() {
        let pool: BlockPool = BlockPool::new();

        let mut buf: Vec<u8> = pool.acquire(100);
        buf.extend_from_slice(b"stale");
        pool.release(buf);

        let again: Vec<u8> = pool.acquire(100);
        assert!(again.is_empty());
        assert_eq!(again.capacity(), MIN_CLASS_SIZE);

        let stats: BlockPoolStats = pool.stats();
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.allocated, 1);
    }

    #[test]
    fn test_release_zero_capacity_is_noop() {
        let pool: BlockPool = BlockPool::new();
        pool.release(Vec::new());
        assert_eq!(pool.stats().recycled, 0);
    }

    #[test]
    fn test_oversize_not_pooled() {
        let pool: BlockPool = BlockPool::new();
        let oversize: usize = (MIN_CLASS_SIZE << CLASS_COUNT) + 1;

        let buf: Vec<u8> = pool.acquire(oversize);
        assert!(buf.capacity() >= oversize);
        pool.release(buf);

        let buf: Vec<u8> = pool.acquire(oversize);
        assert!(buf.capacity() >= oversize);
        assert_eq!(pool.stats().recycled, 0);
    }

    #[test]
    fn test_foreign_capacity_dropped() {
        let pool: BlockPool = BlockPool::new();
        // Capacity does not match any class size exactly.
        pool.release(Vec::with_capacity(MIN_CLASS_SIZE + 7));
        let buf: Vec<u8> = pool.acquire(MIN_CLASS_SIZE + 7);
        assert_eq!(pool.stats().recycled, 0);
        assert_eq!(buf.capacity(), MIN_CLASS_SIZE * 2);
    }

    #[test]
    fn test_class_index_bounds() {
        assert_eq!(class_index(1), Some(0));
        assert_eq!(class_index(MIN_CLASS_SIZE), Some(0));
        assert_eq!(class_index(MIN_CLASS_SIZE + 1), Some(1));
        assert_eq!(class_index(MIN_CLASS_SIZE << (CLASS_COUNT - 1)), Some(CLASS_COUNT - 1));
        assert_eq!(class_index((MIN_CLASS_SIZE << (CLASS_COUNT - 1)) + 1), None);
    }
}
