//! TTL-scoped dentry cache mapping child names to inode ids.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use prewarm_common::epoch_seconds;

/// Concurrent map from child name to inode id with an absolute expiry.
///
/// Workers populate the cache while resolving index members and the mount's
/// lookup path reads it; the janitor checks expiry. All operations are safe
/// under concurrent access.
///
/// Names stored in the cache are owned `String`s, independent of whatever
/// buffer the caller parsed them from.
pub struct DentryCache {
    entries: RwLock<HashMap<String, u64>>,
    /// Absolute expiry, Unix epoch seconds.
    expires_at: AtomicI64,
    /// Validity most recently applied, in seconds.
    valid_secs: AtomicI64,
}

impl DentryCache {
    /// Create a cache expiring `valid` from now.
    pub fn new(valid: Duration) -> Self {
        let valid_secs: i64 = valid.as_secs() as i64;
        Self {
            entries: RwLock::new(HashMap::new()),
            expires_at: AtomicI64::new(epoch_seconds() + valid_secs),
            valid_secs: AtomicI64::new(valid_secs),
        }
    }

    /// Insert or replace a child entry.
    pub fn put(&self, name: impl Into<String>, inode: u64) {
        self.entries.write().unwrap().insert(name.into(), inode);
    }

    /// Look up a child by name.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.entries.read().unwrap().get(name).copied()
    }

    /// Number of entries currently cached.
    pub fn count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Absolute expiry in Unix epoch seconds.
    pub fn expiration(&self) -> i64 {
        self.expires_at.load(Ordering::Acquire)
    }

    /// Validity most recently applied to this cache.
    pub fn valid_duration(&self) -> Duration {
        Duration::from_secs(self.valid_secs.load(Ordering::Acquire).max(0) as u64)
    }

    /// Check expiry against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(epoch_seconds())
    }

    /// Check expiry against a caller-supplied clock reading.
    ///
    /// # Arguments
    /// * `now` - Current time in epoch seconds
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at.load(Ordering::Acquire)
    }

    /// Move the expiry to `valid` from now.
    ///
    /// # Arguments
    /// * `valid` - New validity window
    pub fn reset_expiration(&self, valid: Duration) {
        let valid_secs: i64 = valid.as_secs() as i64;
        self.valid_secs.store(valid_secs, Ordering::Release);
        self.expires_at
            .store(epoch_seconds() + valid_secs, Ordering::Release);
    }
}

impl std::fmt::Debug for DentryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DentryCache")
            .field("count", &self.count())
            .field("expires_at", &self.expiration())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache: DentryCache = DentryCache::new(Duration::from_secs(60));
        cache.put("f1", 101);
        cache.put("f2", 102);

        assert_eq!(cache.get("f1"), Some(101));
        assert_eq!(cache.get("f2"), Some(102));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.count(), 2);
    }

    #[test]
    fn test_put_replaces() {
        let cache: DentryCache = DentryCache::new(Duration::from_secs(60));
        cache.put("f1", 101);
        cache.put("f1", 201);

        assert_eq!(cache.get("f1"), Some(201));
        assert_eq!(cache.count(), 1);
    }

    #[test]
    fn test_expiry() {
        let cache: DentryCache = DentryCache::new(Duration::from_secs(60));
        let expiry: i64 = cache.expiration();

        assert!(!cache.is_expired_at(expiry - 1));
        assert!(cache.is_expired_at(expiry));
        assert!(cache.is_expired_at(expiry + 1));
    }

    #[test]
    fn test_zero_validity_expires_immediately() {
        let cache: DentryCache = DentryCache::new(Duration::ZERO);
        assert!(cache.is_expired());
    }

    #[test]
    fn test_reset_expiration() {
        let cache: DentryCache = DentryCache::new(Duration::ZERO);
        assert!(cache.is_expired());

        cache.reset_expiration(Duration::from_secs(600));
        assert!(!cache.is_expired());
        assert_eq!(cache.valid_duration(), Duration::from_secs(600));
        assert!(cache.expiration() >= epoch_seconds() + 599);
    }

    #[test]
    fn test_entries_survive_reset() {
        let cache: DentryCache = DentryCache::new(Duration::from_secs(60));
        cache.put("f1", 101);
        cache.reset_expiration(Duration::from_secs(120));
        assert_eq!(cache.get("f1"), Some(101));
    }
}
