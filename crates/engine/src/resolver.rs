//! Path resolution caches.
//!
//! Three layers with different lifetimes:
//!
//! - `DirScanCache` lives for a single index load. The first member under a
//!   directory pays for one `lookup_path` + `read_dir`, every later sibling
//!   resolves from the scanned dentries.
//! - `IndexDentryMap` is long-lived and keyed by parent inode. It feeds the
//!   mount's lookup fast path via `get_dentry_cache` and expires with its
//!   owning index.
//! - `LookupCache` backs component-wise absolute-path resolution for ad-hoc
//!   downloads outside any index.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use prewarm_cache::DentryCache;
use prewarm_common::{is_under_mount, strip_mount_prefix, DEFAULT_DENTRY_TTL, DIR_SCAN_DENTRY_TTL, ROOT_INODE};

use crate::error::EngineError;
use crate::fs::{Dentry, FsClient};
use crate::index::{IndexDentryInfo, IndexInfo};

/// Result of resolving one child during an index load.
pub(crate) struct ChildLookup {
    /// Inode of the parent directory.
    pub parent_ino: u64,
    /// Child inode, None when the name is absent from the directory.
    pub inode: Option<u64>,
}

/// Transient per-load cache of scanned directories.
///
/// Maps directory path to its inode and a dentry cache holding every child
/// returned by `read_dir`. Names are copied into owned strings before they
/// enter the cache.
pub(crate) struct DirScanCache {
    dirs: HashMap<String, DirScanEntry>,
}

struct DirScanEntry {
    parent_ino: u64,
    dcache: DentryCache,
}

impl DirScanCache {
    pub(crate) fn new() -> Self {
        Self {
            dirs: HashMap::new(),
        }
    }

    /// Resolve one child name, scanning the directory on first touch.
    ///
    /// # Arguments
    /// * `fs` - Filesystem client
    /// * `dir_path` - Directory path, trailing slash included
    /// * `name` - Child name to resolve
    pub(crate) async fn resolve_child(
        &mut self,
        fs: &dyn FsClient,
        dir_path: &str,
        name: &str,
    ) -> Result<ChildLookup, EngineError> {
        if !self.dirs.contains_key(dir_path) {
            let parent_ino: u64 = fs.lookup_path(dir_path).await?;
            let children: Vec<Dentry> = fs.read_dir(parent_ino).await?;
            let dcache: DentryCache = DentryCache::new(DIR_SCAN_DENTRY_TTL);
            for child in children {
                dcache.put(child.name, child.inode);
            }
            if log::log_enabled!(log::Level::Debug) {
                log::debug!(
                    "scanned dir({}) ino({}) children({})",
                    dir_path,
                    parent_ino,
                    dcache.count()
                );
            }
            self.dirs
                .insert(dir_path.to_string(), DirScanEntry { parent_ino, dcache });
        }

        let entry: &DirScanEntry = &self.dirs[dir_path];
        Ok(ChildLookup {
            parent_ino: entry.parent_ino,
            inode: entry.dcache.get(name),
        })
    }
}

/// Long-lived dentry caches owned by index entries, keyed by parent inode.
pub(crate) struct IndexDentryMap {
    inner: RwLock<HashMap<u64, Arc<IndexDentryInfo>>>,
}

impl IndexDentryMap {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Cache for a parent inode, unless expired.
    ///
    /// An expired entry is removed on read so callers never observe one.
    pub(crate) fn get(&self, parent_ino: u64) -> Option<Arc<DentryCache>> {
        let cached: Option<Arc<IndexDentryInfo>> =
            self.inner.read().unwrap().get(&parent_ino).cloned();
        let info: Arc<IndexDentryInfo> = cached?;
        if !info.dcache().is_expired() {
            return Some(info.dcache().clone());
        }
        self.inner.write().unwrap().remove(&parent_ino);
        None
    }

    /// Record one resolved child under its parent directory.
    ///
    /// The per-parent cache is created on first touch with the owning
    /// index's validity.
    pub(crate) fn record_child(&self, parent_ino: u64, name: &str, ino: u64, index: &IndexInfo) {
        let info: Arc<IndexDentryInfo> = {
            let mut map = self.inner.write().unwrap();
            map.entry(parent_ino)
                .or_insert_with(|| {
                    Arc::new(IndexDentryInfo::new(index.path(), index.dentry_validity()))
                })
                .clone()
        };
        info.dcache().put(name.to_string(), ino);
    }

    /// Reset expiry on every cache owned by the given index.
    ///
    /// # Arguments
    /// * `index_path` - Owning index file path
    /// * `valid` - New validity window
    pub(crate) fn reset_for_index(&self, index_path: &str, valid: Duration) {
        let map = self.inner.read().unwrap();
        for (parent_ino, info) in map.iter() {
            if info.index_path() == index_path {
                info.dcache().reset_expiration(valid);
                log::info!("reset dcache parent({}) valid({:?})", parent_ino, valid);
            }
        }
    }

    /// Remove every expired cache.
    pub(crate) fn sweep_expired(&self, now: i64) {
        let mut map = self.inner.write().unwrap();
        map.retain(|parent_ino, info| {
            let expired: bool = info.dcache().is_expired_at(now);
            if expired {
                log::info!("removed expired dcache parent({})", parent_ino);
            }
            !expired
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}

/// Per-parent dentry caches for absolute-path resolution.
pub(crate) struct LookupCache {
    inner: RwLock<HashMap<u64, Arc<DentryCache>>>,
}

impl LookupCache {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve an absolute path to its inode, walking component by
    /// component from the root.
    ///
    /// Intermediate components are answered from (and recorded into) the
    /// per-parent caches; the final component always goes to the
    /// filesystem, so leaf files never enter a cache whose TTL was chosen
    /// for directories.
    ///
    /// # Arguments
    /// * `fs` - Filesystem client
    /// * `mount_point` - Mount prefix the path must carry
    /// * `abs_path` - Absolute path to resolve
    pub(crate) async fn resolve_absolute(
        &self,
        fs: &dyn FsClient,
        mount_point: &str,
        abs_path: &str,
    ) -> Result<u64, EngineError> {
        if !is_under_mount(abs_path, mount_point) {
            return Err(EngineError::OutsideMount {
                path: abs_path.to_string(),
            });
        }
        let relative: String = strip_mount_prefix(abs_path, mount_point);
        let components: Vec<&str> = relative.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Err(EngineError::OutsideMount {
                path: abs_path.to_string(),
            });
        }

        let mut ino: u64 = ROOT_INODE;
        let last: usize = components.len() - 1;
        for (idx, component) in components.iter().enumerate() {
            let dcache: Arc<DentryCache> = self.cache_for(ino);
            if let Some(child) = dcache.get(component) {
                ino = child;
                continue;
            }
            let child: u64 = fs.lookup(ino, component).await?;
            if idx != last {
                dcache.put(component.to_string(), child);
            }
            ino = child;
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("resolved path({}) to ino({})", abs_path, ino);
        }
        Ok(ino)
    }

    fn cache_for(&self, parent_ino: u64) -> Arc<DentryCache> {
        if let Some(cache) = self.inner.read().unwrap().get(&parent_ino) {
            return cache.clone();
        }
        self.inner
            .write()
            .unwrap()
            .entry(parent_ino)
            .or_insert_with(|| Arc::new(DentryCache::new(DEFAULT_DENTRY_TTL)))
            .clone()
    }

    /// Remove every expired cache.
    pub(crate) fn sweep_expired(&self, now: i64) {
        let mut map = self.inner.write().unwrap();
        map.retain(|parent_ino, dcache| {
            let expired: bool = dcache.is_expired_at(now);
            if expired {
                log::info!("removed expired lookup dcache parent({})", parent_ino);
            }
            !expired
        });
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}
