//! Index files and their registry entries.
//!
//! An index file lists one dataset member path per line. Loading one
//! produces an `IndexInfo` whose ordered file list backs prefetch-by-line
//! and batch-download requests.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use prewarm_cache::DentryCache;
use prewarm_common::{epoch_seconds, strip_mount_prefix, READ_BUFFER_SIZE};

/// One member of a dataset, as parsed from an index line.
///
/// The inode is written at most once, when the path resolver first finds it;
/// it stays 0 for members the resolver could not reach.
pub struct FileInfo {
    path: String,
    inode: AtomicU64,
    absolute: bool,
}

impl FileInfo {
    /// Create a member with a filesystem-relative path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            inode: AtomicU64::new(0),
            absolute: false,
        }
    }

    /// Create a member addressed by absolute path (outside any index).
    pub fn absolute(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            inode: AtomicU64::new(0),
            absolute: true,
        }
    }

    /// Member path. Relative paths keep their leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the path is absolute rather than mount-relative.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Resolved inode id, 0 while unresolved.
    pub fn inode(&self) -> u64 {
        self.inode.load(Ordering::Acquire)
    }

    /// Record the resolved inode. Only the first resolution sticks.
    pub(crate) fn set_inode(&self, ino: u64) {
        let _ = self
            .inode
            .compare_exchange(0, ino, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl fmt::Display for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path({}) ino({})", self.path, self.inode())
    }
}

/// Registry entry for one index file.
pub struct IndexInfo {
    path: String,
    dataset_id: String,
    /// Absolute expiry, Unix epoch seconds; 0 means never.
    ttl_epoch: AtomicI64,
    /// TTL window in minutes, used as dentry-cache validity on refresh.
    valid_minutes: AtomicI64,
    files: RwLock<Vec<Arc<FileInfo>>>,
}

impl IndexInfo {
    /// Create a registry candidate.
    ///
    /// # Arguments
    /// * `dataset_id` - Caller-chosen dataset grouping key
    /// * `path` - Absolute path of the index file
    /// * `ttl_minutes` - Entry lifetime; 0 keeps it until shutdown
    pub fn new(dataset_id: impl Into<String>, path: impl Into<String>, ttl_minutes: i64) -> Self {
        let info: IndexInfo = Self {
            path: path.into(),
            dataset_id: dataset_id.into(),
            ttl_epoch: AtomicI64::new(0),
            valid_minutes: AtomicI64::new(0),
            files: RwLock::new(Vec::new()),
        };
        if ttl_minutes > 0 {
            info.ttl_epoch
                .store(epoch_seconds() + ttl_minutes * 60, Ordering::Release);
            info.valid_minutes.store(ttl_minutes, Ordering::Release);
        }
        info
    }

    /// Index file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Dataset grouping key.
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    /// Absolute expiry in epoch seconds, 0 when the entry never expires.
    pub fn ttl_epoch(&self) -> i64 {
        self.ttl_epoch.load(Ordering::Acquire)
    }

    /// TTL window in minutes.
    pub fn valid_minutes(&self) -> i64 {
        self.valid_minutes.load(Ordering::Acquire)
    }

    /// Refresh the TTL in place.
    ///
    /// # Arguments
    /// * `ttl_minutes` - New lifetime; 0 clears the expiry
    pub(crate) fn set_ttl(&self, ttl_minutes: i64) {
        if ttl_minutes > 0 {
            self.ttl_epoch
                .store(epoch_seconds() + ttl_minutes * 60, Ordering::Release);
            self.valid_minutes.store(ttl_minutes, Ordering::Release);
        } else {
            self.ttl_epoch.store(0, Ordering::Release);
            self.valid_minutes.store(0, Ordering::Release);
        }
    }

    /// Force the expiry to an absolute epoch, for expiry tests.
    #[cfg(test)]
    pub(crate) fn set_ttl_epoch(&self, epoch: i64) {
        self.ttl_epoch.store(epoch, Ordering::Release);
    }

    /// Whether the entry is past its expiry at the given clock reading.
    pub fn is_expired_at(&self, now: i64) -> bool {
        let ttl: i64 = self.ttl_epoch();
        ttl > 0 && now > ttl
    }

    /// Dentry-cache validity derived from this entry's TTL.
    pub(crate) fn dentry_validity(&self) -> Duration {
        let minutes: i64 = self.valid_minutes();
        if minutes > 0 {
            Duration::from_secs(minutes as u64 * 60)
        } else {
            prewarm_common::DEFAULT_DENTRY_TTL
        }
    }

    /// Replace the member list with a freshly parsed one.
    pub(crate) fn set_files(&self, files: Vec<Arc<FileInfo>>) {
        *self.files.write().unwrap() = files;
    }

    /// Member at the given line index.
    pub fn file_at(&self, index: usize) -> Option<Arc<FileInfo>> {
        self.files.read().unwrap().get(index).cloned()
    }

    /// Number of members.
    pub fn file_count(&self) -> usize {
        self.files.read().unwrap().len()
    }

    /// Snapshot of the member list.
    pub fn files(&self) -> Vec<Arc<FileInfo>> {
        self.files.read().unwrap().clone()
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index({}) dataset({}) ttl({}) members({})",
            self.path,
            self.dataset_id,
            self.ttl_epoch(),
            self.file_count()
        )
    }
}

/// Dentry cache owned by an index entry, keyed by parent-directory inode.
///
/// The owning index is referenced by path rather than pointer so deleting
/// either side never leaves a dangling link.
pub struct IndexDentryInfo {
    index_path: String,
    dcache: Arc<DentryCache>,
}

impl IndexDentryInfo {
    /// Create a cache owned by the given index.
    ///
    /// # Arguments
    /// * `index_path` - Path of the owning index file
    /// * `valid` - Cache validity window
    pub fn new(index_path: impl Into<String>, valid: Duration) -> Self {
        Self {
            index_path: index_path.into(),
            dcache: Arc::new(DentryCache::new(valid)),
        }
    }

    /// Path of the owning index file.
    pub fn index_path(&self) -> &str {
        &self.index_path
    }

    /// The embedded dentry cache.
    pub fn dcache(&self) -> &Arc<DentryCache> {
        &self.dcache
    }
}

impl fmt::Display for IndexDentryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index({}) expiration({})",
            self.index_path,
            self.dcache.expiration()
        )
    }
}

/// Parse an index file into its ordered member list.
///
/// Each line is one member path; the mount prefix is stripped when present
/// and surrounding whitespace trimmed. Blank lines stay in the list as
/// empty members so line indices keep matching the file.
///
/// # Arguments
/// * `index_path` - Index file to read
/// * `mount_point` - Mount prefix to strip from member lines
/// * `capacity_hint` - Expected member count (0 for unknown)
pub(crate) fn parse_index_file(
    index_path: &str,
    mount_point: &str,
    capacity_hint: usize,
) -> std::io::Result<Vec<Arc<FileInfo>>> {
    let file: File = File::open(index_path)?;
    let mut reader: BufReader<File> = BufReader::with_capacity(READ_BUFFER_SIZE, file);

    let mut files: Vec<Arc<FileInfo>> = Vec::with_capacity(capacity_hint);
    let mut line: String = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let member: String = strip_mount_prefix(&line, mount_point).trim().to_string();
        files.push(Arc::new(FileInfo::new(member)));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_inode_set_once() {
        let file: FileInfo = FileInfo::new("/d1/f1");
        assert_eq!(file.inode(), 0);

        file.set_inode(101);
        assert_eq!(file.inode(), 101);

        file.set_inode(999);
        assert_eq!(file.inode(), 101);
    }

    #[test]
    fn test_index_ttl() {
        let info: IndexInfo = IndexInfo::new("2", "/idx/a.txt", 5);
        let now: i64 = epoch_seconds();

        assert!(info.ttl_epoch() >= now + 5 * 60 - 1);
        assert!(!info.is_expired_at(now));
        assert!(info.is_expired_at(info.ttl_epoch() + 1));
    }

    #[test]
    fn test_index_without_ttl_never_expires() {
        let info: IndexInfo = IndexInfo::new("2", "/idx/a.txt", 0);
        assert_eq!(info.ttl_epoch(), 0);
        assert!(!info.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_set_ttl_refresh_and_clear() {
        let info: IndexInfo = IndexInfo::new("2", "/idx/a.txt", 5);

        info.set_ttl(10);
        assert!(info.ttl_epoch() >= epoch_seconds() + 10 * 60 - 1);
        assert_eq!(info.valid_minutes(), 10);

        info.set_ttl(0);
        assert_eq!(info.ttl_epoch(), 0);
        assert_eq!(info.valid_minutes(), 0);
    }

    #[test]
    fn test_dentry_validity() {
        let with_ttl: IndexInfo = IndexInfo::new("2", "/idx/a.txt", 10);
        assert_eq!(with_ttl.dentry_validity(), Duration::from_secs(600));

        let without: IndexInfo = IndexInfo::new("2", "/idx/b.txt", 0);
        assert_eq!(without.dentry_validity(), prewarm_common::DEFAULT_DENTRY_TTL);
    }

    #[test]
    fn test_parse_index_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "/mnt/v/d1/f1\n/mnt/v/d1/f2\n\n/d2/f3\n").unwrap();

        let files: Vec<Arc<FileInfo>> =
            parse_index_file(tmp.path().to_str().unwrap(), "/mnt/v", 4).unwrap();

        assert_eq!(files.len(), 4);
        assert_eq!(files[0].path(), "/d1/f1");
        assert_eq!(files[1].path(), "/d1/f2");
        assert_eq!(files[2].path(), "");
        assert_eq!(files[3].path(), "/d2/f3");
    }

    #[test]
    fn test_parse_index_missing_file() {
        let result = parse_index_file("/definitely/not/here", "/mnt/v", 0);
        assert!(result.is_err());
    }
}
