//! Client contract for the distributed filesystem behind the mount.
//!
//! The engine never talks to the wire itself; every metadata and data
//! operation goes through this trait. Production wires it to the volume's
//! extent client, tests use an in-memory implementation.

use async_trait::async_trait;

use crate::error::EngineError;

/// A directory entry: `(name, child inode)` under some parent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dentry {
    /// Child name within the parent directory.
    pub name: String,
    /// Inode id of the child.
    pub inode: u64,
}

/// Inode metadata returned by batch stat operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeAttr {
    /// Inode id.
    pub inode: u64,
    /// File size in bytes.
    pub size: u64,
    /// Modification time, Unix epoch seconds.
    pub mtime: i64,
}

/// Filesystem operations the engine depends on.
///
/// `open_stream` and `close_stream` are always paired; the engine guarantees
/// a close for every successful open, on every exit path.
#[async_trait]
pub trait FsClient: Send + Sync {
    /// Resolve a filesystem-relative path to its inode.
    ///
    /// The path may carry a trailing slash when it names a directory.
    async fn lookup_path(&self, path: &str) -> Result<u64, EngineError>;

    /// List every child of a directory inode.
    async fn read_dir(&self, parent: u64) -> Result<Vec<Dentry>, EngineError>;

    /// Resolve a single child name under a parent inode.
    async fn lookup(&self, parent: u64, name: &str) -> Result<u64, EngineError>;

    /// Open a read stream for an inode.
    async fn open_stream(&self, ino: u64) -> Result<(), EngineError>;

    /// Close a previously opened read stream.
    async fn close_stream(&self, ino: u64) -> Result<(), EngineError>;

    /// Size of the file, or None when the client cannot tell.
    async fn file_size(&self, ino: u64) -> Option<u64>;

    /// Read up to `buf.len()` bytes at `offset`; returns the bytes read.
    async fn read(&self, ino: u64, buf: &mut [u8], offset: u64) -> Result<usize, EngineError>;

    /// Batch-stat inodes. Unknown inodes are omitted from the result.
    async fn batch_inode_get(&self, inodes: &[u64]) -> Vec<InodeAttr>;

    /// Whether this client accepts inode metadata pushes.
    ///
    /// When false, inode prefetching is skipped entirely.
    fn has_inode_sink(&self) -> bool {
        false
    }

    /// Push inode metadata into the client's inode cache.
    fn put_inode(&self, _attr: InodeAttr) {}
}
