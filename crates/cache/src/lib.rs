//! Caching primitives for the prewarm engine.
//!
//! Two building blocks live here:
//!
//! - **Dentry cache** - a TTL-scoped map from child name to inode id, shared
//!   between the index loader, the absolute-path resolver, and the mount's
//!   lookup fast path.
//! - **Block pool** - size-classed free lists of byte buffers used to stage
//!   file content and framed download records without per-request
//!   allocation.

pub mod block_pool;
pub mod dentry;

pub use block_pool::{BlockPool, BlockPoolStats};
pub use dentry::DentryCache;
