//! Prefetch and batch-download engine for distributed-filesystem mounts.
//!
//! The engine sits between an ML training process and a mounted volume.
//! Index files enumerate dataset member paths; the engine pre-resolves
//! path-to-inode mappings into TTL-scoped dentry caches, warms the data
//! cache by reading members through the OS, and serves batched file
//! downloads as length-prefixed records on a shared response stream.
//!
//! # Architecture
//!
//! ```text
//! HTTP handlers ──> public API ──> three bounded queues
//!                                   (index-load / prefetch-path / download)
//!                                          │
//!                              N fungible worker tasks
//!                              │            │          │
//!                         index loads   read-through   framed downloads
//!                              │
//!                      dentry caches <── janitor (TTL sweeps, metrics)
//! ```
//!
//! All filesystem access goes through the [`FsClient`] trait; the HTTP
//! layer, config loading, and the filesystem client itself live outside
//! this crate.

mod download;
mod engine;
pub mod error;
pub mod fs;
pub mod index;
pub mod instance;
mod janitor;
mod metrics;
mod resolver;
pub mod response;
pub mod waitgroup;
mod worker;

pub use engine::{EngineOptions, PrefetchEngine};
pub use error::EngineError;
pub use fs::{Dentry, FsClient, InodeAttr};
pub use index::{FileInfo, IndexDentryInfo, IndexInfo};
pub use instance::{InstanceInfo, INSTANCE_CONFIG_PATH};
pub use response::{BatchResponseWriter, BATCH_DOWNLOAD_V1};
pub use waitgroup::{WaitGroup, WaitGroupGuard};

pub use prewarm_cache::{BlockPool, DentryCache};
