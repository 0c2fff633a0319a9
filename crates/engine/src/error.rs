//! Error types for the prefetch engine.

use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Only enqueue-time failures reach callers; worker-side failures are logged
/// and swallowed so one bad member never stalls a batch.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The engine has been shut down; no further work is accepted.
    #[error("prefetch engine is closed")]
    Closed,

    /// The index file does not exist on the mount.
    #[error("index file not found: {path}")]
    IndexNotFound {
        /// Index file path as given to `add_index`.
        path: String,
    },

    /// An absolute path does not lie under the configured mount point.
    #[error("path is outside the mount point: {path}")]
    OutsideMount {
        /// The rejected path.
        path: String,
    },

    /// A name could not be resolved to an inode.
    #[error("lookup failed for {path}: {message}")]
    LookupFailed {
        /// Path (or parent/name pair) that failed to resolve.
        path: String,
        /// Backend error detail.
        message: String,
    },

    /// Reading content from the filesystem failed.
    #[error("read failed for {path}: {message}")]
    ReadFailed {
        /// Path or inode description of the read target.
        path: String,
        /// Backend error detail.
        message: String,
    },

    /// The file has no content to serve.
    #[error("file {path} has no content")]
    EmptyFile {
        /// Path of the empty file.
        path: String,
    },

    /// Malformed caller input.
    #[error("invalid input: {message}")]
    BadInput {
        /// What was wrong with the input.
        message: String,
    },

    /// Local filesystem I/O failed.
    #[error("io error at {path}: {message}")]
    Io {
        /// Path where the error occurred.
        path: String,
        /// Error message.
        message: String,
    },
}

impl EngineError {
    /// Create a `LookupFailed` from any displayable cause.
    ///
    /// # Arguments
    /// * `path` - Path that failed to resolve
    /// * `cause` - Underlying error
    pub fn lookup(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::LookupFailed {
            path: path.into(),
            message: cause.to_string(),
        }
    }

    /// Create a `ReadFailed` from any displayable cause.
    ///
    /// # Arguments
    /// * `path` - Read target description
    /// * `cause` - Underlying error
    pub fn read(path: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::ReadFailed {
            path: path.into(),
            message: cause.to_string(),
        }
    }

    /// Create an `Io` error from a std I/O error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying I/O error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
