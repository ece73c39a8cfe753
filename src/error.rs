//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `sldg` returns one of these categories rather
//! than a per-module error type — the categories are the ones named in the
//! specification's error-handling design, not implementation detail.

use thiserror::Error;

/// The single error type returned by every fallible `sldg` operation.
#[derive(Debug, Error)]
pub enum SldgError {
    /// Malformed on-wire or on-disk bytes: bad magic, wrong version, truncated data.
    #[error("format error: {0}")]
    Format(String),

    /// Invalid construction parameters: bad epoch list, disallowed mixed salt
    /// scheme, too-long encoded column-index list, and similar.
    #[error("config error: {0}")]
    Config(String),

    /// A cryptographic check failed: row-hash mismatch, cell-value mismatch,
    /// a hash disagreeing across paths that claim to share a row.
    #[error("hash conflict: {0}")]
    HashConflict(String),

    /// A path added to a multi-path does not intersect the existing covered set.
    #[error("unlinked path: {0}")]
    UnlinkedPath(String),

    /// A row number lies outside `[1, size]` on read, or is otherwise out of range.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// The operation is forbidden by capability flags or by ledger type.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An invariant was observed violated by an external writer.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The underlying storage/driver failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// An invariant the core itself should have prevented; fatal for the
    /// current operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SldgError {
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn hash_conflict<S: Into<String>>(msg: S) -> Self {
        Self::HashConflict(msg.into())
    }

    pub fn unlinked_path<S: Into<String>>(msg: S) -> Self {
        Self::UnlinkedPath(msg.into())
    }

    pub fn out_of_bounds<S: Into<String>>(msg: S) -> Self {
        Self::OutOfBounds(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn concurrent_modification<S: Into<String>>(msg: S) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

#[cfg(feature = "sql")]
impl From<sqlx::Error> for SldgError {
    fn from(e: sqlx::Error) -> Self {
        SldgError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SldgError>;
